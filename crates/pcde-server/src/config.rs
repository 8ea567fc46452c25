use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

use crate::handlers::HandlerKind;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Resource server that receives requests the interceptors decline
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub interception: InterceptionConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if let Some(ref base) = self.server.base_url {
            url::Url::parse(base).map_err(|e| format!("server.base_url is not a valid URL: {e}"))?;
        }
        // Upstream validation
        if let Some(ref upstream) = self.upstream.url {
            url::Url::parse(upstream)
                .map_err(|e| format!("upstream.url is not a valid URL: {e}"))?;
        }
        if self.upstream.timeout_ms == 0 {
            return Err("upstream.timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Interception rules
        for (idx, rule) in self.interception.rules.iter().enumerate() {
            if rule.resource_type.trim().is_empty() {
                return Err(format!("interception.rules[{idx}].resource_type must not be empty"));
            }
            if rule.resource_type.contains('/') {
                return Err(format!(
                    "interception.rules[{idx}].resource_type must be a single path segment"
                ));
            }
            if rule.marker.trim().is_empty() {
                return Err(format!("interception.rules[{idx}].marker must not be empty"));
            }
            if rule.marker.contains('/') {
                return Err(format!(
                    "interception.rules[{idx}].marker must be a single path segment"
                ));
            }
            if rule.marker_offset == 0 {
                return Err(format!("interception.rules[{idx}].marker_offset must be > 0"));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Returns the base URL for the server.
    /// If `base_url` is configured, returns that; otherwise computes from host:port.
    /// This is the address handed to delegated handlers.
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL for the server, passed to interception handlers.
    /// If not set, defaults to http://{host}:{port}
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the resource server, e.g. `http://localhost:8090/fhir`.
    /// Without it, declined requests are answered with 404.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_upstream_timeout_ms() -> u64 {
    30_000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptionConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

fn default_rules() -> Vec<RuleConfig> {
    vec![RuleConfig {
        resource_type: "Task".into(),
        marker: default_marker(),
        marker_offset: default_marker_offset(),
        handler: HandlerKind::Forward,
    }]
}

/// One interception rule as written in the configuration file.
///
/// ```toml
/// [[interception.rules]]
/// resource_type = "Task"
/// marker = "PCDE"
/// handler = "forward"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub resource_type: String,
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Segments between the marker and the resource type segment, counted from the end.
    #[serde(default = "default_marker_offset")]
    pub marker_offset: usize,
    #[serde(default)]
    pub handler: HandlerKind,
}

fn default_marker() -> String {
    "PCDE".into()
}
fn default_marker_offset() -> usize {
    1
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File, FileFormat};
    use std::path::PathBuf;

    /// File read when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "pcde.toml";

    /// Load `path` (or [`DEFAULT_CONFIG_PATH`]) with `PCDE__*` overrides on top.
    /// A missing file is not an error; defaults apply.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf).format(FileFormat::Toml));
        }
        // Environment variable overrides, e.g., PCDE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("PCDE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
