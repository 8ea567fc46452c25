use std::{env, fs};

use pcde_server::HandlerKind;
use pcde_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("pcde.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
base_url = "http://localhost:8081/fhir"
body_limit_bytes = 2048

[upstream]
url = "http://hapi:8080/fhir"
timeout_ms = 5000

[logging]
level = "debug"

[[interception.rules]]
resource_type = "Task"
marker = "PCDE"
handler = "forward"

[[interception.rules]]
resource_type = "Communication"
marker = "PCDE"
marker_offset = 1
handler = "echo"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.body_limit_bytes, 2048);
    assert_eq!(cfg.base_url(), "http://localhost:8081/fhir");
    assert_eq!(cfg.upstream.url.as_deref(), Some("http://hapi:8080/fhir"));
    assert_eq!(cfg.upstream.timeout_ms, 5000);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.interception.rules.len(), 2);
    assert_eq!(cfg.interception.rules[0].marker_offset, 1);
    assert_eq!(cfg.interception.rules[1].handler, HandlerKind::Echo);

    // 2) Env override should win over file
    unsafe {
        env::set_var("PCDE__SERVER__BODY_LIMIT_BYTES", "4096");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.body_limit_bytes, 4096);
    unsafe {
        env::remove_var("PCDE__SERVER__BODY_LIMIT_BYTES");
    }

    // 3) Invalid rule should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[[interception.rules]]
resource_type = "Task"
marker = "PCDE"
marker_offset = 0
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("marker_offset must be > 0"));

    // 4) Unknown handler kind is rejected while deserializing
    let unknown_path = dir.path().join("unknown.toml");
    let unknown_toml = r#"
[[interception.rules]]
resource_type = "Task"
handler = "teleport"
"#;
    fs::write(&unknown_path, unknown_toml).expect("write unknown toml");
    assert!(load_config(unknown_path.to_str()).is_err());
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");
    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.interception.rules.len(), 1);
    assert_eq!(cfg.interception.rules[0].resource_type, "Task");
    assert_eq!(cfg.interception.rules[0].handler, HandlerKind::Forward);
}

#[test]
fn no_path_reads_default_location() {
    // The package directory holds no default config file.
    assert!(!std::path::Path::new(DEFAULT_CONFIG_PATH).exists());
    let cfg = load_config(None).expect("defaults are valid");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.interception.rules[0].marker, "PCDE");
}
