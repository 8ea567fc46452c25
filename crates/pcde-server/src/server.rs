use std::net::SocketAddr;

use axum::{Router, middleware, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    middleware as app_middleware,
    pipeline::InterceptionPipeline,
    proxy::{self, Upstream},
    routes,
    rules::RuleSet,
};

pub struct PcdeServer {
    addr: SocketAddr,
    app: Router,
}

/// Build the interception pipeline described by `cfg`.
///
/// Handlers receive the configured base URL as their address.
pub fn build_pipeline(cfg: &AppConfig, client: &reqwest::Client) -> InterceptionPipeline {
    let rules = RuleSet::from_config(&cfg.interception.rules, client);
    for rule in rules.iter() {
        tracing::info!(rule = %rule.name(), handler = %rule.handler().name(), "Interception rule registered");
    }
    InterceptionPipeline::new(rules, cfg.base_url()).with_body_limit(cfg.server.body_limit_bytes)
}

/// Full application: operational endpoints, the interception layer and the
/// upstream pass-through behind it.
pub fn build_app(cfg: &AppConfig) -> Router {
    let client = reqwest::Client::new();
    let pipeline = build_pipeline(cfg, &client);
    let upstream = Upstream::new(client, cfg.upstream.url.clone(), cfg.upstream_timeout());
    if upstream.base_url().is_none() {
        tracing::warn!("No upstream.url configured; declined requests will receive 404");
    }
    let downstream = Router::new()
        .fallback(proxy::forward_upstream)
        .with_state(upstream);
    build_app_with_downstream(pipeline, downstream)
}

/// Mount `pipeline` in front of `downstream`.
///
/// `/healthz`, `/readyz`, `/metrics` and `/_interception/stats` are served
/// directly; every other request passes through the pipeline first.
pub fn build_app_with_downstream(pipeline: InterceptionPipeline, downstream: Router) -> Router {
    let intercepted = downstream.layer(middleware::from_fn_with_state(
        pipeline.clone(),
        app_middleware::interception_middleware,
    ));

    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        .route("/_interception/stats", get(routes::interception_stats))
        .with_state(pipeline)
        .fallback_service(intercepted)
        .layer(middleware::from_fn(app_middleware::http_metrics))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> PcdeServer {
        let app = build_app(&self.config);

        PcdeServer {
            addr: self.addr,
            app,
        }
    }
}

impl PcdeServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
