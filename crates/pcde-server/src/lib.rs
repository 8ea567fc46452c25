pub mod classifier;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod routes;
pub mod rules;
pub mod server;

pub use classifier::PathMatcher;
pub use config::{AppConfig, InterceptionConfig, LoggingConfig, RuleConfig, ServerConfig, UpstreamConfig};
pub use handlers::{EchoHandler, ForwardHandler, HandlerError, HandlerKind, InterceptHandler};
pub use observability::init_tracing;
pub use pipeline::{
    DeclineReason, InterceptError, InterceptResponse, InterceptStats, Interception,
    InterceptionPipeline, StatsSnapshot,
};
pub use rules::{InterceptionRule, RuleSet};
pub use server::{PcdeServer, ServerBuilder, build_app, build_app_with_downstream, build_pipeline};
