use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;

use crate::pipeline::InterceptionPipeline;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ready" }))
}

/// Prometheus text exposition.
pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

/// Interception counters and configured rules.
pub async fn interception_stats(State(pipeline): State<InterceptionPipeline>) -> impl IntoResponse {
    let rules: Vec<_> = pipeline
        .rules()
        .iter()
        .map(|rule| {
            json!({
                "name": rule.name(),
                "resourceType": rule.resource_type(),
                "marker": rule.matcher().marker(),
                "markerOffset": rule.matcher().marker_offset(),
                "handler": rule.handler().name(),
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "stats": pipeline.stats().snapshot(),
            "rules": rules,
        })),
    )
}
