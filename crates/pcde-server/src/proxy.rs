//! Pass-through to the upstream resource server for requests the
//! interceptors decline.

use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, instrument};

use crate::metrics;

/// Limit for bodies relayed to the upstream server.
const MAX_PROXY_BODY: usize = 10_000_000;

/// Upstream pass-through errors.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No upstream configured; nothing handles the request.
    #[error("No resource server configured for {method} {path}")]
    NoUpstream { method: String, path: String },

    /// Error executing proxy request.
    #[error("Proxy error: {0}")]
    Upstream(String),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NoUpstream { .. } => (StatusCode::NOT_FOUND, "not-found"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "exception"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "exception"),
        };

        let operation_outcome = json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": code,
                "diagnostics": self.to_string()
            }]
        });

        (status, Json(operation_outcome)).into_response()
    }
}

/// Upstream target shared by all pass-through requests.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: Option<String>,
    timeout: Duration,
}

impl Upstream {
    pub fn new(client: reqwest::Client, base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            timeout,
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Upstream URL for an inbound path and query.
    fn target_url(&self, base: &str, path_and_query: &str) -> String {
        format!("{base}{path_and_query}")
    }
}

/// Fallback handler forwarding the request to the upstream server.
///
/// Hop-by-hop headers are dropped in both directions; status, headers and
/// body of the upstream response are returned as they are.
#[instrument(skip(upstream, request), fields(method = %request.method(), path = %request.uri().path()))]
pub async fn forward_upstream(
    State(upstream): State<Upstream>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let Some(base) = upstream.base_url() else {
        return Err(ProxyError::NoUpstream {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
        });
    };

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let target_url = upstream.target_url(base, &path_and_query);

    let method = request.method().clone();
    let mut headers = HeaderMap::new();
    for (name, value) in request.headers().iter() {
        if is_hop_by_hop_header(name.as_str()) {
            continue;
        }
        headers.insert(name.clone(), value.clone());
    }

    let body_bytes = axum::body::to_bytes(request.into_body(), MAX_PROXY_BODY)
        .await
        .map_err(|e| ProxyError::Upstream(format!("Failed to read request body: {}", e)))?;

    let proxy_request = upstream
        .client
        .request(method, &target_url)
        .headers(headers)
        .body(body_bytes.to_vec())
        .timeout(upstream.timeout)
        .build()
        .map_err(|e| ProxyError::Internal(format!("Failed to build proxy request: {}", e)))?;

    let proxy_response = upstream.client.execute(proxy_request).await.map_err(|e| {
        metrics::record_upstream_request(None);
        if e.is_timeout() {
            ProxyError::Upstream(format!(
                "Upstream request timed out after {} ms",
                upstream.timeout.as_millis()
            ))
        } else if e.is_connect() {
            ProxyError::Upstream(format!("Failed to connect to upstream: {}", e))
        } else {
            ProxyError::Upstream(format!("Upstream request failed: {}", e))
        }
    })?;

    let status = proxy_response.status();
    metrics::record_upstream_request(Some(status.as_u16()));
    debug!(target_url = %target_url, status = %status, "Upstream request completed");

    let mut response_builder = Response::builder().status(status);
    for (name, value) in proxy_response.headers().iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            response_builder = response_builder.header(name, value);
        }
    }

    let response_body = proxy_response
        .bytes()
        .await
        .map_err(|e| ProxyError::Upstream(format!("Failed to read response body: {}", e)))?;

    response_builder
        .body(Body::from(response_body))
        .map_err(|e| ProxyError::Internal(format!("Failed to build response: {}", e)))
}

/// Checks if a header is a hop-by-hop header that should not be forwarded.
///
/// Hop-by-hop headers are defined in RFC 2616 Section 13.5.1.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}
