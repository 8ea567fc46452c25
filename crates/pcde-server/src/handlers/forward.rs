//! Handler that creates the intercepted resource on a FHIR server.

use async_trait::async_trait;
use axum::http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use pcde_core::Document;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{HandlerError, InterceptHandler};

const FHIR_JSON: &str = "application/fhir+json";

/// POSTs the document to `{address}/{resourceType}` and returns the id the
/// server assigned.
///
/// The id is read from the response body, falling back to the `Location`
/// header. A successful create that yields neither returns an empty id.
#[derive(Debug, Clone)]
pub struct ForwardHandler {
    client: reqwest::Client,
}

impl ForwardHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InterceptHandler for ForwardHandler {
    fn name(&self) -> &str {
        "forward"
    }

    #[instrument(skip(self, document))]
    async fn handle(&self, document: Document, address: &str) -> Result<String, HandlerError> {
        let resource_type = document
            .resource_type()
            .ok_or_else(|| HandlerError::execution("Document has no resourceType"))?
            .to_string();

        let target = format!("{}/{}", address.trim_end_matches('/'), resource_type);
        let body = document
            .to_text()
            .map_err(|e| HandlerError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(&target)
            .header(CONTENT_TYPE, FHIR_JSON)
            .header(ACCEPT, FHIR_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HandlerError::network(format!("Request to {target} timed out"))
                } else if e.is_connect() {
                    HandlerError::network(format!("Failed to connect to {target}: {e}"))
                } else {
                    HandlerError::network(format!("Request to {target} failed: {e}"))
                }
            })?;

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HandlerError::network(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(HandlerError::Upstream {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let id = id_from_body(&bytes)
            .or_else(|| {
                location
                    .as_deref()
                    .and_then(|loc| id_from_location(loc, &resource_type))
            })
            .unwrap_or_default();

        debug!(target = %target, status = %status, id = %id, "Resource forwarded");
        Ok(id)
    }
}

fn id_from_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_slice(bytes).ok()?;
    value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Extract `{id}` from `[base]/{resource_type}/{id}[/_history/{vid}]`.
fn id_from_location(location: &str, resource_type: &str) -> Option<String> {
    let path = location.split('?').next().unwrap_or(location);
    let segments: Vec<&str> = path.split('/').collect();
    segments
        .iter()
        .rposition(|s| *s == resource_type)
        .and_then(|idx| segments.get(idx + 1))
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}
