//! Interception pipeline.
//!
//! Each request moves through the pipeline once:
//!
//! ```text
//! classify ──no match──────────────────────────────▶ Declined
//!    │
//!    ▼
//! read body ──I/O error or over limit──────────────▶ Declined
//!    │
//!    ▼
//! parse ──malformed────────────────────────────────▶ Declined
//!    │
//!    ▼
//! resourceType == rule type? ──no──────────────────▶ Declined
//!    │
//!    ▼
//! handler ──error──────────────────────────────────▶ Declined
//!    │
//!    ▼
//! 201 with original document (+ id when assigned) ─▶ Responded
//! ```
//!
//! Declined requests continue through normal routing untouched. Failures are
//! logged and counted but never turned into client-visible errors here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::http::{HeaderValue, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use pcde_core::{Document, DocumentError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::handlers::HandlerError;
use crate::metrics;
use crate::rules::{InterceptionRule, RuleSet};

/// Content type of every pipeline-authored response.
pub const RESPONSE_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Failures contained inside the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Failed to parse request body: {0}")]
    Parse(#[source] DocumentError),

    #[error("Handler '{handler}' failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: HandlerError,
    },

    #[error("Failed to compose response document: {0}")]
    ResponseWrite(#[source] DocumentError),
}

impl InterceptError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BodyRead(_) => "body_read_error",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::Parse(_) => "parse_error",
            Self::Handler { .. } => "handler_error",
            Self::ResponseWrite(_) => "response_write_error",
        }
    }
}

/// Why the pipeline left a request to normal processing.
#[derive(Debug)]
pub enum DeclineReason {
    /// Path did not match any rule.
    NoMatch,
    /// Body declared a different (or no) resource type.
    ResourceTypeMismatch {
        expected: String,
        found: Option<String>,
    },
    /// Internal failure; processing fails open.
    Failed(InterceptError),
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatch => "no_match",
            Self::ResourceTypeMismatch { .. } => "resource_type_mismatch",
            Self::Failed(err) => err.kind(),
        }
    }
}

/// Terminal state of one pipeline run.
#[derive(Debug)]
pub enum Interception {
    /// Not handled: the request continues through normal routing.
    Declined(DeclineReason),
    /// Handled: the response is final.
    Responded(InterceptResponse),
}

impl Interception {
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined(_))
    }
}

/// Response authored by the pipeline for an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptResponse {
    pub status: StatusCode,
    pub body: String,
    /// Set when the identifier could not be applied and the original text was sent.
    pub degraded: bool,
}

impl InterceptResponse {
    /// 201 Created carrying `body`.
    ///
    /// 201 is used even when the handler assigned no identifier.
    pub fn created(body: String) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
            degraded: false,
        }
    }

    fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

impl IntoResponse for InterceptResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(CONTENT_TYPE, HeaderValue::from_static(RESPONSE_CONTENT_TYPE))],
            self.body,
        )
            .into_response()
    }
}

/// Process-wide interception counters.
#[derive(Debug, Default)]
pub struct InterceptStats {
    seen: AtomicU64,
    matched: AtomicU64,
    responded: AtomicU64,
    declined: AtomicU64,
}

/// Point-in-time copy of [`InterceptStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub seen: u64,
    pub matched: u64,
    pub responded: u64,
    pub declined: u64,
}

impl InterceptStats {
    /// Number of requests that passed through classification.
    pub fn request_count(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            seen: self.seen.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            responded: self.responded.load(Ordering::Relaxed),
            declined: self.declined.load(Ordering::Relaxed),
        }
    }
}

/// Shared, cheaply cloneable pipeline state.
#[derive(Debug, Clone)]
pub struct InterceptionPipeline {
    rules: RuleSet,
    address: Arc<str>,
    body_limit: usize,
    stats: Arc<InterceptStats>,
}

impl InterceptionPipeline {
    /// Default limit applied when reading intercepted bodies.
    pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

    /// `address` is passed to every handler invocation.
    pub fn new(rules: RuleSet, address: impl Into<String>) -> Self {
        Self {
            rules,
            address: Arc::from(address.into()),
            body_limit: Self::DEFAULT_BODY_LIMIT,
            stats: Arc::new(InterceptStats::default()),
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn stats(&self) -> &InterceptStats {
        &self.stats
    }

    /// Find the rule covering `path`. Only the path is inspected.
    pub fn classify(&self, path: &str) -> Option<&InterceptionRule> {
        self.stats.seen.fetch_add(1, Ordering::Relaxed);
        let rule = self.rules.classify(path);
        if rule.is_some() {
            self.stats.matched.fetch_add(1, Ordering::Relaxed);
        }
        rule
    }

    /// Record that the body of a matched request could not be read.
    pub fn body_read_failed(&self, rule: &InterceptionRule, error: impl ToString) -> Interception {
        self.decline(rule, DeclineReason::Failed(InterceptError::BodyRead(error.to_string())))
    }

    /// Record that a matched request carries more than `body_limit` bytes.
    pub fn body_too_large(&self, rule: &InterceptionRule) -> Interception {
        self.decline(
            rule,
            DeclineReason::Failed(InterceptError::BodyTooLarge {
                limit: self.body_limit,
            }),
        )
    }

    /// Run parse → type check → handler → response for a matched request.
    pub async fn dispatch(&self, rule: &InterceptionRule, body: &[u8]) -> Interception {
        let document = match Document::parse_slice(body) {
            Ok(doc) => doc,
            Err(e) => return self.decline(rule, DeclineReason::Failed(InterceptError::Parse(e))),
        };

        if document.resource_type() != Some(rule.resource_type()) {
            let found = document.resource_type().map(str::to_string);
            return self.decline(
                rule,
                DeclineReason::ResourceTypeMismatch {
                    expected: rule.resource_type().to_string(),
                    found,
                },
            );
        }

        // Serialized before the handler runs so its mutations cannot leak into the response.
        let original = match document.to_text() {
            Ok(text) => text,
            Err(e) => return self.decline(rule, DeclineReason::Failed(InterceptError::Parse(e))),
        };

        let handler = rule.handler();
        let started = Instant::now();
        let result = handler.handle(document, &self.address).await;
        metrics::record_handler_duration(rule.name(), handler.name(), started.elapsed());

        let id = match result {
            Ok(id) => id,
            Err(source) => {
                let error = InterceptError::Handler {
                    handler: handler.name().to_string(),
                    source,
                };
                return self.decline(rule, DeclineReason::Failed(error));
            }
        };

        self.respond(rule, original, &id)
    }

    fn respond(&self, rule: &InterceptionRule, original: String, id: &str) -> Interception {
        let response = if id.is_empty() {
            InterceptResponse::created(original)
        } else {
            match with_id(&original, id) {
                Ok(text) => InterceptResponse::created(text),
                Err(e) => {
                    let error = InterceptError::ResponseWrite(e);
                    warn!(rule = %rule.name(), error = %error, "Sending original document without assigned id");
                    InterceptResponse::created(original).degraded()
                }
            }
        };

        self.stats.responded.fetch_add(1, Ordering::Relaxed);
        let outcome = if response.degraded { "degraded" } else { "responded" };
        metrics::record_intercept_outcome(rule.name(), outcome);
        info!(rule = %rule.name(), id = %id, degraded = response.degraded, "Request intercepted");

        Interception::Responded(response)
    }

    fn decline(&self, rule: &InterceptionRule, reason: DeclineReason) -> Interception {
        self.stats.declined.fetch_add(1, Ordering::Relaxed);
        metrics::record_intercept_outcome(rule.name(), reason.as_str());

        match &reason {
            DeclineReason::Failed(error) => {
                warn!(rule = %rule.name(), kind = error.kind(), error = %error, "Interception declined");
            }
            DeclineReason::ResourceTypeMismatch { expected, found } => {
                debug!(rule = %rule.name(), expected = %expected, found = ?found, "Resource type not handled");
            }
            DeclineReason::NoMatch => {}
        }

        Interception::Declined(reason)
    }
}

/// Re-read `original` and set its `id`.
fn with_id(original: &str, id: &str) -> Result<String, DocumentError> {
    let mut document = Document::parse(original)?;
    document.set_id(id);
    document.to_text()
}
