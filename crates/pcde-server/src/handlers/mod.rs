//! Delegated handlers invoked once a request is intercepted.
//!
//! A handler receives the parsed document and the configured server address
//! and answers with the identifier to assign to the submitted resource:
//!
//! - a non-empty string becomes the `id` of the echoed document
//! - an empty string means "processed, nothing to assign"
//! - an error makes the pipeline decline, so normal processing continues
//!
//! Built-in handlers:
//!
//! - [`ForwardHandler`] - creates the resource on the server at the configured address
//! - [`EchoHandler`] - accepts the document without assigning an identifier

mod echo;
mod forward;

use std::sync::Arc;

use async_trait::async_trait;
use pcde_core::Document;
use serde::{Deserialize, Serialize};

pub use echo::EchoHandler;
pub use forward::ForwardHandler;

/// Error type for delegated handler operations.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Handler rejected or failed to process the document.
    #[error("Handler execution failed: {0}")]
    Execution(String),

    /// Handler could not reach a collaborating service.
    #[error("Network error: {0}")]
    Network(String),

    /// Collaborating service answered with an unexpected status.
    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Handler failed due to serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        HandlerError::Execution(msg.into())
    }

    /// Create a network error from a string.
    pub fn network(msg: impl Into<String>) -> Self {
        HandlerError::Network(msg.into())
    }
}

/// Domain logic run for an intercepted document.
///
/// Implementations are shared across concurrent requests and must not keep
/// per-request state.
#[async_trait]
pub trait InterceptHandler: Send + Sync {
    /// Unique name for this handler (for logging and metrics).
    fn name(&self) -> &str;

    /// Process `document` and return the identifier to assign, or `""`.
    ///
    /// `address` is the configured base URL of the server the handler should
    /// use to reach collaborating services.
    async fn handle(&self, document: Document, address: &str) -> Result<String, HandlerError>;
}

/// Built-in handler selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Forward,
    Echo,
}

impl HandlerKind {
    /// Instantiate the handler. `client` is shared by all forwarding handlers.
    pub fn build(self, client: &reqwest::Client) -> Arc<dyn InterceptHandler> {
        match self {
            HandlerKind::Forward => Arc::new(ForwardHandler::new(client.clone())),
            HandlerKind::Echo => Arc::new(EchoHandler),
        }
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Forward => write!(f, "forward"),
            HandlerKind::Echo => write!(f, "echo"),
        }
    }
}
