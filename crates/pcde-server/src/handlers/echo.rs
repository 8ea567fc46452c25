use async_trait::async_trait;
use pcde_core::Document;
use tracing::debug;

use super::{HandlerError, InterceptHandler};

/// Accepts every document and assigns no identifier.
///
/// Useful for endpoints where the submission only needs acknowledging; the
/// client gets its document back unchanged with 201.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl InterceptHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle(&self, document: Document, _address: &str) -> Result<String, HandlerError> {
        debug!(
            resource_type = ?document.resource_type(),
            fields = document.len(),
            "Document acknowledged"
        );
        Ok(String::new())
    }
}
