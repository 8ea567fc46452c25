pub mod document;
pub mod error;

pub use document::{Document, ID_KEY, RESOURCE_TYPE_KEY};
pub use error::{DocumentError, ErrorCategory, Result};
