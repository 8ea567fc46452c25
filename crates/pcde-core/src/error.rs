use thiserror::Error;

/// Errors produced while building or serializing a [`crate::Document`].
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Malformed JSON document: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Document root must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("Failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl DocumentError {
    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse(_) | Self::NotAnObject(_) => ErrorCategory::Parse,
            Self::Serialize(_) => ErrorCategory::Serialization,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Serialization,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Serialization => write!(f, "serialization"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocumentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(DocumentError::Parse(parse_err).category(), ErrorCategory::Parse);
        assert_eq!(
            DocumentError::NotAnObject("array").category(),
            ErrorCategory::Parse
        );
    }

    #[test]
    fn test_error_display() {
        let err = DocumentError::NotAnObject("string");
        assert_eq!(
            err.to_string(),
            "Document root must be a JSON object, found string"
        );
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
    }
}
