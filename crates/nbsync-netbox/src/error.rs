//! Error types for the inventory client

use thiserror::Error;

/// Errors returned by an [`InventoryStore`](crate::InventoryStore)
///
/// `Clone` so results can be passed back through actor replies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Store rejected a write (duplicate natural key, missing reference)
    #[error("conflict ({status}): {message}")]
    Conflict {
        /// HTTP status code
        status: u16,
        /// Error body returned by the store
        message: String,
    },

    /// Object addressed by id does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error body returned by the store
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Base URL or API token unusable
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Map a non-success status and body to an error
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 409 => StoreError::Conflict { status, message },
            404 => StoreError::NotFound(message),
            _ => StoreError::Api { status, message },
        }
    }

    /// Failure that may clear on the next run
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::Timeout => true,
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether a write was rejected by the store
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        StoreError::Config(format!("invalid URL: {err}"))
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(StoreError::from_status(400, "slug exists".into()).is_conflict());
        assert!(StoreError::from_status(409, String::new()).is_conflict());
        assert!(matches!(
            StoreError::from_status(404, String::new()),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            StoreError::from_status(403, String::new()),
            StoreError::Api { status: 403, .. }
        ));
    }

    #[test]
    fn test_transient() {
        assert!(StoreError::Timeout.is_transient());
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(StoreError::from_status(503, String::new()).is_transient());
        assert!(StoreError::from_status(429, String::new()).is_transient());
        assert!(!StoreError::from_status(400, String::new()).is_transient());
        assert!(!StoreError::from_status(403, String::new()).is_transient());
    }
}
