//! Error types for nbsync-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a device
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to reach the device (DNS, TCP, SSH handshake)
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connect or command exceeded its deadline
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Credentials could not be resolved into something usable
    #[error("credential error: {0}")]
    CredentialError(String),

    /// Channel-level failure during command execution
    #[error("transport error: {0}")]
    TransportError(String),

    /// Session already closed or never opened
    #[error("not connected")]
    NotConnected,
}

impl ExecError {
    /// Connection-level failure that may clear on the next run
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_) | ExecError::Timeout { .. }
        )
    }

    /// Short category label used in reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::ConnectionFailed(_) | ExecError::TransportError(_) => "transport",
            ExecError::AuthenticationFailed(_) => "authentication",
            ExecError::Timeout { .. } => "timeout",
            ExecError::CredentialError(_) => "config",
            ExecError::NotConnected => "not-connected",
        }
    }
}
