//! Result and connection types for device sessions

use std::time::Duration;

use crate::credentials::Secret;

/// Output of a single command run on a device
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Command as sent to the device
    pub command: String,
    /// Exit status, if the device reported one
    pub status: Option<i32>,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandOutput {
    /// Network operating systems often omit the exit status; a missing
    /// status counts as success.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.is_none_or(|s| s == 0)
    }
}

/// Connection information for one device
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Hostname or IP address
    pub host: String,
    /// Port (default 22)
    pub port: u16,
    /// Login name
    pub username: String,
    /// Password or key material
    pub secret: Secret,
}

impl ConnectionInfo {
    /// Create new connection info on the default SSH port
    pub fn new(host: impl Into<String>, username: impl Into<String>, secret: Secret) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            secret,
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}
