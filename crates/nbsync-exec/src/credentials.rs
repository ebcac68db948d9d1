//! Device credential resolution

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::ssh_key::PrivateKey;
use russh::keys::{decode_secret_key, load_secret_key};
use tracing::debug;

/// Where the login secret for a device comes from
#[derive(Clone)]
pub enum Secret {
    /// Literal password
    Password(String),
    /// Password read from an environment variable
    PasswordEnv(String),
    /// Explicit path to a private key file
    KeyPath(PathBuf),
    /// Base64-encoded private key read from an environment variable
    KeyEnv(String),
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Password(_) => f.write_str("Password(***)"),
            Secret::PasswordEnv(var) => f.debug_tuple("PasswordEnv").field(var).finish(),
            Secret::KeyPath(path) => f.debug_tuple("KeyPath").field(path).finish(),
            Secret::KeyEnv(var) => f.debug_tuple("KeyEnv").field(var).finish(),
        }
    }
}

impl Secret {
    /// Resolve the secret into material the SSH client can use
    ///
    /// # Errors
    /// Returns `CredentialError` if an environment variable is unset, the key
    /// file is unreadable or too permissive, or the key cannot be decoded.
    pub fn resolve(&self) -> Result<ResolvedSecret, CredentialError> {
        match self {
            Secret::Password(password) => Ok(ResolvedSecret::Password(password.clone())),
            Secret::PasswordEnv(var_name) => {
                let password =
                    env::var(var_name).map_err(|_| CredentialError::EnvNotSet(var_name.clone()))?;
                Ok(ResolvedSecret::Password(password))
            }
            Secret::KeyPath(path) => {
                validate_key_permissions(path)?;
                let key = load_secret_key(path, None)
                    .map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
                debug!(path = %path.display(), "loaded private key");
                Ok(ResolvedSecret::Key(Arc::new(key)))
            }
            Secret::KeyEnv(var_name) => {
                let encoded =
                    env::var(var_name).map_err(|_| CredentialError::EnvNotSet(var_name.clone()))?;
                let pem = base64_decode(&encoded)?;
                let key = decode_secret_key(&pem, None)
                    .map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
                Ok(ResolvedSecret::Key(Arc::new(key)))
            }
        }
    }
}

/// Secret material ready for authentication
#[derive(Clone)]
pub enum ResolvedSecret {
    Password(String),
    Key(Arc<PrivateKey>),
}

impl fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedSecret::Password(_) => f.write_str("Password(***)"),
            ResolvedSecret::Key(_) => f.write_str("Key(***)"),
        }
    }
}

/// Credential resolution errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key is not valid UTF-8 PEM")]
    InvalidEncoding,

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn base64_decode(input: &str) -> Result<String, CredentialError> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(input.trim())
        .map_err(|_| CredentialError::InvalidBase64)?;
    String::from_utf8(bytes).map_err(|_| CredentialError::InvalidEncoding)
}

#[cfg(unix)]
fn validate_key_permissions(path: &Path) -> Result<(), CredentialError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)?;
    let mode = metadata.permissions().mode();

    // group and other bits must be clear
    if mode & 0o77 != 0 {
        return Err(CredentialError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_key_permissions(path: &Path) -> Result<(), CredentialError> {
    std::fs::metadata(path)?;
    Ok(())
}
