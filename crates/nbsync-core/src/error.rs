//! Core error types for nbsync-core

use thiserror::Error;

use nbsync_netbox::StoreError;
use nbsync_template::TemplateError;

use crate::state::SyncState;

/// Run-level errors; any of these aborts before a device is polled
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Template failed to load or compile
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// A device references a vendor profile nobody defined
    #[error("device {host} uses unknown profile '{profile}'")]
    UnknownProfile { host: String, profile: String },

    /// `max_workers` outside `1..=128`
    #[error("max_workers must be between 1 and {max}, got {value}")]
    InvalidMaxWorkers { value: usize, max: usize },
}

/// Errors folding extracted records into a device state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// A mandatory field is absent
    #[error("malformed device state: {0}")]
    MalformedState(String),

    /// Hostname cannot be split into site and role token
    #[error("hostname '{0}' does not match <site>-...-<role>")]
    HostnamePattern(String),
}

/// Per-device reconciliation failures
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// No known manufacturer slug occurs in the model or vendor name
    #[error("no manufacturer matches model '{model}' (profile {vendor})")]
    ManufacturerUnresolved { model: String, vendor: String },

    /// Role token did not map to a role, or the role is missing in the store
    #[error("role unresolved for token '{token}'")]
    RoleUnresolved { token: String, role: Option<String> },

    /// Store call failed for a device-level step
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid state transition attempted
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: SyncState,
        /// Attempted target state
        to: SyncState,
    },

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl ReconcileError {
    /// Short category label used in reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::ManufacturerUnresolved { .. } => "manufacturer-unresolved",
            ReconcileError::RoleUnresolved { .. } => "role-unresolved",
            ReconcileError::Store(e) if e.is_conflict() => "conflict",
            ReconcileError::Store(_) => "store",
            ReconcileError::InvalidTransition { .. } | ReconcileError::ActorError(_) => "internal",
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::Store(e) if e.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_error_kind() {
        let conflict = ReconcileError::from(StoreError::Conflict {
            status: 400,
            message: "duplicate".into(),
        });
        assert_eq!(conflict.kind(), "conflict");
        assert_eq!(
            ReconcileError::RoleUnresolved {
                token: "xyz01".into(),
                role: None
            }
            .kind(),
            "role-unresolved"
        );
    }

    #[test]
    fn test_messages() {
        let err = AggregateError::HostnamePattern("router1".into());
        assert_eq!(
            err.to_string(),
            "hostname 'router1' does not match <site>-...-<role>"
        );
        let err = CoreError::InvalidMaxWorkers { value: 0, max: 128 };
        assert!(err.to_string().contains("got 0"));
    }
}
