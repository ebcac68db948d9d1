//! Runtime configuration: sessions, vendor profiles, role table, limits

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use nbsync_exec::ConnectionInfo;
use nbsync_template::{Template, TemplateRegistry};

use crate::error::CoreError;

/// Upper bound for `max_workers`
pub const MAX_WORKERS_LIMIT: usize = 128;

/// One command of a vendor profile and the template that parses its output
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    pub template: Arc<Template>,
}

/// Ordered command list for one vendor/platform
#[derive(Debug, Clone)]
pub struct VendorProfile {
    /// Profile name, e.g. `cisco_ios`
    pub name: String,
    pub commands: Vec<CommandSpec>,
}

impl VendorProfile {
    /// Compile a profile from `(command, template path)` pairs
    ///
    /// Templates shared between profiles are compiled once by `registry`.
    ///
    /// # Errors
    /// Returns `CoreError::Template` for the first template that fails.
    pub fn load(
        name: impl Into<String>,
        commands: &[(String, PathBuf)],
        registry: &mut TemplateRegistry,
    ) -> Result<Self, CoreError> {
        let commands = commands
            .iter()
            .map(|(command, path)| {
                Ok(CommandSpec {
                    command: command.clone(),
                    template: registry.load(path)?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(Self {
            name: name.into(),
            commands,
        })
    }
}

/// Everything needed to poll one device
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub connection: ConnectionInfo,
    pub profile: Arc<VendorProfile>,
}

impl SessionSpec {
    #[must_use]
    pub fn new(connection: ConnectionInfo, profile: Arc<VendorProfile>) -> Self {
        Self {
            connection,
            profile,
        }
    }

    /// Address used to reach the device
    #[must_use]
    pub fn host(&self) -> &str {
        &self.connection.host
    }
}

/// A role code and the role name it maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCode {
    pub code: String,
    pub name: String,
}

impl RoleCode {
    #[must_use]
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// Ordered role code table
///
/// The first code found as a substring of the role token wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    entries: Vec<RoleCode>,
}

impl RoleTable {
    #[must_use]
    pub fn new(entries: Vec<RoleCode>) -> Self {
        Self { entries }
    }

    /// Role name for a hostname role token
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<&str> {
        let token = token.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| !entry.code.is_empty() && token.contains(&entry.code.to_ascii_lowercase()))
            .map(|entry| entry.name.as_str())
    }

    #[must_use]
    pub fn entries(&self) -> &[RoleCode] {
        &self.entries
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::new(vec![
            RoleCode::new("br", "Router"),
            RoleCode::new("ir", "Router"),
            RoleCode::new("vg", "Voice Gateway"),
            RoleCode::new("csp", "Crypto"),
            RoleCode::new("fw", "Firewall"),
            RoleCode::new("csw", "Core Switch"),
            RoleCode::new("asw", "Access Switch"),
            RoleCode::new("dsw", "Distribution Switch"),
            RoleCode::new("bsw", "Border Switch"),
        ])
    }
}

/// Limits for one run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Devices polled and reconciled concurrently
    pub max_workers: usize,
    /// Capacity of the progress event channel
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            event_channel_capacity: 1024,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Check limits before a run starts
    ///
    /// # Errors
    /// Returns `CoreError::InvalidMaxWorkers` if `max_workers` is outside
    /// `1..=128`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=MAX_WORKERS_LIMIT).contains(&self.max_workers) {
            return Err(CoreError::InvalidMaxWorkers {
                value: self.max_workers,
                max: MAX_WORKERS_LIMIT,
            });
        }
        Ok(())
    }
}
