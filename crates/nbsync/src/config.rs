//! Configuration loading and types

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{WrapErr, bail, eyre};
use serde::Deserialize;

use nbsync_core::{RoleCode, RoleTable, SessionSpec, SyncConfig, VendorProfile};
use nbsync_exec::{ConnectionInfo, Secret};
use nbsync_template::TemplateRegistry;

/// Top-level configuration for nbsync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub netbox: NetboxConfig,
    #[serde(default)]
    pub sync: SyncSection,
    /// Ordered role code table; empty means the built-in table
    #[serde(default)]
    pub roles: Vec<RoleCode>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    /// Merged into every device; the device's own settings win
    #[serde(default)]
    pub device_defaults: DeviceConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// NetBox API settings
#[derive(Debug, Clone, Deserialize)]
pub struct NetboxConfig {
    pub url: String,
    /// API token in clear text
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the API token
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// Worker and timeout limits
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// Ordered command list of one vendor profile
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub command: String,
    /// Template path, relative to the config file
    pub template: PathBuf,
}

/// One device, or the defaults shared by all devices
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Environment variable holding a base64-encoded private key
    #[serde(default)]
    pub key_env: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_workers() -> usize {
    8
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_command_timeout() -> u64 {
    60
}

impl DeviceConfig {
    fn has_credentials(&self) -> bool {
        self.password.is_some()
            || self.password_env.is_some()
            || self.key_path.is_some()
            || self.key_env.is_some()
    }

    /// Fill unset fields from `defaults`
    ///
    /// Credentials are taken as a group: a device that names any credential
    /// ignores the default ones.
    #[must_use]
    pub fn merged(&self, defaults: &DeviceConfig) -> DeviceConfig {
        let credentials = if self.has_credentials() { self } else { defaults };
        DeviceConfig {
            host: self.host.clone().or_else(|| defaults.host.clone()),
            port: self.port.or(defaults.port),
            username: self.username.clone().or_else(|| defaults.username.clone()),
            password: credentials.password.clone(),
            password_env: credentials.password_env.clone(),
            key_path: credentials.key_path.clone(),
            key_env: credentials.key_env.clone(),
            profile: self.profile.clone().or_else(|| defaults.profile.clone()),
        }
    }

    /// Login secret, first of password, password env, key file, key env
    #[must_use]
    pub fn secret(&self) -> Option<Secret> {
        if let Some(password) = &self.password {
            Some(Secret::Password(password.clone()))
        } else if let Some(var) = &self.password_env {
            Some(Secret::PasswordEnv(var.clone()))
        } else if let Some(path) = &self.key_path {
            Some(Secret::KeyPath(path.clone()))
        } else {
            self.key_env.clone().map(Secret::KeyEnv)
        }
    }
}

impl NetboxConfig {
    /// Resolve the API token
    ///
    /// # Errors
    /// Returns error if neither `token` nor a set `token_env` is available
    pub fn token(&self) -> eyre::Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let var = self
            .token_env
            .as_deref()
            .ok_or_else(|| eyre!("[netbox] needs token or token_env"))?;
        std::env::var(var).wrap_err_with(|| format!("NetBox token variable {var} is not set"))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    /// Find and load the config file
    ///
    /// An explicit path (from `--config` or `NBSYNC_CONFIG`) is used as is;
    /// otherwise `./nbsync.toml`, `/etc/nbsync/nbsync.toml` and the user
    /// config directory are tried in order.
    ///
    /// # Errors
    /// Returns error if no file is found or it fails to load
    pub fn locate(explicit: Option<&Path>) -> eyre::Result<(PathBuf, Self)> {
        if let Some(path) = explicit {
            return Ok((path.to_path_buf(), Self::load(path)?));
        }

        let mut candidates = vec![
            PathBuf::from("nbsync.toml"),
            PathBuf::from("/etc/nbsync/nbsync.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("nbsync/nbsync.toml"));
        }

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "using config file");
                return Ok((path.clone(), Self::load(path)?));
            }
        }

        bail!(
            "no config file found (tried {})",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    /// Check everything that does not require touching the filesystem
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> eyre::Result<()> {
        if self.netbox.url.trim().is_empty() {
            bail!("[netbox] url must not be empty");
        }
        if self.netbox.token.is_none() && self.netbox.token_env.is_none() {
            bail!("[netbox] needs token or token_env");
        }
        self.sync_config().validate()?;

        for (name, profile) in &self.profiles {
            if profile.commands.is_empty() {
                bail!("profile {name} has no commands");
            }
        }

        for (idx, device) in self.devices.iter().enumerate() {
            let device = device.merged(&self.device_defaults);
            let host = device
                .host
                .as_deref()
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| eyre!("device #{} has no host", idx + 1))?;
            let profile = device
                .profile
                .as_deref()
                .ok_or_else(|| eyre!("device {host} has no profile"))?;
            if !self.profiles.contains_key(profile) {
                return Err(nbsync_core::CoreError::UnknownProfile {
                    host: host.to_string(),
                    profile: profile.to_string(),
                }
                .into());
            }
            if device.username.is_none() {
                bail!("device {host} has no username");
            }
            if !device.has_credentials() {
                bail!("device {host} has no credentials");
            }
        }

        Ok(())
    }

    /// Role table from `[[roles]]`, or the built-in one
    #[must_use]
    pub fn role_table(&self) -> RoleTable {
        if self.roles.is_empty() {
            RoleTable::default()
        } else {
            RoleTable::new(self.roles.clone())
        }
    }

    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default().with_max_workers(self.sync.max_workers)
    }

    /// Compile every profile and build the sessions to poll
    ///
    /// Template paths resolve against `base_dir`. `only` restricts the run
    /// to the listed hosts; every listed host must exist.
    ///
    /// # Errors
    /// Returns error if a template fails to compile, a device is invalid,
    /// or a host in `only` is not configured
    pub fn sessions(&self, base_dir: &Path, only: &[String]) -> eyre::Result<Vec<SessionSpec>> {
        let mut registry = TemplateRegistry::new().with_base_dir(base_dir);
        let mut profiles = HashMap::new();
        for (name, profile) in &self.profiles {
            let commands: Vec<(String, PathBuf)> = profile
                .commands
                .iter()
                .map(|c| (c.command.clone(), c.template.clone()))
                .collect();
            let loaded = VendorProfile::load(name.clone(), &commands, &mut registry)?;
            profiles.insert(name.clone(), Arc::new(loaded));
        }
        tracing::info!(
            profiles = profiles.len(),
            templates = registry.len(),
            "templates compiled"
        );

        for host in only {
            let known = self
                .devices
                .iter()
                .any(|d| d.merged(&self.device_defaults).host.as_deref() == Some(host.as_str()));
            if !known {
                bail!("--device {host} is not in the config");
            }
        }

        let mut sessions = Vec::new();
        for device in &self.devices {
            let device = device.merged(&self.device_defaults);
            let (Some(host), Some(username), Some(secret), Some(profile)) = (
                device.host.clone(),
                device.username.clone(),
                device.secret(),
                device.profile.as_deref(),
            ) else {
                bail!("incomplete device entry {:?}; run validate first", device.host);
            };
            if !only.is_empty() && !only.contains(&host) {
                continue;
            }
            let profile = profiles.get(profile).ok_or_else(|| {
                nbsync_core::CoreError::UnknownProfile {
                    host: host.clone(),
                    profile: profile.to_string(),
                }
            })?;

            let mut connection = ConnectionInfo::new(host, username, secret);
            if let Some(port) = device.port {
                connection = connection.with_port(port);
            }
            sessions.push(SessionSpec::new(connection, Arc::clone(profile)));
        }

        Ok(sessions)
    }
}
