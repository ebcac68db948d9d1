//! SSH sessions using the russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument};

use crate::credentials::ResolvedSecret;
use crate::error::ExecError;
use crate::result::{CommandOutput, ConnectionInfo};
use crate::traits::{Connector, Session};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        // TODO: verify against a known_hosts file once the config carries one
        Ok(true)
    }
}

/// Opens SSH sessions to network devices
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(60),
        }
    }
}

impl SshConnector {
    /// Create a connector with default timeouts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TCP + handshake + auth deadline
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-command deadline
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[instrument(skip(self, info), fields(host = %info.host))]
    async fn connect(
        &self,
        info: &ConnectionInfo,
    ) -> Result<client::Handle<SshClientHandler>, ExecError> {
        info!(
            host = %info.host,
            port = info.port,
            user = %info.username,
            "connecting to SSH"
        );

        let secret = info
            .secret
            .resolve()
            .map_err(|e| ExecError::CredentialError(e.to_string()))?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.command_timeout),
            ..client::Config::default()
        });

        let mut session = client::connect(config, (&info.host[..], info.port), SshClientHandler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let auth_res = match secret {
            ResolvedSecret::Password(password) => session
                .authenticate_password(&info.username, password)
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?,
            ResolvedSecret::Key(key) => {
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                session
                    .authenticate_publickey(&info.username, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await
                    .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(format!(
                "{} rejected credentials for {}",
                info.host, info.username
            )));
        }

        info!(host = %info.host, "SSH connected and authenticated");

        Ok(session)
    }

    /// `connect` under the connect deadline
    async fn handshake(
        &self,
        info: &ConnectionInfo,
    ) -> Result<client::Handle<SshClientHandler>, ExecError> {
        timeout(self.connect_timeout, self.connect(info))
            .await
            .map_err(|_| {
                error!(host = %info.host, timeout = ?self.connect_timeout, "connect timed out");
                ExecError::Timeout {
                    timeout: self.connect_timeout,
                }
            })?
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, info: &ConnectionInfo) -> Result<Arc<dyn Session>, ExecError> {
        let handle = self.handshake(info).await?;

        Ok(Arc::new(SshSession {
            connector: self.clone(),
            info: info.clone(),
            session: Mutex::new(Some(handle)),
        }))
    }
}

/// One authenticated SSH session
///
/// Each command runs on its own exec channel of the shared connection.
/// Cisco IOS and some other network OSes drop the connection once an exec
/// channel closes; the next command then logs in again transparently.
pub struct SshSession {
    connector: SshConnector,
    info: ConnectionInfo,
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.info.host)
            .field("command_timeout", &self.connector.command_timeout)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Replace a connection the device has closed
    async fn reconnect(
        &self,
        session: &mut client::Handle<SshClientHandler>,
    ) -> Result<(), ExecError> {
        info!(host = %self.info.host, "connection closed by device, reconnecting");
        *session = self.connector.handshake(&self.info).await?;
        Ok(())
    }

    #[instrument(skip(self, cmd), fields(host = %self.info.host))]
    async fn execute_remote(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        let mut session_lock = self.session.lock().await;
        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        if session.is_closed() {
            self.reconnect(session).await?;
        }

        let mut channel = match session.channel_open_session().await {
            Ok(channel) => channel,
            // the close can race the previous channel's teardown
            Err(_) if session.is_closed() => {
                self.reconnect(session).await?;
                session
                    .channel_open_session()
                    .await
                    .map_err(|e| ExecError::TransportError(e.to_string()))?
            }
            Err(e) => return Err(ExecError::TransportError(e.to_string())),
        };

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::TransportError(e.to_string()))?;

        let mut status = None;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // Some platforms send the exit status after EOF, so drain until close.
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = Some(exit_status.cast_signed());
                }
                Some(ChannelMsg::Close) | None => break,
                _ => {}
            }
        }

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(
            command = %cmd,
            status = ?status,
            bytes = stdout.len(),
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandOutput {
            command: cmd.to_string(),
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

#[async_trait]
impl Session for SshSession {
    async fn execute(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        let command_timeout = self.connector.command_timeout;
        match timeout(command_timeout, self.execute_remote(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    host = %self.info.host,
                    command = %cmd,
                    timeout = ?command_timeout,
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: command_timeout,
                })
            }
        }
    }

    async fn close(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::TransportError(e.to_string()))?;
            info!(host = %self.info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn session_type(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Secret;

    #[test]
    fn test_connector_timeouts() {
        let connector = SshConnector::new()
            .with_connect_timeout(Duration::from_secs(3))
            .with_command_timeout(Duration::from_secs(30));
        assert_eq!(connector.connect_timeout, Duration::from_secs(3));
        assert_eq!(connector.command_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_unresolvable_credentials_fail_before_connecting() {
        let connector = SshConnector::new();
        let info = ConnectionInfo::new(
            "192.0.2.1",
            "admin",
            Secret::PasswordEnv("NBSYNC_TEST_SURELY_UNSET_VAR".into()),
        );

        let err = connector.open(&info).await.err().unwrap();
        assert!(matches!(err, ExecError::CredentialError(_)));
    }

    #[tokio::test]
    #[ignore = "requires an IOS device"]
    async fn test_commands_survive_device_closing_connection() {
        let connector = SshConnector::new();
        let info = ConnectionInfo::new("127.0.0.1", "admin", Secret::Password("admin".into()));
        let session = connector.open(&info).await.unwrap();
        for cmd in ["show version", "show inventory", "show ip interface"] {
            let output = session.execute(cmd).await.unwrap();
            assert!(!output.stdout.is_empty(), "{cmd}");
        }
        session.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_show_version() {
        let connector = SshConnector::new();
        let info = ConnectionInfo::new("127.0.0.1", "admin", Secret::Password("admin".into()));
        let session = connector.open(&info).await.unwrap();
        let output = session.execute("show version").await.unwrap();
        assert!(!output.stdout.is_empty());
        session.close().await.unwrap();
    }
}
