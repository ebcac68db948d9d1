//! Parallel collector: one session per device, commands run in order

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use nbsync_api::{DeviceFailure, FailureStage, SyncEvent};
use nbsync_exec::{CommandOutput, Connector, ExecError, Session};

use crate::config::SessionSpec;

/// Raw output of one device, one entry per profile command
#[derive(Debug, Clone)]
pub struct DeviceOutput {
    pub spec: SessionSpec,
    pub outputs: Vec<CommandOutput>,
}

impl DeviceOutput {
    #[must_use]
    pub fn host(&self) -> &str {
        self.spec.host()
    }
}

/// Result of polling every device
#[derive(Debug, Default)]
pub struct CollectOutcome {
    /// Reachable devices, in input order
    pub outputs: Vec<DeviceOutput>,
    /// Devices that could not be polled, sorted by host
    pub failures: Vec<DeviceFailure>,
}

/// Polls devices concurrently, bounded by `max_workers`
pub struct Collector {
    connector: Arc<dyn Connector>,
    max_workers: usize,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl Collector {
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        max_workers: usize,
        event_tx: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            connector,
            max_workers: max_workers.max(1),
            event_tx,
        }
    }

    /// Run every device's command list
    ///
    /// A device that fails to connect, authenticate or execute is dropped
    /// from `outputs` and recorded in `failures`. Siblings keep running.
    #[instrument(skip_all, fields(devices = devices.len(), max_workers = self.max_workers))]
    pub async fn collect(&self, devices: Vec<SessionSpec>) -> CollectOutcome {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        let mut hosts = HashMap::new();

        for (index, spec) in devices.into_iter().enumerate() {
            let host = spec.host().to_string();
            let connector = Arc::clone(&self.connector);
            let semaphore = Arc::clone(&semaphore);
            let event_tx = self.event_tx.clone();

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let _ = event_tx.send(SyncEvent::DevicePolling {
                    host: spec.host().to_string(),
                });
                let result = poll_device(connector.as_ref(), &spec).await;
                (index, spec, result)
            });
            hosts.insert(handle.id(), host);
        }

        let mut outcome = CollectOutcome::default();
        let mut collected = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, spec, Ok(outputs))) => {
                    info!(host = spec.host(), commands = outputs.len(), "device collected");
                    let _ = self.event_tx.send(SyncEvent::DeviceCollected {
                        host: spec.host().to_string(),
                        commands: outputs.len(),
                    });
                    collected.push((index, DeviceOutput { spec, outputs }));
                }
                Ok((_, spec, Err(e))) => {
                    error!(
                        host = spec.host(),
                        kind = e.kind(),
                        transient = e.is_transient(),
                        error = %e,
                        "device unreachable"
                    );
                    outcome.failures.push(self.unreachable(spec.host(), e.to_string()));
                }
                Err(e) => {
                    let host = hosts.remove(&e.id()).unwrap_or_default();
                    error!(host = %host, error = %e, "collector task failed");
                    outcome.failures.push(self.unreachable(&host, e.to_string()));
                }
            }
        }

        collected.sort_by_key(|(index, _)| *index);
        outcome.outputs = collected.into_iter().map(|(_, output)| output).collect();
        outcome.failures.sort_by(|a, b| a.host.cmp(&b.host));
        outcome
    }

    fn unreachable(&self, host: &str, reason: String) -> DeviceFailure {
        let _ = self.event_tx.send(SyncEvent::DeviceUnreachable {
            host: host.to_string(),
            reason: reason.clone(),
        });
        DeviceFailure {
            host: host.to_string(),
            stage: FailureStage::Collect,
            step: None,
            reason,
        }
    }
}

async fn poll_device(
    connector: &dyn Connector,
    spec: &SessionSpec,
) -> Result<Vec<CommandOutput>, ExecError> {
    let session = connector.open(&spec.connection).await?;
    debug!(host = spec.host(), session = session.session_type(), "session open");

    let result = run_commands(session.as_ref(), spec).await;

    if let Err(e) = session.close().await {
        debug!(host = spec.host(), error = %e, "session close failed");
    }
    result
}

async fn run_commands(
    session: &dyn Session,
    spec: &SessionSpec,
) -> Result<Vec<CommandOutput>, ExecError> {
    let mut outputs = Vec::with_capacity(spec.profile.commands.len());

    for command in &spec.profile.commands {
        let output = session.execute(&command.command).await?;
        if !output.success() {
            warn!(
                host = spec.host(),
                command = %command.command,
                status = ?output.status,
                stderr = output.stderr.trim(),
                "command exited non-zero, keeping output"
            );
        }
        outputs.push(output);
    }

    Ok(outputs)
}
