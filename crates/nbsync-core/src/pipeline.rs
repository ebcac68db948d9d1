//! One sync run: collect, extract, aggregate, reconcile

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use nbsync_api::{DeviceFailure, FailureStage, RunReport, SyncEvent};
use nbsync_exec::Connector;
use nbsync_netbox::InventoryStore;

use crate::actor::SharedEntities;
use crate::aggregate::{CommandRecords, aggregate};
use crate::collector::{Collector, DeviceOutput};
use crate::config::{RoleTable, SessionSpec, SyncConfig};
use crate::device::DeviceState;
use crate::error::{AggregateError, CoreError};
use crate::reconcile::{DeviceOutcome, DeviceReconciler};
use crate::state::SyncState;

/// Drives devices from remote sessions into the inventory store
pub struct SyncPipeline {
    connector: Arc<dyn Connector>,
    store: Arc<dyn InventoryStore>,
    roles: RoleTable,
    config: SyncConfig,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncPipeline {
    /// Build a pipeline
    ///
    /// # Errors
    /// Returns `CoreError::InvalidMaxWorkers` if the limits are invalid.
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn InventoryStore>,
        roles: RoleTable,
        config: SyncConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Ok(Self {
            connector,
            store,
            roles,
            config,
            event_tx,
        })
    }

    /// Receive progress events of subsequent runs
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Sync every device and report the outcome
    ///
    /// Failures are contained to their device or entity and recorded in the
    /// returned report.
    #[instrument(skip_all, fields(devices = devices.len()))]
    pub async fn run(&self, devices: Vec<SessionSpec>) -> RunReport {
        let mut report = RunReport::new(devices.len());
        info!(max_workers = self.config.max_workers, "sync run starting");

        let collector = Collector::new(
            Arc::clone(&self.connector),
            self.config.max_workers,
            self.event_tx.clone(),
        );
        let collected = collector.collect(devices).await;
        report.device_failures.extend(collected.failures);

        let mut states = Vec::with_capacity(collected.outputs.len());
        for output in &collected.outputs {
            match build_state(output, &self.roles) {
                Ok(state) => states.push(state),
                Err(e) => {
                    warn!(host = output.host(), error = %e, "device skipped before reconciliation");
                    report.device_failures.push(DeviceFailure {
                        host: output.host().to_string(),
                        stage: FailureStage::Aggregate,
                        step: None,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let shared = SharedEntities::spawn(Arc::clone(&self.store));
        let (outcomes, crashed) = self.reconcile_all(states, &shared).await;
        report.device_failures.extend(crashed);
        for outcome in outcomes {
            report.merge_changes(&outcome.changes);
            report.entity_failures.extend(outcome.entity_failures);

            match (outcome.state, outcome.failure) {
                (SyncState::Done, _) => report.devices_synced.push(outcome.host),
                (_, failure) => {
                    let (step, reason) = match failure {
                        Some((failed, _)) => (Some(failed.step.to_string()), failed.reason),
                        None => (None, format!("stopped in state {}", outcome.state)),
                    };
                    report.device_failures.push(DeviceFailure {
                        host: outcome.host,
                        stage: FailureStage::Reconcile,
                        step,
                        reason,
                    });
                }
            }
        }
        shared.shutdown().await;

        report.device_failures.sort_by(|a, b| a.host.cmp(&b.host));
        report.finish();

        let _ = self.event_tx.send(SyncEvent::RunFinished {
            devices: report.devices_total,
            synced: report.devices_synced.len(),
            failed: report.device_failures.len(),
        });
        info!(
            synced = report.devices_synced.len(),
            failed = report.device_failures.len(),
            changes = report.total_changes().total(),
            "sync run finished"
        );

        report
    }

    /// Reconcile devices in parallel, bounded by `max_workers`
    async fn reconcile_all(
        &self,
        states: Vec<DeviceState>,
        shared: &SharedEntities,
    ) -> (Vec<DeviceOutcome>, Vec<DeviceFailure>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks = JoinSet::new();
        let mut hosts = HashMap::new();

        for (index, state) in states.into_iter().enumerate() {
            let host = state.hostname.clone();
            let reconciler = DeviceReconciler::new(
                state.hostname.clone(),
                Arc::clone(&self.store),
                shared.clone(),
                self.event_tx.clone(),
            );
            let semaphore = Arc::clone(&semaphore);

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, reconciler.reconcile(&state).await)
            });
            hosts.insert(handle.id(), host);
        }

        let mut outcomes = Vec::new();
        let mut crashed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => outcomes.push(done),
                Err(e) => {
                    let host = hosts.remove(&e.id()).unwrap_or_default();
                    error!(host = %host, error = %e, "reconcile task failed");
                    crashed.push(DeviceFailure {
                        host,
                        stage: FailureStage::Reconcile,
                        step: None,
                        reason: e.to_string(),
                    });
                }
            }
        }

        outcomes.sort_by_key(|(index, _)| *index);
        let outcomes = outcomes.into_iter().map(|(_, outcome)| outcome).collect();
        (outcomes, crashed)
    }
}

/// Extract every command output and fold the records into a device state
fn build_state(
    output: &DeviceOutput,
    roles: &RoleTable,
) -> Result<DeviceState, AggregateError> {
    let profile = &output.spec.profile;
    let records: Vec<CommandRecords> = profile
        .commands
        .iter()
        .zip(&output.outputs)
        .map(|(command, raw)| {
            (
                command.command.clone(),
                command.template.extract(&raw.stdout),
            )
        })
        .collect();

    aggregate(&profile.name, &records, roles)
}
