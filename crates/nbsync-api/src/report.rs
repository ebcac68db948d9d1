//! End-of-run report

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EntityKind;

/// A mutation applied to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Deleted,
}

/// Mutation counters for one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn record(&mut self, change: Change) {
        match change {
            Change::Created => self.created += 1,
            Change::Updated => self.updated += 1,
            Change::Deleted => self.deleted += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl std::ops::AddAssign for ChangeCounts {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Pipeline stage a device failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Collect,
    Aggregate,
    Reconcile,
}

/// A device that did not converge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFailure {
    /// Hostname when known, otherwise the connection address
    pub host: String,
    pub stage: FailureStage,
    /// Reconciliation step that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub reason: String,
}

/// A single entity the store rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub host: String,
    pub kind: EntityKind,
    pub key: String,
    pub reason: String,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub devices_total: usize,
    pub devices_synced: Vec<String>,
    pub device_failures: Vec<DeviceFailure>,
    pub entity_failures: Vec<EntityFailure>,
    pub changes: BTreeMap<EntityKind, ChangeCounts>,
}

impl RunReport {
    #[must_use]
    pub fn new(devices_total: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            devices_total,
            devices_synced: Vec::new(),
            device_failures: Vec::new(),
            entity_failures: Vec::new(),
            changes: BTreeMap::new(),
        }
    }

    pub fn record_change(&mut self, kind: EntityKind, change: Change) {
        self.changes.entry(kind).or_default().record(change);
    }

    /// Add one device's change counters
    pub fn merge_changes(&mut self, changes: &BTreeMap<EntityKind, ChangeCounts>) {
        for (kind, counts) in changes {
            *self.changes.entry(*kind).or_default() += *counts;
        }
    }

    pub fn finish(&mut self) {
        self.devices_synced.sort();
        self.finished_at = Some(Utc::now());
    }

    /// Changes summed over all entity kinds
    #[must_use]
    pub fn total_changes(&self) -> ChangeCounts {
        let mut total = ChangeCounts::default();
        for counts in self.changes.values() {
            total += *counts;
        }
        total
    }

    /// Counters for one entity kind
    #[must_use]
    pub fn changes_for(&self, kind: EntityKind) -> ChangeCounts {
        self.changes.get(&kind).copied().unwrap_or_default()
    }

    /// No device or entity failed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.device_failures.is_empty() && self.entity_failures.is_empty()
    }
}
