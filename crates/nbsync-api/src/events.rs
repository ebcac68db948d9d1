//! Progress event types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Inventory entity types the engine touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Site,
    Manufacturer,
    Role,
    DeviceType,
    Device,
    Interface,
    IpAddress,
    Prefix,
    Vrf,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Site => "site",
            EntityKind::Manufacturer => "manufacturer",
            EntityKind::Role => "role",
            EntityKind::DeviceType => "device type",
            EntityKind::Device => "device",
            EntityKind::Interface => "interface",
            EntityKind::IpAddress => "ip address",
            EntityKind::Prefix => "prefix",
            EntityKind::Vrf => "vrf",
        };
        f.write_str(name)
    }
}

/// Event broadcast while a run progresses
///
/// Ordering across devices is not guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    DevicePolling {
        host: String,
    },
    DeviceCollected {
        host: String,
        commands: usize,
    },
    DeviceUnreachable {
        host: String,
        reason: String,
    },
    DeviceStateChanged {
        host: String,
        from: String,
        to: String,
    },
    EntityCreated {
        host: String,
        kind: EntityKind,
        key: String,
    },
    EntityUpdated {
        host: String,
        kind: EntityKind,
        key: String,
        fields: Vec<String>,
    },
    EntityDeleted {
        host: String,
        kind: EntityKind,
        key: String,
    },
    EntityConflict {
        host: String,
        kind: EntityKind,
        key: String,
        reason: String,
    },
    RunFinished {
        devices: usize,
        synced: usize,
        failed: usize,
    },
}

impl SyncEvent {
    /// Host the event is about, if any
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        match self {
            SyncEvent::DevicePolling { host }
            | SyncEvent::DeviceCollected { host, .. }
            | SyncEvent::DeviceUnreachable { host, .. }
            | SyncEvent::DeviceStateChanged { host, .. }
            | SyncEvent::EntityCreated { host, .. }
            | SyncEvent::EntityUpdated { host, .. }
            | SyncEvent::EntityDeleted { host, .. }
            | SyncEvent::EntityConflict { host, .. } => Some(host),
            SyncEvent::RunFinished { .. } => None,
        }
    }
}
