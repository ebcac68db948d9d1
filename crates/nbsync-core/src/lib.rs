//! nbsync-core: collection, aggregation and reconciliation
//!
//! Polls devices through a [`nbsync_exec::Connector`], folds the extracted
//! records into one [`DeviceState`] per device and converges an
//! [`nbsync_netbox::InventoryStore`] to it. Shared entities are created
//! through a single kameo actor so parallel devices never race.

pub mod actor;
pub mod aggregate;
pub mod collector;
pub mod config;
pub mod device;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod reconcile;
pub mod state;

pub use actor::{SharedEntities, SharedEntityActor, SharedEntityActorArgs};
pub use aggregate::{CommandRecords, UNKNOWN_MODEL, aggregate, parse_hostname};
pub use collector::{CollectOutcome, Collector, DeviceOutput};
pub use config::{
    CommandSpec, MAX_WORKERS_LIMIT, RoleCode, RoleTable, SessionSpec, SyncConfig, VendorProfile,
};
pub use device::{DeviceState, HostnameParts, InterfaceState};
pub use error::{AggregateError, CoreError, ReconcileError};
pub use message::Resolved;
pub use pipeline::SyncPipeline;
pub use reconcile::{DeviceOutcome, DeviceReconciler, interface_patch};
pub use state::{FailedState, SyncState};
