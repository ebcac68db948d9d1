//! nbsync-api: shared event and report types
//!
//! Progress events emitted while a run is in flight and the structured
//! report produced at its end. Both serialize to JSON for `--report json`.

pub mod events;
pub mod report;

pub use events::{EntityKind, SyncEvent};
pub use report::{Change, ChangeCounts, DeviceFailure, EntityFailure, FailureStage, RunReport};
