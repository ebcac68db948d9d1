//! Per-device reconciliation state machine

use std::fmt;

use chrono::{DateTime, Utc};

/// Steps a device passes through while it is reconciled
///
/// Steps are strictly ordered; any step may fall into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncState {
    Discovered,
    SiteResolved,
    ManufacturerResolved,
    RoleResolved,
    TypeResolved,
    DeviceResolved,
    InterfacesReconciled,
    AddressesReconciled,
    PrefixesReconciled,
    Done,
    Failed,
}

impl SyncState {
    /// The step that follows this one on success
    #[must_use]
    pub fn next(self) -> Option<SyncState> {
        use SyncState::*;
        match self {
            Discovered => Some(SiteResolved),
            SiteResolved => Some(ManufacturerResolved),
            ManufacturerResolved => Some(RoleResolved),
            RoleResolved => Some(TypeResolved),
            TypeResolved => Some(DeviceResolved),
            DeviceResolved => Some(InterfacesReconciled),
            InterfacesReconciled => Some(AddressesReconciled),
            AddressesReconciled => Some(PrefixesReconciled),
            PrefixesReconciled => Some(Done),
            Done | Failed => None,
        }
    }

    /// Check whether a transition to `target` is allowed
    #[must_use]
    pub fn can_transition_to(self, target: SyncState) -> bool {
        match target {
            SyncState::Failed => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncState::Done | SyncState::Failed)
    }

    /// Name of the step being attempted from this state, used in failures
    #[must_use]
    pub fn pending_step(self) -> &'static str {
        match self {
            SyncState::Discovered => "site",
            SyncState::SiteResolved => "manufacturer",
            SyncState::ManufacturerResolved => "role",
            SyncState::RoleResolved => "device_type",
            SyncState::TypeResolved => "device",
            SyncState::DeviceResolved => "interfaces",
            SyncState::InterfacesReconciled => "addresses",
            SyncState::AddressesReconciled => "prefixes",
            SyncState::PrefixesReconciled | SyncState::Done | SyncState::Failed => "done",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Discovered => "DISCOVERED",
            SyncState::SiteResolved => "SITE_RESOLVED",
            SyncState::ManufacturerResolved => "MANUFACTURER_RESOLVED",
            SyncState::RoleResolved => "ROLE_RESOLVED",
            SyncState::TypeResolved => "TYPE_RESOLVED",
            SyncState::DeviceResolved => "DEVICE_RESOLVED",
            SyncState::InterfacesReconciled => "INTERFACES_RECONCILED",
            SyncState::AddressesReconciled => "ADDRESSES_RECONCILED",
            SyncState::PrefixesReconciled => "PREFIXES_RECONCILED",
            SyncState::Done => "DONE",
            SyncState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Failed state details
#[derive(Debug, Clone)]
pub struct FailedState {
    /// Last state reached before failing
    pub previous_state: SyncState,
    /// Step that was being attempted
    pub step: &'static str,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedState {
    #[must_use]
    pub fn new(previous_state: SyncState, reason: impl Into<String>) -> Self {
        Self {
            previous_state,
            step: previous_state.pending_step(),
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_linear() {
        let mut state = SyncState::Discovered;
        let mut steps = 0;
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(next));
            state = next;
            steps += 1;
        }
        assert_eq!(state, SyncState::Done);
        assert_eq!(steps, 9);
    }

    #[test]
    fn test_cannot_skip_steps() {
        assert!(!SyncState::Discovered.can_transition_to(SyncState::RoleResolved));
        assert!(!SyncState::DeviceResolved.can_transition_to(SyncState::SiteResolved));
    }

    #[test]
    fn test_failure_from_any_active_state() {
        assert!(SyncState::Discovered.can_transition_to(SyncState::Failed));
        assert!(SyncState::AddressesReconciled.can_transition_to(SyncState::Failed));
        assert!(!SyncState::Done.can_transition_to(SyncState::Failed));
        assert!(!SyncState::Failed.can_transition_to(SyncState::Failed));
    }

    #[test]
    fn test_failed_state_names_step() {
        let failed = FailedState::new(SyncState::ManufacturerResolved, "role missing");
        assert_eq!(failed.step, "role");
        assert_eq!(SyncState::InterfacesReconciled.to_string(), "INTERFACES_RECONCILED");
    }
}
