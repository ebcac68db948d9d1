//! Per-device reconciliation
//!
//! Converges the store to one [`DeviceState`] in dependency order. Shared
//! entities go through [`SharedEntities`]; the device and its interfaces,
//! addresses and prefixes are handled here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ipnet::Ipv4Net;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use nbsync_api::{Change, ChangeCounts, EntityFailure, EntityKind, SyncEvent};
use nbsync_netbox::{
    Interface, InterfaceKind, InterfacePatch, InventoryStore, NewDevice, NewInterface,
    NewIpAddress, StoreError,
};

use crate::actor::resolver::settle;
use crate::actor::SharedEntities;
use crate::aggregate::normalize_mac;
use crate::device::{DeviceState, InterfaceState};
use crate::error::ReconcileError;
use crate::message::Resolved;
use crate::state::{FailedState, SyncState};

/// What happened to one device
#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    pub host: String,
    /// `Done` or `Failed`
    pub state: SyncState,
    /// Failure details and error category when `state` is `Failed`
    pub failure: Option<(FailedState, &'static str)>,
    pub changes: BTreeMap<EntityKind, ChangeCounts>,
    pub entity_failures: Vec<EntityFailure>,
}

/// Drives one device through the reconciliation state machine
pub struct DeviceReconciler {
    host: String,
    store: Arc<dyn InventoryStore>,
    shared: SharedEntities,
    event_tx: broadcast::Sender<SyncEvent>,
    state: SyncState,
    failed: Option<(FailedState, &'static str)>,
    changes: BTreeMap<EntityKind, ChangeCounts>,
    entity_failures: Vec<EntityFailure>,
}

impl DeviceReconciler {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        store: Arc<dyn InventoryStore>,
        shared: SharedEntities,
        event_tx: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            host: host.into(),
            store,
            shared,
            event_tx,
            state: SyncState::Discovered,
            failed: None,
            changes: BTreeMap::new(),
            entity_failures: Vec::new(),
        }
    }

    /// Reconcile `device` and report the outcome
    ///
    /// Never fails: a device-level error moves the machine to `Failed`
    /// and is reported in the outcome. Steps already applied stay applied.
    #[instrument(skip(self, device), fields(host = %self.host))]
    pub async fn reconcile(mut self, device: &DeviceState) -> DeviceOutcome {
        if let Err(e) = self.run_steps(device).await {
            self.fail_with_error(&e);
        }

        DeviceOutcome {
            host: self.host,
            state: self.state,
            failure: self.failed,
            changes: self.changes,
            entity_failures: self.entity_failures,
        }
    }

    async fn run_steps(&mut self, device: &DeviceState) -> Result<(), ReconcileError> {
        let site = self.shared.site(&device.site).await?;
        self.note_shared(EntityKind::Site, &device.site, site);
        self.transition_to(SyncState::SiteResolved)?;

        let manufacturer = self
            .shared
            .manufacturer(&device.model, &device.vendor)
            .await?;
        self.transition_to(SyncState::ManufacturerResolved)?;

        let role = self
            .shared
            .role(&device.role_token, device.role.as_deref())
            .await?;
        self.transition_to(SyncState::RoleResolved)?;

        let device_type = self
            .shared
            .device_type(&device.model, manufacturer.id)
            .await?;
        self.note_shared(EntityKind::DeviceType, &device.model, device_type);
        self.transition_to(SyncState::TypeResolved)?;

        let device_id = self
            .resolve_device(device, site.id, role.id, device_type.id)
            .await?;
        self.transition_to(SyncState::DeviceResolved)?;

        let interfaces = self.reconcile_interfaces(device_id, device).await;
        self.transition_to(SyncState::InterfacesReconciled)?;

        self.reconcile_addresses(&interfaces).await;
        self.transition_to(SyncState::AddressesReconciled)?;

        self.reconcile_prefixes(device).await;
        self.transition_to(SyncState::PrefixesReconciled)?;

        self.transition_to(SyncState::Done)
    }

    async fn resolve_device(
        &mut self,
        device: &DeviceState,
        site_id: u64,
        role_id: u64,
        device_type_id: u64,
    ) -> Result<u64, ReconcileError> {
        let store = &self.store;
        let name = device.hostname.as_str();

        if let Some(existing) = store.get_device(name).await? {
            debug!(id = existing.id, "device exists");
            return Ok(existing.id);
        }

        let new = NewDevice {
            name: device.hostname.clone(),
            device_type: device_type_id,
            role: role_id,
            site: site_id,
            serial: device.serial.clone(),
            status: "active",
        };
        let created = store.create_device(&new).await;
        let resolved = settle("device", created, move || async move {
            Ok::<_, StoreError>(store.get_device(name).await?.map(|d| d.id))
        })
        .await?;

        if resolved.created {
            self.record(EntityKind::Device, name, Change::Created);
        }
        Ok(resolved.id)
    }

    /// Create missing interfaces and patch drifted ones; returns the
    /// interfaces that exist in the store with their ids
    async fn reconcile_interfaces<'d>(
        &mut self,
        device_id: u64,
        device: &'d DeviceState,
    ) -> Vec<(&'d InterfaceState, u64)> {
        let mut resolved = Vec::with_capacity(device.interfaces.len());

        for iface in &device.interfaces {
            match self.reconcile_interface(device_id, iface).await {
                Ok(id) => resolved.push((iface, id)),
                Err(e) => self.entity_failed(EntityKind::Interface, &iface.name, &e.into()),
            }
        }

        resolved
    }

    async fn reconcile_interface(
        &mut self,
        device_id: u64,
        iface: &InterfaceState,
    ) -> Result<u64, StoreError> {
        let name = iface.name.as_str();

        let Some(stored) = self.store.get_interface(device_id, name).await? else {
            let new = NewInterface {
                device: device_id,
                name: iface.name.clone(),
                kind: InterfaceKind::for_name(&iface.name),
                enabled: iface.enabled,
                mtu: iface.mtu,
                mac_address: iface.mac.clone(),
                description: iface.description.clone(),
            };
            let created = self.store.create_interface(&new).await?;
            self.record(EntityKind::Interface, name, Change::Created);
            return Ok(created.id);
        };

        let patch = interface_patch(&stored, iface);
        if !patch.is_empty() {
            self.store.update_interface(stored.id, &patch).await?;
            let fields = patch.changed_fields();
            info!(interface = name, ?fields, "interface updated");
            self.emit(SyncEvent::EntityUpdated {
                host: self.host.clone(),
                kind: EntityKind::Interface,
                key: name.to_string(),
                fields: fields.into_iter().map(str::to_string).collect(),
            });
            self.count(EntityKind::Interface, Change::Updated);
        }

        Ok(stored.id)
    }

    /// Make each interface's stored IPv4 set equal its live set
    ///
    /// Stale records are deleted across the whole device before anything is
    /// created, so an address that changed mask, VRF or interface does not
    /// collide with its old record in a store enforcing unique addresses.
    async fn reconcile_addresses<'d>(&mut self, interfaces: &[(&'d InterfaceState, u64)]) {
        let mut plans = Vec::with_capacity(interfaces.len());

        for &(iface, interface_id) in interfaces {
            let vrf_id = match &iface.vrf {
                Some(vrf) => match self.shared.vrf(vrf).await {
                    Ok(id) => id,
                    Err(e) => {
                        self.entity_failed(EntityKind::Vrf, vrf, &e);
                        continue;
                    }
                },
                None => None,
            };

            let stored = match self.store.list_ip_addresses(interface_id).await {
                Ok(stored) => stored,
                Err(e) => {
                    self.entity_failed(EntityKind::IpAddress, &iface.name, &e.into());
                    continue;
                }
            };

            let stored = stored
                .iter()
                .filter_map(|addr| {
                    let vrf = addr.vrf.as_ref().map(|v| v.id);
                    addr.ipv4().map(|net| ((net, vrf), addr.id))
                })
                .collect();

            plans.push(AddressPlan {
                iface,
                interface_id,
                vrf_id,
                stored,
            });
        }

        for plan in &plans {
            for (address, id) in plan.stale() {
                match self.store.delete_ip_address(id).await {
                    Ok(()) => {
                        self.record(EntityKind::IpAddress, &address.to_string(), Change::Deleted);
                    }
                    Err(e) => {
                        self.entity_failed(EntityKind::IpAddress, &address.to_string(), &e.into());
                    }
                }
            }
        }

        for plan in &plans {
            for address in plan.missing() {
                let new = NewIpAddress::on_interface(address, plan.interface_id, plan.vrf_id);
                match self.store.create_ip_address(&new).await {
                    Ok(_) => {
                        self.record(EntityKind::IpAddress, &address.to_string(), Change::Created);
                    }
                    Err(e) => {
                        self.entity_failed(EntityKind::IpAddress, &address.to_string(), &e.into());
                    }
                }
            }
        }
    }

    /// Ensure a prefix exists for every live network; never deletes
    async fn reconcile_prefixes(&mut self, device: &DeviceState) {
        for (network, vrf) in device.prefixes() {
            let vrf_id = match &vrf {
                Some(name) => match self.shared.vrf(name).await {
                    Ok(id) => id,
                    Err(e) => {
                        self.entity_failed(EntityKind::Vrf, name, &e);
                        continue;
                    }
                },
                None => None,
            };

            match self.shared.prefix(network, vrf_id).await {
                Ok(resolved) => {
                    self.note_shared(EntityKind::Prefix, &network.to_string(), resolved);
                }
                Err(e) => self.entity_failed(EntityKind::Prefix, &network.to_string(), &e),
            }
        }
    }

    /// Transition to a new state with validation and event emission
    fn transition_to(&mut self, new_state: SyncState) -> Result<(), ReconcileError> {
        if !self.state.can_transition_to(new_state) {
            return Err(ReconcileError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let old_state = self.state;
        self.state = new_state;

        debug!(from = %old_state, to = %new_state, "state transition");
        self.emit(SyncEvent::DeviceStateChanged {
            host: self.host.clone(),
            from: old_state.to_string(),
            to: new_state.to_string(),
        });

        Ok(())
    }

    /// Transition to `Failed`, preserving error context
    fn fail_with_error(&mut self, err: &ReconcileError) {
        let previous = self.state;
        let context = FailedState::new(previous, err.to_string());

        error!(
            previous_state = %previous,
            step = context.step,
            transient = err.is_transient(),
            error = %err,
            "device reconciliation failed"
        );

        self.failed = Some((context, err.kind()));
        self.state = SyncState::Failed;
        self.emit(SyncEvent::DeviceStateChanged {
            host: self.host.clone(),
            from: previous.to_string(),
            to: SyncState::Failed.to_string(),
        });
    }

    fn note_shared(&mut self, kind: EntityKind, key: &str, resolved: Resolved) {
        if resolved.created {
            self.record(kind, key, Change::Created);
        }
    }

    fn record(&mut self, kind: EntityKind, key: &str, change: Change) {
        info!(%kind, key, ?change, "entity changed");
        let host = self.host.clone();
        let key = key.to_string();
        self.emit(match change {
            Change::Created => SyncEvent::EntityCreated { host, kind, key },
            Change::Deleted => SyncEvent::EntityDeleted { host, kind, key },
            Change::Updated => SyncEvent::EntityUpdated {
                host,
                kind,
                key,
                fields: Vec::new(),
            },
        });
        self.count(kind, change);
    }

    fn count(&mut self, kind: EntityKind, change: Change) {
        self.changes.entry(kind).or_default().record(change);
    }

    fn entity_failed(&mut self, kind: EntityKind, key: &str, err: &ReconcileError) {
        warn!(%kind, key, transient = err.is_transient(), error = %err, "entity skipped");
        self.emit(SyncEvent::EntityConflict {
            host: self.host.clone(),
            kind,
            key: key.to_string(),
            reason: err.to_string(),
        });
        self.entity_failures.push(EntityFailure {
            host: self.host.clone(),
            kind,
            key: key.to_string(),
            reason: err.to_string(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Stored and live addresses of one interface
struct AddressPlan<'d> {
    iface: &'d InterfaceState,
    interface_id: u64,
    vrf_id: Option<u64>,
    /// `(address, vrf id)` to record id
    stored: HashMap<(Ipv4Net, Option<u64>), u64>,
}

impl AddressPlan<'_> {
    /// Stored records not live in the interface's VRF, sorted
    fn stale(&self) -> Vec<(Ipv4Net, u64)> {
        let mut stale: Vec<(Ipv4Net, u64)> = self
            .stored
            .iter()
            .filter(|((net, vrf), _)| *vrf != self.vrf_id || !self.iface.addresses.contains(net))
            .map(|(&(net, _), &id)| (net, id))
            .collect();
        stale.sort();
        stale
    }

    /// Live addresses with no record in the interface's VRF
    fn missing(&self) -> impl Iterator<Item = Ipv4Net> + '_ {
        self.iface
            .addresses
            .iter()
            .copied()
            .filter(|net| !self.stored.contains_key(&(*net, self.vrf_id)))
    }
}

/// Fields of `stored` that differ from the live interface
///
/// Live `None` for mtu or mac means "not reported" and is never compared.
#[must_use]
pub fn interface_patch(stored: &Interface, live: &InterfaceState) -> InterfacePatch {
    let mut patch = InterfacePatch::default();

    if stored.enabled != live.enabled {
        patch.enabled = Some(live.enabled);
    }
    if stored.description.trim() != live.description.trim() {
        patch.description = Some(live.description.clone());
    }
    if let Some(mtu) = live.mtu
        && stored.mtu != Some(mtu)
    {
        patch.mtu = Some(mtu);
    }
    if let Some(mac) = &live.mac
        && stored.mac_address.as_deref().and_then(normalize_mac).as_ref() != Some(mac)
    {
        patch.mac_address = Some(mac.clone());
    }

    patch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Interface {
        Interface {
            id: 40,
            name: "GigabitEthernet0/1".into(),
            enabled: true,
            mtu: Some(1500),
            mac_address: Some("00:17:59:a7:51:81".into()),
            description: "uplink".into(),
        }
    }

    fn live() -> InterfaceState {
        let mut iface = InterfaceState::new("GigabitEthernet0/1");
        iface.mtu = Some(1500);
        iface.mac = Some("00:17:59:A7:51:81".into());
        iface.description = "uplink".into();
        iface
    }

    #[test]
    fn test_no_drift_no_patch() {
        assert!(interface_patch(&stored(), &live()).is_empty());
    }

    #[test]
    fn test_drifted_fields_only() {
        let mut iface = live();
        iface.enabled = false;
        iface.mtu = Some(9000);

        let patch = interface_patch(&stored(), &iface);
        assert_eq!(patch.changed_fields(), vec!["enabled", "mtu"]);
        assert_eq!(patch.enabled, Some(false));
        assert_eq!(patch.mtu, Some(9000));
    }

    #[test]
    fn test_unknown_live_values_not_compared() {
        let mut iface = live();
        iface.mtu = None;
        iface.mac = None;
        assert!(interface_patch(&stored(), &iface).is_empty());
    }

    #[test]
    fn test_description_cleared_on_device() {
        let mut iface = live();
        iface.description = String::new();
        let patch = interface_patch(&stored(), &iface);
        assert_eq!(patch.description.as_deref(), Some(""));
    }
}
