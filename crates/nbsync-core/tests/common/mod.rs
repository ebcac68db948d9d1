//! In-memory store and scripted connector shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ipnet::Ipv4Net;

use nbsync_core::{SessionSpec, VendorProfile};
use nbsync_exec::{CommandOutput, ConnectionInfo, Connector, ExecError, Secret, Session};
use nbsync_netbox::{
    Device, DeviceType, Interface, InterfacePatch, InventoryStore, IpAddress, Manufacturer,
    NestedRef, NewDevice, NewDeviceType, NewInterface, NewIpAddress, NewPrefix, NewSite, Prefix,
    Role, Site, StoreError, Vrf,
};
use nbsync_template::TemplateRegistry;

// ============================================================================
// Store
// ============================================================================

/// Mutating calls the store accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Default)]
pub struct Inventory {
    next_id: u64,
    pub sites: Vec<Site>,
    pub manufacturers: Vec<Manufacturer>,
    pub roles: Vec<Role>,
    pub vrfs: Vec<Vrf>,
    pub device_types: Vec<DeviceType>,
    pub devices: Vec<Device>,
    /// `(device id, interface)`
    pub interfaces: Vec<(u64, Interface)>,
    /// `(interface id, address)`
    pub addresses: Vec<(u64, IpAddress)>,
    pub prefixes: Vec<Prefix>,
    /// Interface names and addresses whose create is refused
    pub rejected: HashSet<String>,
    pub calls: Calls,
}

impl Inventory {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// NetBox stand-in with the same uniqueness rules for natural keys
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inventory>,
    /// Next `create_site` inserts the site and still reports a conflict,
    /// as if another writer won the race
    race_next_site: AtomicBool,
    /// Refuse a second record with the same host IP in the same VRF, as
    /// NetBox does with `ENFORCE_GLOBAL_UNIQUE`
    unique_addresses: AtomicBool,
}

fn conflict(what: &str) -> StoreError {
    StoreError::Conflict {
        status: 400,
        message: format!("{what} already exists"),
    }
}

impl FakeStore {
    /// Store with the lookup-only entities a NetBox install starts with
    pub fn seeded() -> Arc<Self> {
        let store = Self::default();
        {
            let mut inv = store.inventory();
            let id = inv.id();
            inv.manufacturers.push(Manufacturer {
                id,
                name: "Cisco".into(),
                slug: "cisco".into(),
            });
            for name in ["Access Switch", "Core Switch", "Router"] {
                let id = inv.id();
                inv.roles.push(Role {
                    id,
                    name: name.into(),
                    slug: nbsync_netbox::slugify(name),
                });
            }
            let id = inv.id();
            inv.vrfs.push(Vrf {
                id,
                name: "MGMT".into(),
            });
        }
        Arc::new(store)
    }

    pub fn inventory(&self) -> std::sync::MutexGuard<'_, Inventory> {
        self.inner.lock().unwrap()
    }

    pub fn calls(&self) -> Calls {
        self.inventory().calls
    }

    pub fn race_next_site_create(&self) {
        self.race_next_site.store(true, Ordering::SeqCst);
    }

    pub fn enforce_unique_addresses(&self) {
        self.unique_addresses.store(true, Ordering::SeqCst);
    }

    /// Refuse creating the interface or address named `key`
    pub fn reject_create(&self, key: &str) {
        self.inventory().rejected.insert(key.to_string());
    }

    pub fn seed_device(&self, name: &str) -> u64 {
        let mut inv = self.inventory();
        let id = inv.id();
        inv.devices.push(Device {
            id,
            name: name.into(),
            serial: String::new(),
        });
        id
    }

    pub fn seed_interface(&self, device_id: u64, interface: Interface) -> u64 {
        let mut inv = self.inventory();
        let id = inv.id();
        inv.interfaces.push((device_id, Interface { id, ..interface }));
        id
    }

    pub fn seed_address(&self, interface_id: u64, address: &str) -> u64 {
        self.seed_address_in(interface_id, address, None)
    }

    pub fn seed_address_in(&self, interface_id: u64, address: &str, vrf: Option<u64>) -> u64 {
        let mut inv = self.inventory();
        let id = inv.id();
        inv.addresses.push((
            interface_id,
            IpAddress {
                id,
                address: address.into(),
                vrf: vrf.map(|id| NestedRef { id }),
            },
        ));
        id
    }

    pub fn vrf_id(&self, name: &str) -> u64 {
        self.inventory()
            .vrfs
            .iter()
            .find(|v| v.name == name)
            .unwrap()
            .id
    }

    /// Stored `(address, vrf id)` pairs of an interface, sorted
    pub fn addresses_with_vrf(&self, device: &str, interface: &str) -> Vec<(String, Option<u64>)> {
        let Some(iface) = self.interface(device, interface) else {
            return Vec::new();
        };
        let inv = self.inventory();
        let mut addresses: Vec<(String, Option<u64>)> = inv
            .addresses
            .iter()
            .filter(|(owner, _)| *owner == iface.id)
            .map(|(_, a)| (a.address.clone(), a.vrf.as_ref().map(|v| v.id)))
            .collect();
        addresses.sort();
        addresses
    }

    pub fn interface(&self, device: &str, name: &str) -> Option<Interface> {
        let inv = self.inventory();
        let device_id = inv.devices.iter().find(|d| d.name == device)?.id;
        inv.interfaces
            .iter()
            .find(|(dev, i)| *dev == device_id && i.name == name)
            .map(|(_, i)| i.clone())
    }

    /// Stored addresses of an interface, sorted
    pub fn addresses(&self, device: &str, interface: &str) -> Vec<String> {
        let Some(iface) = self.interface(device, interface) else {
            return Vec::new();
        };
        let inv = self.inventory();
        let mut addresses: Vec<String> = inv
            .addresses
            .iter()
            .filter(|(owner, _)| *owner == iface.id)
            .map(|(_, a)| a.address.clone())
            .collect();
        addresses.sort();
        addresses
    }

    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> =
            self.inventory().prefixes.iter().map(|p| p.prefix.clone()).collect();
        prefixes.sort();
        prefixes
    }
}

#[async_trait]
impl InventoryStore for FakeStore {
    async fn get_site(&self, slug: &str) -> Result<Option<Site>, StoreError> {
        Ok(self.inventory().sites.iter().find(|s| s.slug == slug).cloned())
    }

    async fn create_site(&self, site: &NewSite) -> Result<Site, StoreError> {
        let mut inv = self.inventory();
        if inv.sites.iter().any(|s| s.slug == site.slug) {
            return Err(conflict("site"));
        }
        let id = inv.id();
        let created = Site {
            id,
            name: site.name.clone(),
            slug: site.slug.clone(),
        };
        inv.sites.push(created.clone());
        if self.race_next_site.swap(false, Ordering::SeqCst) {
            return Err(conflict("site"));
        }
        inv.calls.creates += 1;
        Ok(created)
    }

    async fn list_manufacturers(&self) -> Result<Vec<Manufacturer>, StoreError> {
        Ok(self.inventory().manufacturers.clone())
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.inventory().roles.iter().find(|r| r.name == name).cloned())
    }

    async fn get_vrf(&self, name: &str) -> Result<Option<Vrf>, StoreError> {
        Ok(self.inventory().vrfs.iter().find(|v| v.name == name).cloned())
    }

    async fn get_device_type(&self, model: &str) -> Result<Option<DeviceType>, StoreError> {
        Ok(self
            .inventory()
            .device_types
            .iter()
            .find(|t| t.model == model)
            .cloned())
    }

    async fn create_device_type(&self, new: &NewDeviceType) -> Result<DeviceType, StoreError> {
        let mut inv = self.inventory();
        if inv.device_types.iter().any(|t| t.model == new.model) {
            return Err(conflict("device type"));
        }
        let id = inv.id();
        let created = DeviceType {
            id,
            model: new.model.clone(),
            slug: new.slug.clone(),
            manufacturer: NestedRef {
                id: new.manufacturer,
            },
        };
        inv.device_types.push(created.clone());
        inv.calls.creates += 1;
        Ok(created)
    }

    async fn get_device(&self, name: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.inventory().devices.iter().find(|d| d.name == name).cloned())
    }

    async fn create_device(&self, new: &NewDevice) -> Result<Device, StoreError> {
        let mut inv = self.inventory();
        if inv.devices.iter().any(|d| d.name == new.name) {
            return Err(conflict("device"));
        }
        let id = inv.id();
        let created = Device {
            id,
            name: new.name.clone(),
            serial: new.serial.clone(),
        };
        inv.devices.push(created.clone());
        inv.calls.creates += 1;
        Ok(created)
    }

    async fn get_interface(
        &self,
        device_id: u64,
        name: &str,
    ) -> Result<Option<Interface>, StoreError> {
        Ok(self
            .inventory()
            .interfaces
            .iter()
            .find(|(dev, i)| *dev == device_id && i.name == name)
            .map(|(_, i)| i.clone()))
    }

    async fn create_interface(&self, new: &NewInterface) -> Result<Interface, StoreError> {
        let mut inv = self.inventory();
        if inv.rejected.contains(&new.name) {
            return Err(conflict("interface with this name"));
        }
        if inv
            .interfaces
            .iter()
            .any(|(dev, i)| *dev == new.device && i.name == new.name)
        {
            return Err(conflict("interface"));
        }
        let id = inv.id();
        let created = Interface {
            id,
            name: new.name.clone(),
            enabled: new.enabled,
            mtu: new.mtu,
            mac_address: new.mac_address.clone(),
            description: new.description.clone(),
        };
        inv.interfaces.push((new.device, created.clone()));
        inv.calls.creates += 1;
        Ok(created)
    }

    async fn update_interface(
        &self,
        id: u64,
        patch: &InterfacePatch,
    ) -> Result<Interface, StoreError> {
        let mut inv = self.inventory();
        inv.calls.updates += 1;
        let (_, iface) = inv
            .interfaces
            .iter_mut()
            .find(|(_, i)| i.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("interface {id}")))?;
        if let Some(enabled) = patch.enabled {
            iface.enabled = enabled;
        }
        if let Some(mtu) = patch.mtu {
            iface.mtu = Some(mtu);
        }
        if let Some(mac) = &patch.mac_address {
            iface.mac_address = Some(mac.clone());
        }
        if let Some(description) = &patch.description {
            iface.description = description.clone();
        }
        Ok(iface.clone())
    }

    async fn list_ip_addresses(&self, interface_id: u64) -> Result<Vec<IpAddress>, StoreError> {
        Ok(self
            .inventory()
            .addresses
            .iter()
            .filter(|(owner, _)| *owner == interface_id)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn create_ip_address(&self, new: &NewIpAddress) -> Result<IpAddress, StoreError> {
        let mut inv = self.inventory();
        if inv.rejected.contains(&new.address.to_string()) {
            return Err(conflict("ip address"));
        }
        if self.unique_addresses.load(Ordering::SeqCst)
            && inv.addresses.iter().any(|(_, a)| {
                a.ipv4().map(|net| net.addr()) == Some(new.address.addr())
                    && a.vrf.as_ref().map(|v| v.id) == new.vrf
            })
        {
            return Err(conflict("duplicate IP address"));
        }
        let id = inv.id();
        let created = IpAddress {
            id,
            address: new.address.to_string(),
            vrf: new.vrf.map(|id| NestedRef { id }),
        };
        inv.addresses.push((new.assigned_object_id, created.clone()));
        inv.calls.creates += 1;
        Ok(created)
    }

    async fn delete_ip_address(&self, id: u64) -> Result<(), StoreError> {
        let mut inv = self.inventory();
        let before = inv.addresses.len();
        inv.addresses.retain(|(_, a)| a.id != id);
        if inv.addresses.len() == before {
            return Err(StoreError::NotFound(format!("ip address {id}")));
        }
        inv.calls.deletes += 1;
        Ok(())
    }

    async fn get_prefix(
        &self,
        prefix: &Ipv4Net,
        vrf_id: Option<u64>,
    ) -> Result<Option<Prefix>, StoreError> {
        let wanted = prefix.to_string();
        Ok(self
            .inventory()
            .prefixes
            .iter()
            .find(|p| p.prefix == wanted && p.vrf.as_ref().map(|v| v.id) == vrf_id)
            .cloned())
    }

    async fn create_prefix(&self, new: &NewPrefix) -> Result<Prefix, StoreError> {
        let mut inv = self.inventory();
        let id = inv.id();
        let created = Prefix {
            id,
            prefix: new.prefix.to_string(),
            vrf: new.vrf.map(|id| NestedRef { id }),
        };
        inv.prefixes.push(created.clone());
        inv.calls.creates += 1;
        Ok(created)
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Serves canned command output per host
#[derive(Default)]
pub struct ScriptedConnector {
    outputs: HashMap<String, HashMap<String, String>>,
    unreachable: HashSet<String>,
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    /// Answer every command of `host` with the matching fixture
    pub fn device(mut self, host: &str, hostname: &str) -> Self {
        self.outputs.insert(host.to_string(), ios_outputs(hostname));
        self
    }

    pub fn with_output(mut self, host: &str, command: &str, stdout: &str) -> Self {
        self.outputs
            .entry(host.to_string())
            .or_default()
            .insert(command.to_string(), stdout.to_string());
        self
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, info: &ConnectionInfo) -> Result<Arc<dyn Session>, ExecError> {
        if self.unreachable.contains(&info.host) {
            return Err(ExecError::ConnectionFailed(format!(
                "{}:{}: connection refused",
                info.host, info.port
            )));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSession {
            outputs: self.outputs.get(&info.host).cloned().unwrap_or_default(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct ScriptedSession {
    outputs: HashMap<String, String>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        let (status, stdout) = match self.outputs.get(command) {
            Some(stdout) => (None, stdout.clone()),
            None => (Some(1), "% Invalid input detected at '^' marker.\n".to_string()),
        };
        Ok(CommandOutput {
            command: command.to_string(),
            status,
            stdout,
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    async fn close(&self) -> Result<(), ExecError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn session_type(&self) -> &'static str {
        "scripted"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const IOS_COMMANDS: [(&str, &str, &str); 4] = [
    ("show version", "cisco_ios_show_version.template", "ios_show_version.txt"),
    ("show inventory", "cisco_ios_show_inventory.template", "ios_show_inventory.txt"),
    ("show interfaces", "cisco_ios_show_interfaces.template", "ios_show_interfaces.txt"),
    ("show ip interface", "cisco_ios_show_ip_interface.template", "ios_show_ip_interface.txt"),
];

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(manifest_dir().join("tests/fixtures").join(name)).unwrap()
}

/// Fixture output with the device hostname swapped in
pub fn ios_outputs(hostname: &str) -> HashMap<String, String> {
    IOS_COMMANDS
        .iter()
        .map(|(command, _, file)| {
            (
                (*command).to_string(),
                fixture(file).replace("msk02-asw02", hostname),
            )
        })
        .collect()
}

pub fn ios_profile() -> Arc<VendorProfile> {
    let mut registry = TemplateRegistry::new().with_base_dir(manifest_dir().join("../../templates"));
    let commands: Vec<(String, PathBuf)> = IOS_COMMANDS
        .iter()
        .map(|(command, template, _)| ((*command).to_string(), PathBuf::from(template)))
        .collect();
    Arc::new(VendorProfile::load("cisco_ios", &commands, &mut registry).unwrap())
}

pub fn session(host: &str, profile: &Arc<VendorProfile>) -> SessionSpec {
    SessionSpec::new(
        ConnectionInfo::new(host, "netops", Secret::Password("secret".into())),
        Arc::clone(profile),
    )
}
