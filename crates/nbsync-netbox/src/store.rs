//! Inventory store abstraction

use async_trait::async_trait;
use ipnet::Ipv4Net;

use crate::error::Result;
use crate::models::{
    Device, DeviceType, Interface, InterfacePatch, IpAddress, Manufacturer, NewDevice,
    NewDeviceType, NewInterface, NewIpAddress, NewPrefix, NewSite, Prefix, Role, Site, Vrf,
};

/// Natural-key access to the inventory-of-record
///
/// `get_*` methods return `Ok(None)` when nothing matches the key. Creates
/// that collide with an existing object fail with
/// [`StoreError::Conflict`](crate::StoreError::Conflict).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Site by slug
    async fn get_site(&self, slug: &str) -> Result<Option<Site>>;

    async fn create_site(&self, site: &NewSite) -> Result<Site>;

    /// All manufacturers
    async fn list_manufacturers(&self) -> Result<Vec<Manufacturer>>;

    /// Device role by name
    async fn get_role(&self, name: &str) -> Result<Option<Role>>;

    /// VRF by name
    async fn get_vrf(&self, name: &str) -> Result<Option<Vrf>>;

    /// Device type by model
    async fn get_device_type(&self, model: &str) -> Result<Option<DeviceType>>;

    async fn create_device_type(&self, device_type: &NewDeviceType) -> Result<DeviceType>;

    /// Device by name
    async fn get_device(&self, name: &str) -> Result<Option<Device>>;

    async fn create_device(&self, device: &NewDevice) -> Result<Device>;

    /// Interface by (device, name)
    async fn get_interface(&self, device_id: u64, name: &str) -> Result<Option<Interface>>;

    async fn create_interface(&self, interface: &NewInterface) -> Result<Interface>;

    async fn update_interface(&self, id: u64, patch: &InterfacePatch) -> Result<Interface>;

    /// Addresses assigned to an interface
    async fn list_ip_addresses(&self, interface_id: u64) -> Result<Vec<IpAddress>>;

    async fn create_ip_address(&self, address: &NewIpAddress) -> Result<IpAddress>;

    async fn delete_ip_address(&self, id: u64) -> Result<()>;

    /// Prefix by network, within a VRF or the global table
    async fn get_prefix(&self, prefix: &Ipv4Net, vrf_id: Option<u64>) -> Result<Option<Prefix>>;

    async fn create_prefix(&self, prefix: &NewPrefix) -> Result<Prefix>;
}
