//! nbsync-netbox: inventory-of-record access
//!
//! [`InventoryStore`] is the seam the reconciliation engine talks to;
//! [`NetboxClient`] implements it over the NetBox REST API.

pub mod client;
pub mod error;
pub mod models;
pub mod store;

pub use client::NetboxClient;
pub use error::{Result, StoreError};
pub use models::{
    Device, DeviceType, Interface, InterfaceKind, InterfacePatch, IpAddress, Manufacturer,
    NestedRef, NewDevice, NewDeviceType, NewInterface, NewIpAddress, NewPrefix, NewSite, Prefix,
    Role, Site, Vrf, slugify,
};
pub use store::InventoryStore;
