//! Canonical live device state

use std::collections::BTreeSet;

use ipnet::Ipv4Net;

/// Hostname split into site and role token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnameParts {
    /// Text before the first `-`
    pub site: String,
    /// Text after the last `-`
    pub role_token: String,
}

/// Live state of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceState {
    pub name: String,
    pub enabled: bool,
    /// `None` when the device did not report it
    pub mtu: Option<u32>,
    /// Normalized `AA:BB:CC:DD:EE:FF`, `None` when not reported
    pub mac: Option<String>,
    pub description: String,
    pub vrf: Option<String>,
    pub addresses: BTreeSet<Ipv4Net>,
}

impl InterfaceState {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            mtu: None,
            mac: None,
            description: String::new(),
            vrf: None,
            addresses: BTreeSet::new(),
        }
    }
}

/// Everything discovered about one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    /// Natural key in the inventory
    pub hostname: String,
    pub site: String,
    pub role_token: String,
    /// Role name from the role table, `None` when no code matched
    pub role: Option<String>,
    /// Vendor profile the device was polled with
    pub vendor: String,
    pub model: String,
    pub serial: String,
    /// Interfaces in order of first appearance
    pub interfaces: Vec<InterfaceState>,
}

impl DeviceState {
    /// Distinct networks of the live addresses, per VRF, host routes excluded
    #[must_use]
    pub fn prefixes(&self) -> BTreeSet<(Ipv4Net, Option<String>)> {
        self.interfaces
            .iter()
            .flat_map(|iface| {
                iface
                    .addresses
                    .iter()
                    .filter(|addr| addr.prefix_len() < 32)
                    .map(|addr| (addr.trunc(), iface.vrf.clone()))
            })
            .collect()
    }

    #[must_use]
    pub fn interface(&self, name: &str) -> Option<&InterfaceState> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}
