//! NetBox entity models
//!
//! Read models deserialize the subset of fields the engine needs; `New*`
//! types are the create payloads.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Reference to a related object as NetBox nests it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedRef {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

/// Device role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vrf {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceType {
    pub id: u64,
    pub model: String,
    pub slug: String,
    pub manufacturer: NestedRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: u64,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: u64,
    /// Address with mask, e.g. `10.0.0.1/24`
    pub address: String,
    #[serde(default)]
    pub vrf: Option<NestedRef>,
}

impl IpAddress {
    /// The address as IPv4 CIDR, `None` for IPv6 or unparsable values
    #[must_use]
    pub fn ipv4(&self) -> Option<Ipv4Net> {
        self.address.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefix {
    pub id: u64,
    pub prefix: String,
    #[serde(default)]
    pub vrf: Option<NestedRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSite {
    pub name: String,
    pub slug: String,
}

impl NewSite {
    /// Site named `name` with a derived slug
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slugify(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDeviceType {
    pub manufacturer: u64,
    pub model: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDevice {
    pub name: String,
    pub device_type: u64,
    pub role: u64,
    pub site: u64,
    pub serial: String,
    pub status: &'static str,
}

/// NetBox interface type, derived from the interface name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Virtual,
    Lag,
    Other,
}

impl InterfaceKind {
    /// Guess the type from an IOS/NX-OS interface name
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let numbered = |prefix: &str| {
            lower
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        };

        if ["port-channel", "po"].into_iter().any(numbered) {
            InterfaceKind::Lag
        } else if ["vlan", "loopback", "lo", "tunnel", "nve"].into_iter().any(numbered) {
            InterfaceKind::Virtual
        } else {
            InterfaceKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewInterface {
    pub device: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InterfaceKind,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub description: String,
}

/// Partial interface update; only `Some` fields are sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfacePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InterfacePatch {
    /// Whether the patch would change nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.mtu.is_none()
            && self.mac_address.is_none()
            && self.description.is_none()
    }

    /// Names of the fields this patch touches
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.enabled.is_some() {
            fields.push("enabled");
        }
        if self.mtu.is_some() {
            fields.push("mtu");
        }
        if self.mac_address.is_some() {
            fields.push("mac_address");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        fields
    }
}

/// IP address assigned to a device interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIpAddress {
    pub address: Ipv4Net,
    pub assigned_object_type: &'static str,
    pub assigned_object_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<u64>,
    pub status: &'static str,
}

impl NewIpAddress {
    #[must_use]
    pub fn on_interface(address: Ipv4Net, interface_id: u64, vrf: Option<u64>) -> Self {
        Self {
            address,
            assigned_object_type: "dcim.interface",
            assigned_object_id: interface_id,
            vrf,
            status: "active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPrefix {
    pub prefix: Ipv4Net,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<u64>,
    pub status: &'static str,
}

impl NewPrefix {
    #[must_use]
    pub fn new(prefix: Ipv4Net, vrf: Option<u64>) -> Self {
        Self {
            prefix,
            vrf,
            status: "active",
        }
    }
}

/// Lowercase `name` and replace every run of non-alphanumerics with `-`
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
