//! Message types for actor communication
//!
//! Handlers live in [`crate::actor::resolver`].

use ipnet::Ipv4Net;
use kameo_macros::Reply;

/// Get or create the site named `name`
#[derive(Debug)]
pub struct ResolveSite {
    pub name: String,
}

/// Find the manufacturer for a model string
#[derive(Debug)]
pub struct ResolveManufacturer {
    pub model: String,
    /// Vendor profile name, tried after the model
    pub vendor: String,
}

/// Look up a device role
#[derive(Debug)]
pub struct ResolveRole {
    /// Hostname role token, for error reporting
    pub token: String,
    /// Role name from the role table
    pub role: Option<String>,
}

/// Get or create a device type under a manufacturer
#[derive(Debug)]
pub struct ResolveDeviceType {
    pub model: String,
    pub manufacturer_id: u64,
}

/// Look up a VRF; replies `None` when the store has no such VRF
#[derive(Debug)]
pub struct ResolveVrf {
    pub name: String,
}

/// Get or create a prefix
#[derive(Debug)]
pub struct EnsurePrefix {
    pub prefix: Ipv4Net,
    pub vrf_id: Option<u64>,
}

/// Outcome of a get-or-create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reply)]
pub struct Resolved {
    /// Store-assigned id
    pub id: u64,
    /// Whether this call created the entity
    pub created: bool,
}

impl Resolved {
    #[must_use]
    pub fn existing(id: u64) -> Self {
        Self { id, created: false }
    }

    #[must_use]
    pub fn created(id: u64) -> Self {
        Self { id, created: true }
    }
}
