//! Fold extracted records into a [`DeviceState`]

use std::collections::HashMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use tracing::{debug, warn};

use nbsync_template::Record;

use crate::config::RoleTable;
use crate::device::{DeviceState, HostnameParts, InterfaceState};
use crate::error::AggregateError;

/// Model recorded when no hardware string was found
pub const UNKNOWN_MODEL: &str = "unknown";

/// Records produced by one command, in command order
pub type CommandRecords = (String, Vec<Record>);

/// Split `hostname` into site (before the first `-`) and role token (after
/// the last `-`)
///
/// # Errors
/// Returns `AggregateError::HostnamePattern` if there is no `-` or either
/// side is empty.
pub fn parse_hostname(hostname: &str) -> Result<HostnameParts, AggregateError> {
    let pattern_err = || AggregateError::HostnamePattern(hostname.to_string());

    let (site, _) = hostname.split_once('-').ok_or_else(pattern_err)?;
    let (_, role_token) = hostname.rsplit_once('-').ok_or_else(pattern_err)?;

    if site.is_empty() || role_token.is_empty() {
        return Err(pattern_err());
    }

    Ok(HostnameParts {
        site: site.to_string(),
        role_token: role_token.to_string(),
    })
}

/// Build the device state for one device from its command records
///
/// Device-level fields take the first non-empty value seen. Records with a
/// non-empty `INTERFACE` update that interface: non-empty values overwrite,
/// empty values never erase.
///
/// # Errors
/// `MalformedState` when no `HOSTNAME` or no interface was extracted,
/// `HostnamePattern` when the hostname cannot be split.
pub fn aggregate(
    vendor: &str,
    records_by_command: &[CommandRecords],
    roles: &RoleTable,
) -> Result<DeviceState, AggregateError> {
    let mut identity = Identity::default();
    let mut interfaces: Vec<InterfaceState> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (command, records) in records_by_command {
        debug!(command = %command, records = records.len(), "aggregating");
        for record in records {
            identity.absorb(record);

            let Some(name) = record.first_of(&["INTERFACE"]) else {
                continue;
            };
            let idx = *index.entry(name.to_string()).or_insert_with(|| {
                interfaces.push(InterfaceState::new(name));
                interfaces.len() - 1
            });
            merge_interface(&mut interfaces[idx], record);
        }
    }

    let hostname = identity
        .hostname
        .ok_or_else(|| AggregateError::MalformedState("no HOSTNAME in command output".into()))?;

    if interfaces.is_empty() {
        return Err(AggregateError::MalformedState(format!(
            "no interfaces extracted for {hostname}"
        )));
    }

    let parts = parse_hostname(&hostname)?;
    let role = roles.resolve(&parts.role_token).map(str::to_string);

    Ok(DeviceState {
        site: parts.site,
        role,
        role_token: parts.role_token,
        vendor: vendor.to_string(),
        model: identity
            .hardware
            .or(identity.pid)
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
        serial: identity.serial.or(identity.sn).unwrap_or_default(),
        hostname,
        interfaces,
    })
}

#[derive(Default)]
struct Identity {
    hostname: Option<String>,
    hardware: Option<String>,
    pid: Option<String>,
    serial: Option<String>,
    sn: Option<String>,
}

impl Identity {
    fn absorb(&mut self, record: &Record) {
        for (slot, field) in [
            (&mut self.hostname, "HOSTNAME"),
            (&mut self.hardware, "HARDWARE"),
            (&mut self.pid, "PID"),
            (&mut self.serial, "SERIAL"),
            (&mut self.sn, "SN"),
        ] {
            if slot.is_none()
                && let Some(value) = record.first_of(&[field])
            {
                *slot = Some(value.to_string());
            }
        }
    }
}

fn merge_interface(iface: &mut InterfaceState, record: &Record) {
    if let Some(status) = record.first_of(&["LINK_STATUS"]) {
        iface.enabled = !is_admin_down(status);
    }
    if let Some(mtu) = record.first_of(&["MTU"]) {
        match mtu.parse() {
            Ok(mtu) => iface.mtu = Some(mtu),
            Err(_) => warn!(interface = %iface.name, mtu, "ignoring unparsable MTU"),
        }
    }
    if let Some(mac) = record.first_of(&["MAC_ADDRESS"]) {
        match normalize_mac(mac) {
            Some(mac) => iface.mac = Some(mac),
            None => warn!(interface = %iface.name, mac, "ignoring unparsable MAC address"),
        }
    }
    if let Some(description) = record.first_of(&["DESCRIPTION"]) {
        iface.description = description.to_string();
    }
    if let Some(vrf) = record.first_of(&["VRF"]) {
        iface.vrf = Some(vrf.to_string());
    }
    if let Some(address) = record.first_of(&["IP_ADDRESS"]) {
        let Some(mask) = record.first_of(&["PREFIX_LENGTH", "MASK"]) else {
            warn!(interface = %iface.name, address, "address without mask skipped");
            return;
        };
        match to_cidr(address, mask) {
            Some(net) => {
                iface.addresses.insert(net);
            }
            None => warn!(interface = %iface.name, address, mask, "non-IPv4 address skipped"),
        }
    }
}

/// Whether a link status string means the port is shut
#[must_use]
pub fn is_admin_down(status: &str) -> bool {
    let status = status.to_ascii_lowercase();
    status.contains("administratively down") || status.contains("disabled")
}

/// Combine an address and a dotted or length mask into CIDR
#[must_use]
pub fn to_cidr(address: &str, mask: &str) -> Option<Ipv4Net> {
    let address: Ipv4Addr = address.trim().parse().ok()?;
    let mask = mask.trim().trim_start_matches('/');
    let prefix_len = if mask.contains('.') {
        ipnet::ipv4_mask_to_prefix(mask.parse().ok()?).ok()?
    } else {
        mask.parse().ok()?
    };
    Ipv4Net::new(address, prefix_len).ok()
}

/// Normalize `0017.59a7.5181`, `00-17-59-A7-51-81` and friends to
/// `00:17:59:A7:51:81`
#[must_use]
pub fn normalize_mac(mac: &str) -> Option<String> {
    let hex: String = mac
        .chars()
        .filter(|c| !matches!(c, '.' | ':' | '-'))
        .collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let hex = hex.to_ascii_uppercase();
    let octets: Vec<&str> = (0..12).step_by(2).map(|i| &hex[i..i + 2]).collect();
    Some(octets.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[(&str, &str)]) -> Record {
        fields.iter().copied().collect()
    }

    fn version() -> CommandRecords {
        (
            "show version".into(),
            vec![
                rec(&[("HOSTNAME", "msk02-asw02")]),
                rec(&[("HARDWARE", "WS-C2960-24TT-L")]),
                rec(&[("SERIAL", "FOC1010X104")]),
            ],
        )
    }

    #[test]
    fn test_parse_hostname() {
        let parts = parse_hostname("msk02-gpn-asw02").unwrap();
        assert_eq!(parts.site, "msk02");
        assert_eq!(parts.role_token, "asw02");

        let parts = parse_hostname("ufa01-csw01").unwrap();
        assert_eq!((parts.site.as_str(), parts.role_token.as_str()), ("ufa01", "csw01"));
    }

    #[test]
    fn test_parse_hostname_errors() {
        for bad in ["router1", "-asw01", "msk02-", ""] {
            assert_eq!(
                parse_hostname(bad),
                Err(AggregateError::HostnamePattern(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_interfaces_merge_across_commands() {
        let interfaces = (
            "show interfaces".to_string(),
            vec![
                rec(&[("INTERFACE", "Gi0/1"), ("LINK_STATUS", "up")]),
                rec(&[("INTERFACE", "Gi0/1"), ("MAC_ADDRESS", "0017.59a7.5181")]),
                rec(&[("INTERFACE", "Gi0/1"), ("DESCRIPTION", "uplink"), ("MTU", "1500")]),
                rec(&[("INTERFACE", "Gi0/2"), ("LINK_STATUS", "administratively down")]),
            ],
        );
        let ip = (
            "show ip interface".to_string(),
            vec![
                rec(&[("INTERFACE", "Gi0/1"), ("LINK_STATUS", ""), ("DESCRIPTION", "")]),
                rec(&[("INTERFACE", "Gi0/1"), ("IP_ADDRESS", "10.0.0.1"), ("PREFIX_LENGTH", "24")]),
                rec(&[("INTERFACE", "Gi0/1"), ("IP_ADDRESS", "10.0.1.1"), ("MASK", "255.255.255.0")]),
                rec(&[("INTERFACE", "Gi0/1"), ("VRF", "MGMT")]),
            ],
        );

        let state = aggregate("cisco_ios", &[version(), interfaces, ip], &RoleTable::default()).unwrap();

        assert_eq!(state.hostname, "msk02-asw02");
        assert_eq!(state.site, "msk02");
        assert_eq!(state.role.as_deref(), Some("Access Switch"));
        assert_eq!(state.model, "WS-C2960-24TT-L");
        assert_eq!(state.serial, "FOC1010X104");
        assert_eq!(state.interfaces.len(), 2);

        let gi1 = &state.interfaces[0];
        assert_eq!(gi1.name, "Gi0/1");
        assert!(gi1.enabled);
        assert_eq!(gi1.description, "uplink");
        assert_eq!(gi1.mtu, Some(1500));
        assert_eq!(gi1.mac.as_deref(), Some("00:17:59:A7:51:81"));
        assert_eq!(gi1.vrf.as_deref(), Some("MGMT"));
        let addrs: Vec<String> = gi1.addresses.iter().map(ToString::to_string).collect();
        assert_eq!(addrs, vec!["10.0.0.1/24", "10.0.1.1/24"]);

        let gi2 = &state.interfaces[1];
        assert!(!gi2.enabled);
        assert_eq!(gi2.mtu, None);
        assert!(gi2.addresses.is_empty());
    }

    #[test]
    fn test_empty_model_is_unknown_and_pid_fallback() {
        let iface = ("show ip interface".to_string(), vec![rec(&[("INTERFACE", "Vlan1")])]);
        let host = ("show version".to_string(), vec![rec(&[("HOSTNAME", "ufa01-csw01"), ("HARDWARE", " ")])]);

        let state = aggregate("cisco_ios", &[host.clone(), iface.clone()], &RoleTable::default()).unwrap();
        assert_eq!(state.model, UNKNOWN_MODEL);
        assert_eq!(state.serial, "");

        let inventory = (
            "show inventory".to_string(),
            vec![rec(&[("PID", "WS-C3850-48T"), ("SN", "FCW1234")]), rec(&[("PID", "GLC-SX-MM"), ("SN", "AGM1")])],
        );
        let state = aggregate("cisco_ios", &[host, inventory, iface], &RoleTable::default()).unwrap();
        assert_eq!(state.model, "WS-C3850-48T");
        assert_eq!(state.serial, "FCW1234");
    }

    #[test]
    fn test_missing_hostname_is_malformed() {
        let iface = ("show ip interface".to_string(), vec![rec(&[("INTERFACE", "Vlan1")])]);
        assert!(matches!(
            aggregate("cisco_ios", &[iface], &RoleTable::default()),
            Err(AggregateError::MalformedState(_))
        ));
    }

    #[test]
    fn test_missing_interfaces_is_malformed() {
        assert!(matches!(
            aggregate("cisco_ios", &[version()], &RoleTable::default()),
            Err(AggregateError::MalformedState(_))
        ));
    }

    #[test]
    fn test_bad_hostname_pattern() {
        let host = ("show version".to_string(), vec![rec(&[("HOSTNAME", "core1")])]);
        let iface = ("show ip interface".to_string(), vec![rec(&[("INTERFACE", "Vlan1")])]);
        assert_eq!(
            aggregate("cisco_ios", &[host, iface], &RoleTable::default()),
            Err(AggregateError::HostnamePattern("core1".into()))
        );
    }

    #[test]
    fn test_unmatched_role_token() {
        let host = ("show version".to_string(), vec![rec(&[("HOSTNAME", "msk02-xyz01")])]);
        let iface = ("show ip interface".to_string(), vec![rec(&[("INTERFACE", "Vlan1")])]);
        let state = aggregate("cisco_ios", &[host, iface], &RoleTable::default()).unwrap();
        assert_eq!(state.role, None);
        assert_eq!(state.role_token, "xyz01");
    }

    #[test]
    fn test_ipv6_address_skipped() {
        let host = ("show version".to_string(), vec![rec(&[("HOSTNAME", "msk02-br01")])]);
        let iface = (
            "show ipv6 interface".to_string(),
            vec![rec(&[("INTERFACE", "Gi0/0"), ("IP_ADDRESS", "2001:db8::1"), ("PREFIX_LENGTH", "64")])],
        );
        let state = aggregate("cisco_ios", &[host, iface], &RoleTable::default()).unwrap();
        assert!(state.interfaces[0].addresses.is_empty());
    }

    #[test]
    fn test_to_cidr() {
        assert_eq!(to_cidr("10.0.0.1", "24"), "10.0.0.1/24".parse().ok());
        assert_eq!(to_cidr("10.0.0.1", "/30"), "10.0.0.1/30".parse().ok());
        assert_eq!(to_cidr("10.0.0.1", "255.255.255.0"), "10.0.0.1/24".parse().ok());
        assert_eq!(to_cidr("10.0.0.1", "255.0.255.0"), None);
        assert_eq!(to_cidr("10.0.0.1", "33"), None);
        assert_eq!(to_cidr("fe80::1", "64"), None);
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("0017.59a7.5181").as_deref(), Some("00:17:59:A7:51:81"));
        assert_eq!(normalize_mac("00-17-59-a7-51-81").as_deref(), Some("00:17:59:A7:51:81"));
        assert_eq!(normalize_mac("00:17:59:A7:51:81").as_deref(), Some("00:17:59:A7:51:81"));
        assert_eq!(normalize_mac("0017.59a7"), None);
    }

    #[test]
    fn test_admin_down() {
        assert!(is_admin_down("administratively down"));
        assert!(is_admin_down("Disabled"));
        assert!(!is_admin_down("up"));
        assert!(!is_admin_down("down"));
    }
}
