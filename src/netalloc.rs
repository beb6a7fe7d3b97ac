//! Persistent IP-range ledger.
//!
//! The ledger is a JSON array of network definitions on disk. Writes go
//! through a temp file and rename so a returned address always corresponds
//! to durably saved state. The allocator performs no locking: callers must
//! serialize allocation calls against the same ledger file (single-writer
//! contract).

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

/// One network record in the ledger document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDefinition {
    pub network_name: String,
    pub range_start: String,
    pub range_end: String,
    pub gateway: String,
    pub netid: String,
    pub netmask: String,
    #[serde(default)]
    pub address_allocations: Vec<String>,
}

/// What the caller wants from a network definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocAction {
    NewIp,
    Gateway,
    NetId,
    NetMask,
}

impl AllocAction {
    /// Parse the action token from a `NETALLOCATION#<net>#<action>` tag.
    /// Tokens are case-sensitive.
    pub fn parse(token: &str) -> EngineResult<Self> {
        match token {
            "newIP" => Ok(AllocAction::NewIp),
            "gateway" => Ok(AllocAction::Gateway),
            "netId" => Ok(AllocAction::NetId),
            "netMask" => Ok(AllocAction::NetMask),
            other => Err(EngineError::allocation(format!(
                "unknown allocation action '{other}' (expected newIP, gateway, netId, or netMask)"
            ))),
        }
    }
}

/// Serve one allocation request against the ledger at `ledger_path`.
///
/// `gateway`/`netId`/`netMask` return the stored field verbatim without
/// touching the file. `newIP` selects the lowest address in the inclusive
/// range not yet allocated, appends it, and persists the whole ledger before
/// returning.
pub fn allocate(ledger_path: &Path, net_name: &str, action: AllocAction) -> EngineResult<String> {
    let mut networks = load_ledger(ledger_path)?;
    let network = networks
        .iter_mut()
        .find(|network| network.network_name == net_name)
        .ok_or_else(|| {
            EngineError::allocation(format!(
                "network '{net_name}' not found in {}",
                ledger_path.display()
            ))
        })?;

    match action {
        AllocAction::Gateway => Ok(network.gateway.clone()),
        AllocAction::NetId => Ok(network.netid.clone()),
        AllocAction::NetMask => Ok(network.netmask.clone()),
        AllocAction::NewIp => {
            let address = next_free_address(network, net_name)?;
            network.address_allocations.push(address.clone());
            save_ledger(ledger_path, &networks)?;
            Ok(address)
        }
    }
}

fn next_free_address(network: &NetworkDefinition, net_name: &str) -> EngineResult<String> {
    let start = parse_addr(&network.range_start, net_name, "rangeStart")?;
    let end = parse_addr(&network.range_end, net_name, "rangeEnd")?;
    if start > end {
        return Err(EngineError::allocation(format!(
            "network '{net_name}' has rangeStart {} above rangeEnd {}",
            network.range_start, network.range_end
        )));
    }
    let taken: HashSet<&str> = network
        .address_allocations
        .iter()
        .map(String::as_str)
        .collect();
    for candidate in start..=end {
        let address = Ipv4Addr::from(candidate).to_string();
        if !taken.contains(address.as_str()) {
            return Ok(address);
        }
    }
    Err(EngineError::allocation(format!(
        "address pool exhausted for network '{net_name}' ({} - {})",
        network.range_start, network.range_end
    )))
}

fn parse_addr(value: &str, net_name: &str, field: &str) -> EngineResult<u32> {
    let addr = Ipv4Addr::from_str(value).map_err(|_| {
        EngineError::allocation(format!(
            "network '{net_name}' has invalid {field} '{value}'"
        ))
    })?;
    Ok(u32::from(addr))
}

fn load_ledger(path: &Path) -> EngineResult<Vec<NetworkDefinition>> {
    let text = fs::read_to_string(path).map_err(|err| {
        EngineError::input(format!("read network ledger {}: {err}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|err| {
        EngineError::input(format!("parse network ledger {}: {err}", path.display()))
    })
}

fn save_ledger(path: &Path, networks: &[NetworkDefinition]) -> EngineResult<()> {
    let text = serde_json::to_string_pretty(networks).map_err(|err| {
        EngineError::allocation(format!("serialize network ledger: {err}"))
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("ledger.json");
    let tmp_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, text.as_bytes()).map_err(|err| {
        EngineError::allocation(format!("persist ledger {}: {err}", path.display()))
    })?;
    fs::rename(&tmp_path, path).map_err(|err| {
        EngineError::allocation(format!("persist ledger {}: {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_ledger(dir: &Path, networks: &[NetworkDefinition]) -> PathBuf {
        let path = dir.join("networks.json");
        let text = serde_json::to_string_pretty(networks).expect("serialize ledger");
        fs::write(&path, text).expect("write ledger");
        path
    }

    fn sample_network(allocated: &[&str]) -> NetworkDefinition {
        NetworkDefinition {
            network_name: "mgmt".to_string(),
            range_start: "10.0.0.10".to_string(),
            range_end: "10.0.0.12".to_string(),
            gateway: "10.0.0.1".to_string(),
            netid: "10.0.0.0".to_string(),
            netmask: "255.255.255.0".to_string(),
            address_allocations: allocated.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn static_actions_do_not_mutate_the_ledger() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write_ledger(dir.path(), &[sample_network(&[])]);
        let before = fs::read_to_string(&path).expect("read ledger");

        assert_eq!(
            allocate(&path, "mgmt", AllocAction::Gateway).expect("gateway"),
            "10.0.0.1"
        );
        assert_eq!(
            allocate(&path, "mgmt", AllocAction::NetId).expect("netid"),
            "10.0.0.0"
        );
        assert_eq!(
            allocate(&path, "mgmt", AllocAction::NetMask).expect("netmask"),
            "255.255.255.0"
        );
        assert_eq!(fs::read_to_string(&path).expect("read ledger"), before);
    }

    #[test]
    fn new_ip_allocations_ascend_until_exhaustion() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write_ledger(dir.path(), &[sample_network(&[])]);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(allocate(&path, "mgmt", AllocAction::NewIp).expect("allocate"));
        }
        assert_eq!(seen, vec!["10.0.0.10", "10.0.0.11", "10.0.0.12"]);

        let err = allocate(&path, "mgmt", AllocAction::NewIp).expect_err("pool exhausted");
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn new_ip_skips_prior_allocations() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write_ledger(dir.path(), &[sample_network(&["10.0.0.10"])]);

        let address = allocate(&path, "mgmt", AllocAction::NewIp).expect("allocate");
        assert_eq!(address, "10.0.0.11");

        let networks = load_ledger(&path).expect("reload ledger");
        assert_eq!(
            networks[0].address_allocations,
            vec!["10.0.0.10", "10.0.0.11"]
        );
    }

    #[test]
    fn unknown_network_fails() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write_ledger(dir.path(), &[sample_network(&[])]);
        let err = allocate(&path, "dmz", AllocAction::NewIp).expect_err("unknown network");
        assert!(err.to_string().contains("dmz"));
    }

    #[test]
    fn action_tokens_are_case_sensitive() {
        assert!(AllocAction::parse("newIP").is_ok());
        assert!(AllocAction::parse("newip").is_err());
        assert!(AllocAction::parse("NetMask").is_err());
    }
}
