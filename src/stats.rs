//! Read-only snapshot types returned by `Core::stats`, grounded on the
//! teacher's `core::traffic::ProcessTrafficSnapshot` — a plain, cloneable,
//! serde-derived struct assembled fresh on every call rather than cached.

use serde::{Deserialize, Serialize};

use crate::net::{BridgeId, PortId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortStats {
    pub port: PortId,
    pub admin_up: bool,
    pub oper_up: bool,
    pub stp_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreStats {
    pub port_count: u16,
    pub ports: Vec<PortStats>,
    pub mac_table_entries: usize,
    pub vlan_count: usize,
    pub stp_root: BridgeId,
    pub is_root_bridge: bool,
    pub routing_entries: usize,
    pub arp_entries: usize,
    pub fragment_contexts: usize,
}
