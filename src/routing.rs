//! C8 — routing table.
//!
//! Holds IPv4 and IPv6 routes in two structures kept in sync: an
//! exact-match hash keyed by `(prefix, prefix_len)` for O(1) replace/delete
//! decisions, and a binary trie for longest-prefix-match lookup. The trie
//! is arena-indexed (`Vec<TrieNode>` with child indices, no parent/child
//! pointers) per the design note in spec.md §9 calling for arena indices
//! over a pointer-linked tree; the `Mutex<Inner>` shape and hw-sync hook
//! follow [`crate::mac_table::MacTable`]/[`crate::vlan::VlanEngine`].

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::CONFIG_MAX_ROUTING_ENTRIES;
use crate::error::{Result, SwitchError};
use crate::net::{Ipv4Addr, Ipv6Addr, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextHop {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    /// Directly connected; forward straight to `out_port` with no
    /// next-hop rewrite.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix4 {
    pub addr: Ipv4Addr,
    pub len: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix6 {
    pub addr: Ipv6Addr,
    pub len: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub next_hop: NextHop,
    pub out_port: PortId,
    pub admin_distance: u8,
    pub metric: u32,
    pub installed_secs: u64,
}

/// Hardware-sync notification emitted whenever the FIB's effective content
/// changes, so an out-of-crate SAI-style adapter can mirror it (spec.md
/// §1/§9: the hardware adapter is an external collaborator, this crate
/// only emits the hook).
#[derive(Debug, Clone)]
pub enum HwOp {
    InstallV4(Prefix4, RouteEntry),
    RemoveV4(Prefix4),
    InstallV6(Prefix6, RouteEntry),
    RemoveV6(Prefix6),
}

struct TrieNode {
    children: [Option<usize>; 2],
    route: Option<RouteEntry>,
}

impl TrieNode {
    fn empty() -> Self {
        TrieNode {
            children: [None, None],
            route: None,
        }
    }
}

struct Trie {
    arena: Vec<TrieNode>,
}

impl Trie {
    fn new() -> Self {
        Trie {
            arena: vec![TrieNode::empty()],
        }
    }

    fn insert(&mut self, bits: impl Iterator<Item = bool>, prefix_len: u8, entry: RouteEntry) {
        let mut node_idx = 0usize;
        for bit in bits.take(prefix_len as usize) {
            let child_slot = bit as usize;
            node_idx = match self.arena[node_idx].children[child_slot] {
                Some(idx) => idx,
                None => {
                    self.arena.push(TrieNode::empty());
                    let new_idx = self.arena.len() - 1;
                    self.arena[node_idx].children[child_slot] = Some(new_idx);
                    new_idx
                }
            };
        }
        self.arena[node_idx].route = Some(entry);
    }

    fn remove(&mut self, bits: impl Iterator<Item = bool>, prefix_len: u8) {
        let mut node_idx = 0usize;
        for bit in bits.take(prefix_len as usize) {
            match self.arena[node_idx].children[bit as usize] {
                Some(idx) => node_idx = idx,
                None => return,
            }
        }
        self.arena[node_idx].route = None;
    }

    /// Walks `bits` from the most significant, remembering the deepest
    /// node with an installed route: the longest-prefix match.
    fn lookup(&self, bits: impl Iterator<Item = bool>) -> Option<&RouteEntry> {
        let mut node_idx = 0usize;
        let mut best = self.arena[0].route.as_ref();
        for bit in bits {
            match self.arena[node_idx].children[bit as usize] {
                Some(idx) => {
                    node_idx = idx;
                    if let Some(r) = self.arena[node_idx].route.as_ref() {
                        best = Some(r);
                    }
                }
                None => break,
            }
        }
        best
    }
}

fn v4_bits(addr: Ipv4Addr) -> impl Iterator<Item = bool> {
    let bytes = addr.octets();
    (0..32).map(move |i| (bytes[i / 8] >> (7 - i % 8)) & 1 == 1)
}

fn v6_bits(addr: Ipv6Addr) -> impl Iterator<Item = bool> {
    let bytes = addr.octets();
    (0..128).map(move |i| (bytes[i / 8] >> (7 - i % 8)) & 1 == 1)
}

struct Inner {
    v4_exact: HashMap<Prefix4, RouteEntry>,
    v6_exact: HashMap<Prefix6, RouteEntry>,
    v4_trie: Trie,
    v6_trie: Trie,
    hw_sync_enabled: bool,
}

pub struct RoutingTable {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::with_capacity(CONFIG_MAX_ROUTING_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RoutingTable {
            inner: Mutex::new(Inner {
                v4_exact: HashMap::new(),
                v6_exact: HashMap::new(),
                v4_trie: Trie::new(),
                v6_trie: Trie::new(),
                hw_sync_enabled: false,
            }),
            capacity,
        }
    }

    pub fn set_hw_sync(&self, enabled: bool) {
        self.inner.lock().unwrap().hw_sync_enabled = enabled;
    }

    fn total_len(inner: &Inner) -> usize {
        inner.v4_exact.len() + inner.v6_exact.len()
    }

    /// Installs or replaces a route. If a route for the same prefix
    /// already exists, the new one wins only if it is strictly better by
    /// `(admin_distance asc, metric asc)`; otherwise the call is a no-op
    /// that still returns `Ok` (spec.md §4.8 tie-breaking).
    pub fn add_v4(&self, prefix: Prefix4, entry: RouteEntry) -> Result<Option<HwOp>> {
        if prefix.len > 32 {
            return Err(SwitchError::InvalidArgument(format!(
                "IPv4 prefix length {} out of range",
                prefix.len
            )));
        }
        let masked = Prefix4 {
            addr: prefix.addr.masked(prefix.len),
            len: prefix.len,
        };
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.v4_exact.get(&masked) {
            if (entry.admin_distance, entry.metric) >= (existing.admin_distance, existing.metric) {
                return Ok(None);
            }
        } else if Self::total_len(&inner) >= self.capacity {
            return Err(SwitchError::ResourceExhausted("routing table full".into()));
        }
        inner.v4_exact.insert(masked, entry.clone());
        inner.v4_trie.insert(v4_bits(masked.addr), masked.len, entry.clone());
        let hw_sync = inner.hw_sync_enabled;
        Ok(hw_sync.then(|| HwOp::InstallV4(masked, entry)))
    }

    pub fn add_v6(&self, prefix: Prefix6, entry: RouteEntry) -> Result<Option<HwOp>> {
        if prefix.len > 128 {
            return Err(SwitchError::InvalidArgument(format!(
                "IPv6 prefix length {} out of range",
                prefix.len
            )));
        }
        let masked = Prefix6 {
            addr: prefix.addr.masked(prefix.len),
            len: prefix.len,
        };
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.v6_exact.get(&masked) {
            if (entry.admin_distance, entry.metric) >= (existing.admin_distance, existing.metric) {
                return Ok(None);
            }
        } else if Self::total_len(&inner) >= self.capacity {
            return Err(SwitchError::ResourceExhausted("routing table full".into()));
        }
        inner.v6_exact.insert(masked, entry.clone());
        inner.v6_trie.insert(v6_bits(masked.addr), masked.len, entry.clone());
        let hw_sync = inner.hw_sync_enabled;
        Ok(hw_sync.then(|| HwOp::InstallV6(masked, entry)))
    }

    pub fn remove_v4(&self, prefix: Prefix4) -> Result<Option<HwOp>> {
        let masked = Prefix4 {
            addr: prefix.addr.masked(prefix.len),
            len: prefix.len,
        };
        let mut inner = self.inner.lock().unwrap();
        if inner.v4_exact.remove(&masked).is_none() {
            return Err(SwitchError::NotFound("no such IPv4 route".into()));
        }
        inner.v4_trie.remove(v4_bits(masked.addr), masked.len);
        let hw_sync = inner.hw_sync_enabled;
        Ok(hw_sync.then(|| HwOp::RemoveV4(masked)))
    }

    pub fn remove_v6(&self, prefix: Prefix6) -> Result<Option<HwOp>> {
        let masked = Prefix6 {
            addr: prefix.addr.masked(prefix.len),
            len: prefix.len,
        };
        let mut inner = self.inner.lock().unwrap();
        if inner.v6_exact.remove(&masked).is_none() {
            return Err(SwitchError::NotFound("no such IPv6 route".into()));
        }
        inner.v6_trie.remove(v6_bits(masked.addr), masked.len);
        let hw_sync = inner.hw_sync_enabled;
        Ok(hw_sync.then(|| HwOp::RemoveV6(masked)))
    }

    pub fn lookup_v4(&self, dst: Ipv4Addr) -> Result<RouteEntry> {
        self.inner
            .lock()
            .unwrap()
            .v4_trie
            .lookup(v4_bits(dst))
            .cloned()
            .ok_or_else(|| SwitchError::NotFound(format!("no route to {dst}")))
    }

    pub fn lookup_v6(&self, dst: Ipv6Addr) -> Result<RouteEntry> {
        self.inner
            .lock()
            .unwrap()
            .v6_trie
            .lookup(v6_bits(dst))
            .cloned()
            .ok_or_else(|| SwitchError::NotFound(format!("no route to {dst}")))
    }

    pub fn get_all_v4_routes(&self) -> Vec<(Prefix4, RouteEntry)> {
        self.inner
            .lock()
            .unwrap()
            .v4_exact
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn get_all_v6_routes(&self) -> Vec<(Prefix6, RouteEntry)> {
        self.inner
            .lock()
            .unwrap()
            .v6_exact
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        Self::total_len(&self.inner.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(port: u16, admin_distance: u8, metric: u32) -> RouteEntry {
        RouteEntry {
            next_hop: NextHop::Direct,
            out_port: PortId::new(port),
            admin_distance,
            metric,
            installed_secs: 0,
        }
    }

    #[test]
    fn longest_prefix_match_prefers_the_more_specific_route() {
        let table = RoutingTable::new();
        table
            .add_v4(
                Prefix4 {
                    addr: Ipv4Addr::new(10, 0, 0, 0),
                    len: 8,
                },
                route(1, 1, 1),
            )
            .unwrap();
        table
            .add_v4(
                Prefix4 {
                    addr: Ipv4Addr::new(10, 0, 1, 0),
                    len: 24,
                },
                route(2, 1, 1),
            )
            .unwrap();

        let specific = table.lookup_v4(Ipv4Addr::new(10, 0, 1, 5)).unwrap();
        assert_eq!(specific.out_port, PortId::new(2));

        let general = table.lookup_v4(Ipv4Addr::new(10, 0, 2, 5)).unwrap();
        assert_eq!(general.out_port, PortId::new(1));
    }

    #[test]
    fn lookup_with_no_match_is_not_found() {
        let table = RoutingTable::new();
        assert!(table.lookup_v4(Ipv4Addr::new(192, 168, 1, 1)).is_err());
    }

    #[test]
    fn better_admin_distance_replaces_existing_route() {
        let table = RoutingTable::new();
        let prefix = Prefix4 {
            addr: Ipv4Addr::new(172, 16, 0, 0),
            len: 16,
        };
        table.add_v4(prefix, route(1, 110, 5)).unwrap();
        table.add_v4(prefix, route(2, 1, 5)).unwrap();
        let current = table.lookup_v4(Ipv4Addr::new(172, 16, 1, 1)).unwrap();
        assert_eq!(current.out_port, PortId::new(2));
    }

    #[test]
    fn worse_admin_distance_does_not_replace() {
        let table = RoutingTable::new();
        let prefix = Prefix4 {
            addr: Ipv4Addr::new(172, 16, 0, 0),
            len: 16,
        };
        table.add_v4(prefix, route(1, 1, 5)).unwrap();
        table.add_v4(prefix, route(2, 110, 5)).unwrap();
        let current = table.lookup_v4(Ipv4Addr::new(172, 16, 1, 1)).unwrap();
        assert_eq!(current.out_port, PortId::new(1));
    }

    #[test]
    fn remove_then_lookup_no_longer_matches() {
        let table = RoutingTable::new();
        let prefix = Prefix4 {
            addr: Ipv4Addr::new(192, 168, 0, 0),
            len: 24,
        };
        table.add_v4(prefix, route(1, 1, 1)).unwrap();
        table.remove_v4(prefix).unwrap();
        assert!(table.lookup_v4(Ipv4Addr::new(192, 168, 0, 1)).is_err());
    }

    #[test]
    fn hw_sync_hook_emits_install_op_only_when_enabled() {
        let table = RoutingTable::new();
        let prefix = Prefix4 {
            addr: Ipv4Addr::new(10, 1, 0, 0),
            len: 16,
        };
        let no_sync = table.add_v4(prefix, route(1, 1, 1)).unwrap();
        assert!(no_sync.is_none());

        table.set_hw_sync(true);
        let prefix2 = Prefix4 {
            addr: Ipv4Addr::new(10, 2, 0, 0),
            len: 16,
        };
        let synced = table.add_v4(prefix2, route(2, 1, 1)).unwrap();
        assert!(matches!(synced, Some(HwOp::InstallV4(_, _))));
    }

    #[test]
    fn ipv6_longest_prefix_match() {
        let table = RoutingTable::new();
        table
            .add_v6(
                Prefix6 {
                    addr: Ipv6Addr([0x20, 1, 0xd, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
                    len: 32,
                },
                route(1, 1, 1),
            )
            .unwrap();
        let found = table
            .lookup_v6(Ipv6Addr([
                0x20, 1, 0xd, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
            ]))
            .unwrap();
        assert_eq!(found.out_port, PortId::new(1));
    }
}
