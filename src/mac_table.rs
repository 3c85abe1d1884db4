//! C4 — MAC address table.
//!
//! Maps `(MacAddr, VlanId)` to an egress port, with aging for dynamically
//! learned entries and LRU eviction once the table hits capacity. Grounded
//! on the teacher's `core::rate_limiter::RateLimiterManager`: a
//! `Mutex<HashMap<K, V>>` with a `last_refill`-style timestamp per entry
//! that a periodic driver call (`consume`/`should_pass` there, `process_aging`
//! here) advances against the wall clock.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::{CONFIG_DEFAULT_MAC_AGING_TIME, CONFIG_MAX_MAC_TABLE_ENTRIES};
use crate::error::{Result, SwitchError};
use crate::net::{MacAddr, PortId, VlanId};

/// Whether a MAC table entry was installed by the control plane (`Static`,
/// never aged or learned over) or discovered by the data plane (`Dynamic`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacEntry {
    pub mac: MacAddr,
    pub vlan: VlanId,
    pub port: PortId,
    pub kind: EntryKind,
    pub last_seen_secs: u64,
}

/// Emitted when a dynamic entry's port changes (the same MAC re-learned on
/// a different port), so STP/loop-detection logic can react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveEvent {
    pub mac: MacAddr,
    pub vlan: VlanId,
    pub old_port: PortId,
    pub new_port: PortId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key(MacAddr, VlanId);

pub struct MacTable {
    inner: Mutex<Inner>,
    capacity: usize,
    aging_time_secs: u64,
}

struct Inner {
    entries: HashMap<Key, MacEntry>,
    /// Insertion/access order for dynamic entries, oldest first, used for
    /// LRU eviction. Static entries are never placed here.
    lru: Vec<Key>,
}

impl MacTable {
    pub fn new() -> Self {
        Self::with_capacity(CONFIG_MAX_MAC_TABLE_ENTRIES, CONFIG_DEFAULT_MAC_AGING_TIME)
    }

    pub fn with_capacity(capacity: usize, aging_time_secs: u64) -> Self {
        MacTable {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                lru: Vec::new(),
            }),
            capacity,
            aging_time_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch_lru(inner: &mut Inner, key: Key) {
        if let Some(pos) = inner.lru.iter().position(|k| *k == key) {
            inner.lru.remove(pos);
        }
        inner.lru.push(key);
    }

    /// Evicts the least-recently-used dynamic entry, if any. Returns
    /// whether an entry was evicted.
    fn evict_one_dynamic(inner: &mut Inner) -> bool {
        if let Some(pos) = inner.lru.iter().position(|k| {
            inner
                .entries
                .get(k)
                .map(|e| e.kind == EntryKind::Dynamic)
                .unwrap_or(false)
        }) {
            let key = inner.lru.remove(pos);
            inner.entries.remove(&key);
            true
        } else {
            false
        }
    }

    /// Data-plane learning path: inserts or refreshes a dynamic entry.
    /// Never overwrites a `Static` entry for the same `(mac, vlan)`
    /// (spec.md §4.4's static-overrides-dynamic invariant). Returns a
    /// [`MoveEvent`] if the MAC was already known dynamically on a
    /// different port.
    pub fn learn(
        &self,
        mac: MacAddr,
        vlan: VlanId,
        port: PortId,
        now_secs: u64,
    ) -> Result<Option<MoveEvent>> {
        let key = Key(mac, vlan);
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.entries.get(&key) {
            if existing.kind == EntryKind::Static {
                return Ok(None);
            }
            let old_port = existing.port;
            let moved = old_port != port;
            let entry = inner.entries.get_mut(&key).unwrap();
            entry.port = port;
            entry.last_seen_secs = now_secs;
            Self::touch_lru(&mut inner, key);
            return Ok(if moved {
                Some(MoveEvent {
                    mac,
                    vlan,
                    old_port,
                    new_port: port,
                })
            } else {
                None
            });
        }

        if inner.entries.len() >= self.capacity && !Self::evict_one_dynamic(&mut inner) {
            return Err(SwitchError::TableFull);
        }

        inner.entries.insert(
            key,
            MacEntry {
                mac,
                vlan,
                port,
                kind: EntryKind::Dynamic,
                last_seen_secs: now_secs,
            },
        );
        Self::touch_lru(&mut inner, key);
        Ok(None)
    }

    /// Control-plane path: installs a static entry, replacing any dynamic
    /// entry for the same key. Static entries count toward capacity but are
    /// never LRU-evicted.
    pub fn add_static(&self, mac: MacAddr, vlan: VlanId, port: PortId) -> Result<()> {
        let key = Key(mac, vlan);
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(&key)
            && inner.entries.len() >= self.capacity
            && !Self::evict_one_dynamic(&mut inner)
        {
            return Err(SwitchError::TableFull);
        }
        if let Some(pos) = inner.lru.iter().position(|k| *k == key) {
            inner.lru.remove(pos);
        }
        inner.entries.insert(
            key,
            MacEntry {
                mac,
                vlan,
                port,
                kind: EntryKind::Static,
                last_seen_secs: 0,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, mac: MacAddr, vlan: VlanId) -> Option<MacEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(&Key(mac, vlan))
            .cloned()
    }

    pub fn get_port(&self, mac: MacAddr, vlan: VlanId) -> Result<PortId> {
        self.lookup(mac, vlan)
            .map(|e| e.port)
            .ok_or_else(|| SwitchError::NotFound(format!("no MAC table entry for {mac} on {vlan}")))
    }

    pub fn delete(&self, mac: MacAddr, vlan: VlanId) -> Result<()> {
        let key = Key(mac, vlan);
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.remove(&key).is_none() {
            return Err(SwitchError::NotFound(format!(
                "no MAC table entry for {mac} on {vlan}"
            )));
        }
        if let Some(pos) = inner.lru.iter().position(|k| *k == key) {
            inner.lru.remove(pos);
        }
        Ok(())
    }

    /// Removes every dynamic entry; static entries are unaffected. Used by
    /// STP on topology change (spec.md §4.6) and by explicit flush
    /// requests.
    pub fn flush_dynamic(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.retain(|_, e| e.kind == EntryKind::Static);
        inner.lru.retain(|k| inner.entries.contains_key(k));
    }

    /// Removes every dynamic entry learned on `port`. Used when a port goes
    /// down or STP moves it out of the forwarding state.
    pub fn flush_port(&self, port: PortId) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entries
            .retain(|_, e| !(e.kind == EntryKind::Dynamic && e.port == port));
        inner.lru.retain(|k| inner.entries.contains_key(k));
    }

    /// Ages out dynamic entries whose `last_seen_secs` is older than the
    /// configured aging time. A zero aging time disables aging.
    pub fn process_aging(&self, now_secs: u64) {
        if self.aging_time_secs == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let cutoff = self.aging_time_secs;
        inner.entries.retain(|_, e| {
            e.kind == EntryKind::Static || now_secs.saturating_sub(e.last_seen_secs) < cutoff
        });
        inner.lru.retain(|k| inner.entries.contains_key(k));
    }

    pub fn iter_all(&self) -> Vec<MacEntry> {
        self.inner.lock().unwrap().entries.values().cloned().collect()
    }
}

impl Default for MacTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddr {
        MacAddr([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn learn_then_lookup_round_trips() {
        let table = MacTable::with_capacity(16, 300);
        table.learn(mac(1), VlanId::DEFAULT_VLAN, PortId::new(2), 100).unwrap();
        assert_eq!(
            table.get_port(mac(1), VlanId::DEFAULT_VLAN).unwrap(),
            PortId::new(2)
        );
    }

    #[test]
    fn static_entry_is_never_overwritten_by_learn() {
        let table = MacTable::with_capacity(16, 300);
        table.add_static(mac(1), VlanId::DEFAULT_VLAN, PortId::new(1)).unwrap();
        let moved = table.learn(mac(1), VlanId::DEFAULT_VLAN, PortId::new(2), 50).unwrap();
        assert!(moved.is_none());
        assert_eq!(
            table.get_port(mac(1), VlanId::DEFAULT_VLAN).unwrap(),
            PortId::new(1)
        );
    }

    #[test]
    fn relearning_on_a_new_port_emits_a_move_event() {
        let table = MacTable::with_capacity(16, 300);
        table.learn(mac(1), VlanId::DEFAULT_VLAN, PortId::new(1), 0).unwrap();
        let event = table.learn(mac(1), VlanId::DEFAULT_VLAN, PortId::new(2), 1).unwrap();
        assert_eq!(
            event,
            Some(MoveEvent {
                mac: mac(1),
                vlan: VlanId::DEFAULT_VLAN,
                old_port: PortId::new(1),
                new_port: PortId::new(2),
            })
        );
    }

    #[test]
    fn capacity_is_enforced_via_lru_eviction_of_dynamic_entries() {
        let table = MacTable::with_capacity(2, 300);
        table.learn(mac(1), VlanId::DEFAULT_VLAN, PortId::new(1), 0).unwrap();
        table.learn(mac(2), VlanId::DEFAULT_VLAN, PortId::new(1), 1).unwrap();
        // table full; learning a third dynamic entry evicts mac(1) (LRU).
        table.learn(mac(3), VlanId::DEFAULT_VLAN, PortId::new(1), 2).unwrap();
        assert!(table.lookup(mac(1), VlanId::DEFAULT_VLAN).is_none());
        assert!(table.lookup(mac(2), VlanId::DEFAULT_VLAN).is_some());
        assert!(table.lookup(mac(3), VlanId::DEFAULT_VLAN).is_some());
    }

    #[test]
    fn table_full_when_all_entries_are_static() {
        let table = MacTable::with_capacity(1, 300);
        table.add_static(mac(1), VlanId::DEFAULT_VLAN, PortId::new(1)).unwrap();
        assert!(matches!(
            table.learn(mac(2), VlanId::DEFAULT_VLAN, PortId::new(1), 0),
            Err(SwitchError::TableFull)
        ));
    }

    #[test]
    fn process_aging_removes_stale_dynamic_entries_only() {
        let table = MacTable::with_capacity(16, 10);
        table.add_static(mac(1), VlanId::DEFAULT_VLAN, PortId::new(1)).unwrap();
        table.learn(mac(2), VlanId::DEFAULT_VLAN, PortId::new(1), 0).unwrap();
        table.process_aging(20);
        assert!(table.lookup(mac(1), VlanId::DEFAULT_VLAN).is_some());
        assert!(table.lookup(mac(2), VlanId::DEFAULT_VLAN).is_none());
    }

    #[test]
    fn flush_dynamic_keeps_static_entries() {
        let table = MacTable::with_capacity(16, 300);
        table.add_static(mac(1), VlanId::DEFAULT_VLAN, PortId::new(1)).unwrap();
        table.learn(mac(2), VlanId::DEFAULT_VLAN, PortId::new(1), 0).unwrap();
        table.flush_dynamic();
        assert!(table.lookup(mac(1), VlanId::DEFAULT_VLAN).is_some());
        assert!(table.lookup(mac(2), VlanId::DEFAULT_VLAN).is_none());
    }

    #[test]
    fn flush_port_only_removes_entries_on_that_port() {
        let table = MacTable::with_capacity(16, 300);
        table.learn(mac(1), VlanId::DEFAULT_VLAN, PortId::new(1), 0).unwrap();
        table.learn(mac(2), VlanId::DEFAULT_VLAN, PortId::new(2), 0).unwrap();
        table.flush_port(PortId::new(1));
        assert!(table.lookup(mac(1), VlanId::DEFAULT_VLAN).is_none());
        assert!(table.lookup(mac(2), VlanId::DEFAULT_VLAN).is_some());
    }

    #[test]
    fn delete_unknown_entry_is_not_found() {
        let table = MacTable::with_capacity(16, 300);
        assert!(matches!(
            table.delete(mac(9), VlanId::DEFAULT_VLAN),
            Err(SwitchError::NotFound(_))
        ));
    }
}
