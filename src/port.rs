//! C2 — port registry.
//!
//! Tracks the fixed set of physical ports plus the CPU port, their
//! configured/operational state, and the MAC address each port presents to
//! the wire. Grounded on the teacher's `core::rate_limiter::RateLimiterManager`
//! (a `Mutex<HashMap<..>>` guarding a small per-key record, with getter/setter
//! methods taking the lock per call) generalized to a fixed-size `Vec` since
//! port identity space is bounded at construction time (spec.md §4.2).

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::CONFIG_DEFAULT_MTU;
use crate::error::{PortIdDisplay, Result, SwitchError};
use crate::net::{MacAddr, PortId};

/// Administrative state a port is configured into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminState {
    Up,
    Down,
}

/// Observed link state, driven by the backend's link-event stream (C10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperState {
    Up,
    Down,
}

/// Static and dynamic state for one port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortEntry {
    pub id: PortId,
    pub mac: MacAddr,
    pub admin_state: AdminState,
    pub oper_state: OperState,
    pub mtu: u32,
    pub is_cpu_port: bool,
}

impl PortEntry {
    pub fn is_forwarding_eligible(&self) -> bool {
        self.admin_state == AdminState::Up && self.oper_state == OperState::Up
    }
}

/// Snapshot view returned by [`PortRegistry::get_info`]; cheap to clone and
/// safe to hold past the registry lock.
pub type PortInfo = PortEntry;

/// Fixed-size table of ports plus the reserved CPU port, indexed by
/// `PortId`. `port_count` physical ports are numbered `0..port_count`; the
/// CPU port is a distinct entry addressed by [`PortRegistry::cpu_port`].
pub struct PortRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    ports: Vec<PortEntry>,
    cpu_port: PortEntry,
    base_mac: MacAddr,
}

impl PortRegistry {
    /// Builds a registry for `port_count` physical ports, each with a
    /// default MAC derived from `base_mac` via [`MacAddr::derive_for_port`]
    /// (spec.md §4.2).
    pub fn new(port_count: u16, base_mac: MacAddr) -> Result<Self> {
        if port_count == 0 {
            return Err(SwitchError::InvalidArgument(
                "port_count must be > 0".into(),
            ));
        }
        let ports = (0..port_count)
            .map(|idx| PortEntry {
                id: PortId::new(idx),
                mac: MacAddr::derive_for_port(base_mac, idx),
                admin_state: AdminState::Down,
                oper_state: OperState::Down,
                mtu: CONFIG_DEFAULT_MTU,
                is_cpu_port: false,
            })
            .collect();
        let cpu_port = PortEntry {
            id: PortId::INTERNAL,
            mac: MacAddr::derive_for_port(base_mac, PortId::INTERNAL.0),
            admin_state: AdminState::Up,
            oper_state: OperState::Up,
            mtu: CONFIG_DEFAULT_MTU,
            is_cpu_port: true,
        };
        Ok(PortRegistry {
            inner: Mutex::new(Inner {
                ports,
                cpu_port,
                base_mac,
            }),
        })
    }

    pub fn count(&self) -> u16 {
        self.inner.lock().unwrap().ports.len() as u16
    }

    /// Physical port count plus the CPU port.
    pub fn total_count(&self) -> u16 {
        self.count() + 1
    }

    pub fn cpu_port(&self) -> PortId {
        PortId::INTERNAL
    }

    pub fn base_mac(&self) -> MacAddr {
        self.inner.lock().unwrap().base_mac
    }

    pub fn is_valid(&self, port: PortId) -> bool {
        if port == PortId::INTERNAL {
            return true;
        }
        let inner = self.inner.lock().unwrap();
        (port.0 as usize) < inner.ports.len()
    }

    fn with_entry<T>(&self, port: PortId, f: impl FnOnce(&PortEntry) -> T) -> Result<T> {
        let inner = self.inner.lock().unwrap();
        if port == PortId::INTERNAL {
            return Ok(f(&inner.cpu_port));
        }
        let entry = inner
            .ports
            .get(port.0 as usize)
            .ok_or_else(|| SwitchError::NotFound(format!("no such port: {port}")))?;
        Ok(f(entry))
    }

    fn with_entry_mut<T>(&self, port: PortId, f: impl FnOnce(&mut PortEntry) -> T) -> Result<T> {
        let mut inner = self.inner.lock().unwrap();
        if port == PortId::INTERNAL {
            return Ok(f(&mut inner.cpu_port));
        }
        let entry = inner
            .ports
            .get_mut(port.0 as usize)
            .ok_or_else(|| SwitchError::NotFound(format!("no such port: {port}")))?;
        Ok(f(entry))
    }

    pub fn get_info(&self, port: PortId) -> Result<PortInfo> {
        self.with_entry(port, |e| e.clone())
    }

    pub fn get_mac(&self, port: PortId) -> Result<MacAddr> {
        self.with_entry(port, |e| e.mac)
    }

    pub fn set_mac(&self, port: PortId, mac: MacAddr) -> Result<()> {
        if mac.is_multicast() {
            return Err(SwitchError::InvalidArgument(
                "port MAC must be a unicast address".into(),
            ));
        }
        self.with_entry_mut(port, |e| e.mac = mac)
    }

    pub fn admin_state(&self, port: PortId) -> Result<AdminState> {
        self.with_entry(port, |e| e.admin_state)
    }

    pub fn set_admin_state(&self, port: PortId, state: AdminState) -> Result<()> {
        self.with_entry_mut(port, |e| e.admin_state = state)
    }

    pub fn oper_state(&self, port: PortId) -> Result<OperState> {
        self.with_entry(port, |e| e.oper_state)
    }

    /// Records an observed link transition (driven by C10's link-event
    /// stream, not user configuration).
    pub fn set_oper_state(&self, port: PortId, state: OperState) -> Result<()> {
        self.with_entry_mut(port, |e| e.oper_state = state)
    }

    pub fn mtu(&self, port: PortId) -> Result<u32> {
        self.with_entry(port, |e| e.mtu)
    }

    pub fn set_mtu(&self, port: PortId, mtu: u32) -> Result<()> {
        if mtu == 0 {
            return Err(SwitchError::InvalidArgument("mtu must be > 0".into()));
        }
        self.with_entry_mut(port, |e| e.mtu = mtu)
    }

    pub fn is_forwarding_eligible(&self, port: PortId) -> Result<bool> {
        self.with_entry(port, |e| e.is_forwarding_eligible())
    }

    /// Returns `Ok(())` if `port` is up (admin and oper), otherwise the
    /// specific [`SwitchError::PortDown`] a caller should surface.
    pub fn require_up(&self, port: PortId) -> Result<()> {
        if self.is_forwarding_eligible(port)? {
            Ok(())
        } else {
            Err(SwitchError::PortDown(PortIdDisplay(port.0)))
        }
    }

    pub fn get_all_macs(&self) -> Vec<(PortId, MacAddr)> {
        let inner = self.inner.lock().unwrap();
        inner.ports.iter().map(|e| (e.id, e.mac)).collect()
    }

    pub fn all_port_ids(&self) -> Vec<PortId> {
        let inner = self.inner.lock().unwrap();
        inner.ports.iter().map(|e| e.id).collect()
    }
}
