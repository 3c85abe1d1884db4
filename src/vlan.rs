//! C5 — VLAN engine.
//!
//! Per-port VLAN mode and membership, plus the ingress/egress tag
//! transforms a frame goes through while crossing a port boundary. Port
//! configuration is grounded on the teacher's `port::PortRegistry` shape
//! (`Mutex<Vec<Entry>>` addressed by `PortId`, same module this file sits
//! beside); the 802.1Q insert/strip logic mutates a [`PacketBuffer`] the
//! same way `buffer::PacketBuffer::insert`/`remove` were built to support.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::buffer::PacketBuffer;
use crate::config::CONFIG_DEFAULT_VLAN_ID;
use crate::error::{Result, SwitchError};
use crate::net::{EtherTypes, PortId, VlanId};

/// How a port classifies and tags traffic (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortMode {
    /// Single VLAN, always untagged on the wire.
    Access,
    /// Carries multiple VLANs, always tagged on the wire (except the
    /// configured native VLAN if `native_untagged` is set).
    Trunk,
    /// Mixed: some VLANs tagged, the PVID untagged.
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanPortConfig {
    pub mode: PortMode,
    pub pvid: VlanId,
    /// VLANs this port is a member of (egress-eligible). For `Access`
    /// ports this is always exactly `{pvid}`.
    pub member_vlans: Vec<VlanId>,
    /// Whether `pvid` is sent untagged on a `Trunk` port.
    pub native_untagged: bool,
    /// Whether an 802.1Q-tagged frame is admitted on ingress.
    pub accept_tagged: bool,
    /// Whether an untagged frame is admitted on ingress.
    pub accept_untagged: bool,
    /// Whether ingress enforces that `in_port` is a member of the
    /// classified VLAN (IEEE 802.1Q ingress filtering).
    pub ingress_filter: bool,
}

impl Default for VlanPortConfig {
    fn default() -> Self {
        VlanPortConfig {
            mode: PortMode::Access,
            pvid: VlanId::new(CONFIG_DEFAULT_VLAN_ID),
            member_vlans: vec![VlanId::new(CONFIG_DEFAULT_VLAN_ID)],
            native_untagged: true,
            accept_tagged: true,
            accept_untagged: true,
            ingress_filter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanEntry {
    pub id: VlanId,
    pub name: String,
}

/// VLAN engine lifecycle/membership events (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VlanEvent {
    Created(VlanId),
    Deleted(VlanId),
    PortAdded(VlanId, PortId),
    PortRemoved(VlanId, PortId),
    ConfigChanged(PortId),
}

pub struct VlanEngine {
    inner: Mutex<Inner>,
}

struct Inner {
    vlans: Vec<VlanEntry>,
    ports: std::collections::HashMap<PortId, VlanPortConfig>,
}

impl VlanEngine {
    pub fn new() -> Self {
        let default_vlan = VlanEntry {
            id: VlanId::new(CONFIG_DEFAULT_VLAN_ID),
            name: "default".to_string(),
        };
        VlanEngine {
            inner: Mutex::new(Inner {
                vlans: vec![default_vlan],
                ports: std::collections::HashMap::new(),
            }),
        }
    }

    pub fn create_vlan(&self, id: VlanId, name: impl Into<String>) -> Result<VlanEvent> {
        if !id.is_valid() {
            return Err(SwitchError::InvalidArgument(format!("invalid vlan id {id}")));
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.vlans.iter().any(|v| v.id == id) {
            return Err(SwitchError::AlreadyExists(format!("vlan {id} already exists")));
        }
        inner.vlans.push(VlanEntry { id, name: name.into() });
        Ok(VlanEvent::Created(id))
    }

    pub fn delete_vlan(&self, id: VlanId) -> Result<VlanEvent> {
        if id == VlanId::new(CONFIG_DEFAULT_VLAN_ID) {
            return Err(SwitchError::InvalidState("cannot delete the default VLAN".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let pos = inner
            .vlans
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| SwitchError::NotFound(format!("vlan {id} not found")))?;
        inner.vlans.remove(pos);
        for cfg in inner.ports.values_mut() {
            cfg.member_vlans.retain(|v| *v != id);
        }
        Ok(VlanEvent::Deleted(id))
    }

    pub fn vlan_exists(&self, id: VlanId) -> bool {
        self.inner.lock().unwrap().vlans.iter().any(|v| v.id == id)
    }

    pub fn vlan_count(&self) -> usize {
        self.inner.lock().unwrap().vlans.len()
    }

    pub fn get_port_config(&self, port: PortId) -> VlanPortConfig {
        self.inner
            .lock()
            .unwrap()
            .ports
            .get(&port)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_port_config(&self, port: PortId, cfg: VlanPortConfig) -> Result<VlanEvent> {
        if !cfg.pvid.is_valid() {
            return Err(SwitchError::InvalidArgument(format!(
                "invalid pvid {}",
                cfg.pvid
            )));
        }
        self.inner.lock().unwrap().ports.insert(port, cfg);
        Ok(VlanEvent::ConfigChanged(port))
    }

    pub fn add_port_to_vlan(&self, port: PortId, vlan: VlanId) -> Result<VlanEvent> {
        let mut inner = self.inner.lock().unwrap();
        let cfg = inner.ports.entry(port).or_default();
        if !cfg.member_vlans.contains(&vlan) {
            cfg.member_vlans.push(vlan);
        }
        Ok(VlanEvent::PortAdded(vlan, port))
    }

    pub fn remove_port_from_vlan(&self, port: PortId, vlan: VlanId) -> Result<VlanEvent> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cfg) = inner.ports.get_mut(&port) {
            cfg.member_vlans.retain(|v| *v != vlan);
        }
        Ok(VlanEvent::PortRemoved(vlan, port))
    }

    pub fn is_member(&self, port: PortId, vlan: VlanId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .ports
            .get(&port)
            .map(|cfg| cfg.member_vlans.contains(&vlan))
            .unwrap_or_else(|| vlan == VlanId::new(CONFIG_DEFAULT_VLAN_ID))
    }

    /// Classifies an ingress frame into a VLAN and strips any 802.1Q tag
    /// (spec.md §4.5 ingress algorithm):
    /// - Untagged frame on any port: classified into the port's PVID.
    /// - Tagged frame: classified into the tag's VLAN if the port is a
    ///   member, otherwise dropped.
    pub fn ingress(&self, port: PortId, buf: &mut PacketBuffer) -> Result<VlanId> {
        let cfg = self.get_port_config(port);
        let is_tagged = buf.metadata.ethertype == EtherTypes::Vlan8021Q;

        if !is_tagged {
            if !cfg.accept_untagged {
                return Err(SwitchError::InvalidState(format!(
                    "{port} does not accept untagged frames"
                )));
            }
            let vlan = cfg.pvid;
            if cfg.ingress_filter && !cfg.member_vlans.contains(&vlan) {
                return Err(SwitchError::InvalidState(format!(
                    "{port} is not a member of {vlan}"
                )));
            }
            buf.metadata.vlan = vlan;
            buf.metadata.is_tagged = false;
            return Ok(vlan);
        }

        if !cfg.accept_tagged {
            return Err(SwitchError::InvalidState(format!(
                "{port} does not accept tagged frames"
            )));
        }

        if buf.len() < 18 {
            return Err(SwitchError::InvalidPacket(
                "802.1Q tag truncated before inner ethertype".into(),
            ));
        }
        let mut tci = [0u8; 2];
        buf.peek(14, 2, &mut tci)?;
        let vlan = VlanId::new(u16::from_be_bytes(tci) & 0x0fff);
        let mut inner_ethertype = [0u8; 2];
        buf.peek(16, 2, &mut inner_ethertype)?;

        if cfg.ingress_filter && !cfg.member_vlans.contains(&vlan) {
            return Err(SwitchError::InvalidState(format!(
                "{port} is not a member of {vlan}"
            )));
        }

        buf.remove(12, 4)?;
        buf.metadata.ethertype = crate::net::EtherType::new(u16::from_be_bytes(inner_ethertype));
        buf.metadata.vlan = vlan;
        buf.metadata.is_tagged = true;
        Ok(vlan)
    }

    /// Applies the egress tag transform for `port`/`vlan` (spec.md §4.5
    /// egress algorithm): a `Trunk` port tags unless `vlan == pvid` and
    /// `native_untagged`; an `Access` port never tags; a `Hybrid` port
    /// tags everything except its PVID.
    pub fn egress(&self, port: PortId, vlan: VlanId, buf: &mut PacketBuffer) -> Result<()> {
        let cfg = self.get_port_config(port);
        if !cfg.member_vlans.contains(&vlan) && vlan != VlanId::new(CONFIG_DEFAULT_VLAN_ID) {
            return Err(SwitchError::InvalidState(format!(
                "{port} is not a member of {vlan}"
            )));
        }

        let should_tag = match cfg.mode {
            PortMode::Access => false,
            PortMode::Trunk => !(vlan == cfg.pvid && cfg.native_untagged),
            PortMode::Hybrid => vlan != cfg.pvid,
        };

        if !should_tag {
            return Ok(());
        }

        if buf.len() < 12 {
            return Err(SwitchError::InvalidPacket(
                "frame too short to carry an 802.1Q tag".into(),
            ));
        }
        let original_ethertype = buf.metadata.ethertype;
        let tci = vlan.0 & 0x0fff;
        let mut tag = [0u8; 4];
        tag[0..2].copy_from_slice(&EtherTypes::Vlan8021Q.0.to_be_bytes());
        tag[2..4].copy_from_slice(&tci.to_be_bytes());
        buf.insert(12, &tag, 4)?;
        buf.metadata.ethertype = EtherTypes::Vlan8021Q;
        let _ = original_ethertype;
        Ok(())
    }
}

impl Default for VlanEngine {
    fn default() -> Self {
        Self::new()
    }
}
