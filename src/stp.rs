//! C6 — spanning tree engine.
//!
//! One bridge instance per `Core`, covering root election, per-port state
//! machine transitions, and Configuration/Topology-Change-Notification BPDU
//! encode/decode (IEEE 802.1D). Mutex-guarded shared state follows the same
//! `Mutex<Inner>` shape as [`crate::vlan::VlanEngine`]; the state machine's
//! driver-tick method mirrors the teacher's `TokenBucket::consume`, which
//! also recomputes elapsed time against a stored timestamp on every call
//! rather than running its own timer thread.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::{
    STP_DEFAULT_BRIDGE_PRIORITY, STP_DEFAULT_FORWARD_DELAY_SECS, STP_DEFAULT_HELLO_TIME_SECS,
    STP_DEFAULT_MAX_AGE_SECS, STP_DEFAULT_PATH_COST, STP_DEFAULT_PORT_PRIORITY,
};
use crate::error::{Result, SwitchError};
use crate::net::{BridgeId, MacAddr, PortId};

/// The five port states of the 802.1D state machine (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortState {
    Disabled,
    Blocking,
    Listening,
    Learning,
    Forwarding,
}

impl PortState {
    /// Data frames are flooded/learned only in `Forwarding`; `Learning`
    /// feeds the MAC table but does not forward (spec.md §4.6).
    pub fn forwards_data(&self) -> bool {
        matches!(self, PortState::Forwarding)
    }

    pub fn learns_macs(&self) -> bool {
        matches!(self, PortState::Learning | PortState::Forwarding)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StpPort {
    pub port: PortId,
    pub state: PortState,
    pub priority: u8,
    pub path_cost: u32,
    pub designated_root: BridgeId,
    pub designated_cost: u32,
    pub designated_bridge: BridgeId,
    pub designated_port: u16,
    /// Seconds remaining in the current Listening/Learning transition.
    pub forward_delay_remaining: u32,
}

impl StpPort {
    fn new(port: PortId, bridge_id: BridgeId) -> Self {
        StpPort {
            port,
            state: PortState::Blocking,
            priority: STP_DEFAULT_PORT_PRIORITY,
            path_cost: STP_DEFAULT_PATH_COST,
            designated_root: bridge_id,
            designated_cost: 0,
            designated_bridge: bridge_id,
            designated_port: port.0,
            forward_delay_remaining: 0,
        }
    }

    fn port_id_field(&self) -> u16 {
        ((self.priority as u16) << 8) | (self.port.0 & 0xff)
    }
}

/// Decoded Configuration BPDU (IEEE 802.1D, 35 bytes on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBpdu {
    pub flags: u8,
    pub root_id: BridgeId,
    pub root_path_cost: u32,
    pub bridge_id: BridgeId,
    pub port_id: u16,
    pub message_age: u16,
    pub max_age: u16,
    pub hello_time: u16,
    pub forward_delay: u16,
}

const CONFIG_BPDU_LEN: usize = 35;
const TCN_BPDU_LEN: usize = 4;
const TC_FLAG: u8 = 0x01;
const TCA_FLAG: u8 = 0x80;

/// IEEE 802.1D encodes the four BPDU timers as 1/256ths of a second: a
/// field holding whole-second values such as `max_age = 20` is transmitted
/// as `20 * 256 = 0x1400`. `ConfigBpdu`'s in-memory fields hold plain
/// whole-second values; only the wire encoding applies the ×256 scale.
fn encode_timer(value_secs: u16) -> [u8; 2] {
    value_secs.wrapping_mul(256).to_be_bytes()
}

fn decode_timer(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes) / 256
}

impl ConfigBpdu {
    pub fn encode(&self) -> [u8; CONFIG_BPDU_LEN] {
        let mut out = [0u8; CONFIG_BPDU_LEN];
        out[0..2].copy_from_slice(&0u16.to_be_bytes()); // protocol id
        out[2] = 0; // protocol version
        out[3] = 0; // bpdu type: Config
        out[4] = self.flags;
        out[5..7].copy_from_slice(&self.root_id.priority.to_be_bytes());
        out[7..13].copy_from_slice(self.root_id.mac.as_bytes());
        out[13..17].copy_from_slice(&self.root_path_cost.to_be_bytes());
        out[17..19].copy_from_slice(&self.bridge_id.priority.to_be_bytes());
        out[19..25].copy_from_slice(self.bridge_id.mac.as_bytes());
        out[25..27].copy_from_slice(&self.port_id.to_be_bytes());
        out[27..29].copy_from_slice(&encode_timer(self.message_age));
        out[29..31].copy_from_slice(&encode_timer(self.max_age));
        out[31..33].copy_from_slice(&encode_timer(self.hello_time));
        out[33..35].copy_from_slice(&encode_timer(self.forward_delay));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CONFIG_BPDU_LEN {
            return Err(SwitchError::InvalidPacket(format!(
                "config BPDU too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[3] != 0 {
            return Err(SwitchError::HeaderError(format!(
                "not a config BPDU: type {}",
                bytes[3]
            )));
        }
        let mut root_mac = [0u8; 6];
        root_mac.copy_from_slice(&bytes[7..13]);
        let mut bridge_mac = [0u8; 6];
        bridge_mac.copy_from_slice(&bytes[19..25]);
        Ok(ConfigBpdu {
            flags: bytes[4],
            root_id: BridgeId::new(u16::from_be_bytes([bytes[5], bytes[6]]), MacAddr(root_mac)),
            root_path_cost: u32::from_be_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]),
            bridge_id: BridgeId::new(
                u16::from_be_bytes([bytes[17], bytes[18]]),
                MacAddr(bridge_mac),
            ),
            port_id: u16::from_be_bytes([bytes[25], bytes[26]]),
            message_age: decode_timer([bytes[27], bytes[28]]),
            max_age: decode_timer([bytes[29], bytes[30]]),
            hello_time: decode_timer([bytes[31], bytes[32]]),
            forward_delay: decode_timer([bytes[33], bytes[34]]),
        })
    }

    pub fn topology_change(&self) -> bool {
        self.flags & TC_FLAG != 0
    }

    pub fn topology_change_ack(&self) -> bool {
        self.flags & TCA_FLAG != 0
    }
}

/// Topology Change Notification BPDU: protocol id/version plus a type
/// byte, no body.
pub fn encode_tcn_bpdu() -> [u8; TCN_BPDU_LEN] {
    let mut out = [0u8; TCN_BPDU_LEN];
    out[3] = 0x80;
    out
}

pub fn decode_tcn_bpdu(bytes: &[u8]) -> Result<()> {
    if bytes.len() < TCN_BPDU_LEN || bytes[3] != 0x80 {
        return Err(SwitchError::InvalidPacket("not a TCN BPDU".into()));
    }
    Ok(())
}

struct Inner {
    bridge_id: BridgeId,
    root_id: BridgeId,
    root_path_cost: u32,
    root_port: Option<PortId>,
    ports: std::collections::HashMap<PortId, StpPort>,
    hello_time_secs: u32,
    max_age_secs: u32,
    forward_delay_secs: u32,
    topology_change: bool,
    topology_change_timer_secs: u32,
    enabled: bool,
}

/// The bridge's spanning-tree state. Lock order relative to other engines
/// follows spec.md §5: Port Registry, VLAN, MAC Table, **STP**, Routing,
/// ARP.
pub struct StpEngine {
    inner: Mutex<Inner>,
}

impl StpEngine {
    pub fn new(bridge_mac: MacAddr) -> Self {
        let bridge_id = BridgeId::new(STP_DEFAULT_BRIDGE_PRIORITY, bridge_mac);
        StpEngine {
            inner: Mutex::new(Inner {
                bridge_id,
                root_id: bridge_id,
                root_path_cost: 0,
                root_port: None,
                ports: std::collections::HashMap::new(),
                hello_time_secs: STP_DEFAULT_HELLO_TIME_SECS,
                max_age_secs: STP_DEFAULT_MAX_AGE_SECS,
                forward_delay_secs: STP_DEFAULT_FORWARD_DELAY_SECS,
                topology_change: false,
                topology_change_timer_secs: 0,
                enabled: true,
            }),
        }
    }

    pub fn bridge_id(&self) -> BridgeId {
        self.inner.lock().unwrap().bridge_id
    }

    pub fn root_id(&self) -> BridgeId {
        self.inner.lock().unwrap().root_id
    }

    pub fn is_root_bridge(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.root_id == inner.bridge_id
    }

    pub fn add_port(&self, port: PortId) {
        let mut inner = self.inner.lock().unwrap();
        let bridge_id = inner.bridge_id;
        inner
            .ports
            .entry(port)
            .or_insert_with(|| StpPort::new(port, bridge_id));
    }

    pub fn remove_port(&self, port: PortId) {
        self.inner.lock().unwrap().ports.remove(&port);
    }

    pub fn port_state(&self, port: PortId) -> Result<PortState> {
        self.inner
            .lock()
            .unwrap()
            .ports
            .get(&port)
            .map(|p| p.state)
            .ok_or_else(|| SwitchError::NotFound(format!("no such STP port: {port}")))
    }

    /// Preserved, documented behavior: disabling STP globally forces every
    /// port straight to `Forwarding` rather than leaving them `Disabled`
    /// (an explicitly flagged open question resolved by keeping the
    /// original control-plane contract: "STP off" means "forward like an
    /// unmanaged hub", not "block everything").
    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.enabled = enabled;
        if !enabled {
            for p in inner.ports.values_mut() {
                p.state = PortState::Forwarding;
            }
        } else {
            for p in inner.ports.values_mut() {
                p.state = PortState::Blocking;
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().unwrap().enabled
    }

    /// Builds the Config BPDU this bridge would transmit out `port` right
    /// now, reflecting its current notion of the root and its distance to
    /// it.
    pub fn build_config_bpdu(&self, port: PortId) -> Result<ConfigBpdu> {
        let inner = self.inner.lock().unwrap();
        let p = inner
            .ports
            .get(&port)
            .ok_or_else(|| SwitchError::NotFound(format!("no such STP port: {port}")))?;
        Ok(ConfigBpdu {
            flags: if inner.topology_change { TC_FLAG } else { 0 },
            root_id: inner.root_id,
            root_path_cost: inner.root_path_cost,
            bridge_id: inner.bridge_id,
            port_id: p.port_id_field(),
            message_age: 0,
            max_age: inner.max_age_secs as u16,
            hello_time: inner.hello_time_secs as u16,
            forward_delay: inner.forward_delay_secs as u16,
        })
    }

    /// Processes a received Config BPDU on `port`. Runs the superior-BPDU
    /// comparison from spec.md §4.6: `(root_id, root_path_cost,
    /// sender_bridge_id, sender_port_id)` ordered lexicographically,
    /// smaller wins. Returns whether this BPDU caused the bridge to adopt a
    /// new root.
    pub fn receive_config_bpdu(&self, port: PortId, bpdu: &ConfigBpdu) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.ports.contains_key(&port) {
            return Err(SwitchError::NotFound(format!("no such STP port: {port}")));
        }

        let candidate_cost = bpdu.root_path_cost
            + inner
                .ports
                .get(&port)
                .map(|p| p.path_cost)
                .unwrap_or(STP_DEFAULT_PATH_COST);

        let is_superior = (bpdu.root_id, candidate_cost, bpdu.bridge_id, bpdu.port_id)
            < (
                inner.root_id,
                inner.root_path_cost,
                inner.bridge_id,
                inner
                    .ports
                    .get(&port)
                    .map(|p| p.port_id_field())
                    .unwrap_or(0),
            );

        if bpdu.root_id < inner.bridge_id || (bpdu.root_id == inner.root_id && is_superior) {
            let adopted_new_root = inner.root_id != bpdu.root_id;
            inner.root_id = bpdu.root_id;
            inner.root_path_cost = candidate_cost;
            inner.root_port = Some(port);
            if let Some(p) = inner.ports.get_mut(&port) {
                p.designated_root = bpdu.root_id;
                p.designated_cost = candidate_cost;
                p.designated_bridge = bpdu.bridge_id;
            }
            if bpdu.topology_change() {
                inner.topology_change = true;
                inner.topology_change_timer_secs =
                    inner.max_age_secs + inner.forward_delay_secs;
            }
            return Ok(adopted_new_root);
        }
        Ok(false)
    }

    /// Advances all per-port forward-delay timers and the topology-change
    /// timer by one driver tick (spec.md §5's single cooperative tick
    /// driver calls this once per second of simulated time).
    pub fn tick(&self, elapsed_secs: u32) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.enabled {
            return;
        }
        let forward_delay_secs = inner.forward_delay_secs;
        for p in inner.ports.values_mut() {
            if p.forward_delay_remaining == 0 {
                continue;
            }
            p.forward_delay_remaining = p.forward_delay_remaining.saturating_sub(elapsed_secs);
            if p.forward_delay_remaining == 0 {
                p.state = match p.state {
                    PortState::Listening => PortState::Learning,
                    PortState::Learning => PortState::Forwarding,
                    other => other,
                };
                if p.state != PortState::Forwarding {
                    p.forward_delay_remaining = forward_delay_secs;
                }
            }
        }
        if inner.topology_change_timer_secs > 0 {
            inner.topology_change_timer_secs =
                inner.topology_change_timer_secs.saturating_sub(elapsed_secs);
            if inner.topology_change_timer_secs == 0 {
                inner.topology_change = false;
            }
        }
    }

    /// Begins the Listening→Learning→Forwarding progression for `port`
    /// (called once link comes up and the port is not immediately
    /// superseded by a better BPDU).
    pub fn begin_forward_transition(&self, port: PortId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let forward_delay = inner.forward_delay_secs;
        let p = inner
            .ports
            .get_mut(&port)
            .ok_or_else(|| SwitchError::NotFound(format!("no such STP port: {port}")))?;
        p.state = PortState::Listening;
        p.forward_delay_remaining = forward_delay;
        Ok(())
    }

    pub fn block_port(&self, port: PortId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let p = inner
            .ports
            .get_mut(&port)
            .ok_or_else(|| SwitchError::NotFound(format!("no such STP port: {port}")))?;
        p.state = PortState::Blocking;
        p.forward_delay_remaining = 0;
        Ok(())
    }

    pub fn topology_change_in_progress(&self) -> bool {
        self.inner.lock().unwrap().topology_change
    }
}
