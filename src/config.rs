//! Centralized runtime constants for the switch core.
//!
//! Every tunable size, timeout, and default from spec.md §6 is collected
//! here so it can be found and adjusted in a single place rather than
//! scattered across engine modules.

/// Maximum packet size any `PacketBuffer` may hold (bytes), spec.md §4.1/§6.
pub const MAX_PACKET_SIZE: usize = 9216;

/// Minimum Ethernet frame size enforced at ingress when hardware
/// simulation is enabled (bytes), spec.md §8.
pub const ETH_MIN_FRAME_SIZE: usize = 60;

/// Default physical port count if the backend does not override it.
pub const MAX_PORTS: u16 = 64;

/// Default port count used when constructing a `Core` without an explicit
/// backend-reported count.
pub const CONFIG_DEFAULT_PORT_COUNT: u16 = 128;

/// Maximum configured VLAN id (VLANs are numbered 1..=this).
pub const CONFIG_MAX_VLANS: u16 = 4094;

/// VLAN assigned to a port's untagged traffic unless configured otherwise.
pub const CONFIG_DEFAULT_VLAN_ID: u16 = 1;

/// Maximum number of `(mac, vlan)` entries the MAC table may hold.
pub const CONFIG_MAX_MAC_TABLE_ENTRIES: usize = 65536;

/// Default dynamic MAC aging time in seconds; 0 disables aging.
pub const CONFIG_DEFAULT_MAC_AGING_TIME: u64 = 300;

/// Maximum number of routes (summed across families) the routing table
/// may hold.
pub const CONFIG_MAX_ROUTING_ENTRIES: usize = 16384;

/// Maximum number of entries the ARP cache may hold.
pub const CONFIG_MAX_ARP_ENTRIES: usize = 8192;
/// Same cap expressed the way spec.md §4.9 names it.
pub const ARP_CACHE_SIZE: usize = CONFIG_MAX_ARP_ENTRIES;

/// Default ARP reachable-entry aging time in seconds.
pub const CONFIG_DEFAULT_ARP_AGING_TIME: u64 = 1200;
/// Same constant under the §4.9 name.
pub const ARP_CACHE_TIMEOUT_SEC: u64 = CONFIG_DEFAULT_ARP_AGING_TIME;

/// Interval between ARP request retries for an Incomplete entry (ms).
pub const ARP_REQUEST_RETRY_INTERVAL_MS: u64 = 1000;
/// Number of retries before an Incomplete entry is marked Failed.
pub const ARP_REQUEST_RETRY_COUNT: u32 = 3;

/// How long a Stale entry may be used before the first unicast probe is
/// sent once traffic touches it (seconds).
pub const ARP_DELAY_FIRST_PROBE_SECS: u64 = 5;

/// Largest MTU a port may be configured with.
pub const CONFIG_MAX_MTU: u32 = 9216;
/// Default per-port MTU.
pub const CONFIG_DEFAULT_MTU: u32 = 1500;

/// Maximum number of concurrently in-flight fragment reassembly contexts.
pub const CONFIG_MAX_IP_FRAGMENTS: usize = 64;
/// Maximum number of fragments accepted into a single context.
pub const MAX_FRAGMENTS: usize = CONFIG_MAX_IP_FRAGMENTS;
/// How long a fragment reassembly context may sit incomplete before it is
/// expired and its fragments dropped (seconds).
pub const CONFIG_IP_FRAGMENT_TIMEOUT: u64 = 30;
/// Same constant under the §3 name.
pub const FRAGMENT_REASSEMBLY_TIMEOUT_SECS: u64 = CONFIG_IP_FRAGMENT_TIMEOUT;

/// Minimum TTL/hop-limit after decrement for a packet to still be
/// forwardable; below this the packet is dropped with `TtlExceeded`.
pub const TTL_THRESHOLD: u8 = 1;

/// Maximum depth of processor-pipeline recirculation before a packet is
/// dropped (spec.md §4.3/§9).
pub const MAX_RECIRCULATION_DEPTH: u32 = 16;

/// Default STP bridge priority (multiple of 4096).
pub const STP_DEFAULT_BRIDGE_PRIORITY: u16 = 32768;
/// Default STP port priority.
pub const STP_DEFAULT_PORT_PRIORITY: u8 = 128;
/// Default STP path cost for a port (100 Mb/s reference cost).
pub const STP_DEFAULT_PATH_COST: u32 = 19;
/// Default STP hello timer (seconds).
pub const STP_DEFAULT_HELLO_TIME_SECS: u32 = 2;
/// Default STP max-age timer (seconds).
pub const STP_DEFAULT_MAX_AGE_SECS: u32 = 20;
/// Default STP forward-delay timer (seconds).
pub const STP_DEFAULT_FORWARD_DELAY_SECS: u32 = 15;

/// Feature toggles from spec.md §6's "configuration surface". All default
/// to the switch's historical behavior: STP and hardware-simulation on,
/// the IP-routing-protocol and QoS overlays off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeatureFlags {
    pub ipv6: bool,
    pub ospf: bool,
    pub rip: bool,
    pub stp: bool,
    pub qos: bool,
    pub hardware_simulation: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            ipv6: true,
            ospf: false,
            rip: false,
            stp: true,
            qos: false,
            hardware_simulation: true,
        }
    }
}
