//! C9 — ARP cache.
//!
//! IPv4-to-MAC resolution state machine keyed by `Ipv4Addr`, grounded the
//! same way as [`crate::mac_table::MacTable`]: a `Mutex<HashMap<..>>` with
//! per-entry timestamps advanced by a cooperative `process_aging`/`tick`
//! call rather than a private timer thread. The state machine itself
//! (Incomplete/Reachable/Stale/Delay/Probe/Failed) follows the neighbor
//! cache lifecycle in RFC 4861 §7.3, adapted to ARP's request/reply wire
//! format instead of Neighbor Solicitation/Advertisement.
//!
//! Sender IP/MAC for outgoing requests are never stored on the cache
//! itself; they must come from the egress interface's configured values
//! in [`crate::port::PortRegistry`], passed in by the caller at encode
//! time, so a request is never sent with a zeroed or stale source.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::{
    ARP_CACHE_TIMEOUT_SEC, ARP_DELAY_FIRST_PROBE_SECS, ARP_REQUEST_RETRY_COUNT,
    ARP_REQUEST_RETRY_INTERVAL_MS, CONFIG_MAX_ARP_ENTRIES,
};
use crate::error::{Result, SwitchError};
use crate::net::{Ipv4Addr, MacAddr, PortId};

pub const WIRE_LEN: usize = 28;
const HARDWARE_TYPE_ETHERNET: u16 = 1;
const PROTOCOL_TYPE_IPV4: u16 = 0x0800;
const OPCODE_REQUEST: u16 = 1;
const OPCODE_REPLY: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    Incomplete,
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: Option<MacAddr>,
    pub port: Option<PortId>,
    pub state: ArpState,
    pub retries: u32,
    pub last_updated_secs: u64,
}

/// A request to transmit, emitted by [`ArpCache::tick`] rather than sent
/// directly, since the cache has no access to a `PortBackend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpTimerEvent {
    pub ip: Ipv4Addr,
    pub port: Option<PortId>,
    pub kind: ArpTimerEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpTimerEventKind {
    SendRequest,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub opcode: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn is_request(&self) -> bool {
        self.opcode == OPCODE_REQUEST
    }

    pub fn is_reply(&self) -> bool {
        self.opcode == OPCODE_REPLY
    }
}

/// Encodes an RFC 826 ARP packet: 2-byte hardware type, 2-byte protocol
/// type, 1-byte address lengths each, 2-byte opcode, then
/// sender-MAC/sender-IP/target-MAC/target-IP (28 bytes total).
pub fn encode(opcode: u16, sender_mac: MacAddr, sender_ip: Ipv4Addr, target_mac: MacAddr, target_ip: Ipv4Addr) -> [u8; WIRE_LEN] {
    let mut out = [0u8; WIRE_LEN];
    out[0..2].copy_from_slice(&HARDWARE_TYPE_ETHERNET.to_be_bytes());
    out[2..4].copy_from_slice(&PROTOCOL_TYPE_IPV4.to_be_bytes());
    out[4] = 6;
    out[5] = 4;
    out[6..8].copy_from_slice(&opcode.to_be_bytes());
    out[8..14].copy_from_slice(sender_mac.as_bytes());
    out[14..18].copy_from_slice(&sender_ip.octets());
    out[18..24].copy_from_slice(target_mac.as_bytes());
    out[24..28].copy_from_slice(&target_ip.octets());
    out
}

pub fn encode_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> [u8; WIRE_LEN] {
    encode(OPCODE_REQUEST, sender_mac, sender_ip, MacAddr::ZERO, target_ip)
}

pub fn encode_reply(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_mac: MacAddr, target_ip: Ipv4Addr) -> [u8; WIRE_LEN] {
    encode(OPCODE_REPLY, sender_mac, sender_ip, target_mac, target_ip)
}

pub fn decode(bytes: &[u8]) -> Result<ArpPacket> {
    if bytes.len() < WIRE_LEN {
        return Err(SwitchError::InvalidPacket(format!(
            "ARP packet too short: {} bytes",
            bytes.len()
        )));
    }
    let hardware_type = u16::from_be_bytes([bytes[0], bytes[1]]);
    let protocol_type = u16::from_be_bytes([bytes[2], bytes[3]]);
    if hardware_type != HARDWARE_TYPE_ETHERNET || protocol_type != PROTOCOL_TYPE_IPV4 {
        return Err(SwitchError::HeaderError(
            "unsupported ARP hardware/protocol type".into(),
        ));
    }
    if bytes[4] != 6 || bytes[5] != 4 {
        return Err(SwitchError::HeaderError(
            "unsupported ARP address lengths".into(),
        ));
    }
    let opcode = u16::from_be_bytes([bytes[6], bytes[7]]);
    if opcode != OPCODE_REQUEST && opcode != OPCODE_REPLY {
        return Err(SwitchError::HeaderError(format!(
            "unsupported ARP opcode {opcode}"
        )));
    }
    let mut sender_mac = [0u8; 6];
    sender_mac.copy_from_slice(&bytes[8..14]);
    let mut target_mac = [0u8; 6];
    target_mac.copy_from_slice(&bytes[18..24]);

    Ok(ArpPacket {
        opcode,
        sender_mac: MacAddr(sender_mac),
        sender_ip: Ipv4Addr::from_octets([bytes[14], bytes[15], bytes[16], bytes[17]]),
        target_mac: MacAddr(target_mac),
        target_ip: Ipv4Addr::from_octets([bytes[24], bytes[25], bytes[26], bytes[27]]),
    })
}

struct Inner {
    entries: HashMap<Ipv4Addr, ArpEntry>,
}

/// Evicts the entry with the smallest `last_updated_secs`, recycling the
/// slot rather than failing the caller with `ResourceExhausted` once the
/// cache is full. Returns whether an entry was evicted.
fn evict_least_recently_updated(inner: &mut Inner) -> bool {
    let Some(oldest_ip) = inner
        .entries
        .values()
        .min_by_key(|e| e.last_updated_secs)
        .map(|e| e.ip)
    else {
        return false;
    };
    inner.entries.remove(&oldest_ip);
    true
}

pub struct ArpCache {
    inner: Mutex<Inner>,
    capacity: usize,
    reachable_timeout_secs: u64,
    retry_interval_secs: u64,
    retry_count: u32,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::with_limits(
            CONFIG_MAX_ARP_ENTRIES,
            ARP_CACHE_TIMEOUT_SEC,
            ARP_REQUEST_RETRY_INTERVAL_MS / 1000,
            ARP_REQUEST_RETRY_COUNT,
        )
    }

    pub fn with_limits(
        capacity: usize,
        reachable_timeout_secs: u64,
        retry_interval_secs: u64,
        retry_count: u32,
    ) -> Self {
        ArpCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
            }),
            capacity,
            reachable_timeout_secs,
            retry_interval_secs: retry_interval_secs.max(1),
            retry_count,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<ArpEntry> {
        self.inner.lock().unwrap().entries.get(&ip).copied()
    }

    /// Resolves `ip` for immediate use. `Reachable` and `Stale` entries
    /// both return their MAC (Stale transitions to `Delay` on first use,
    /// per RFC 4861 §7.3.3); `Incomplete`/`Probe`/`Failed`/unknown return
    /// `None` and the caller should call [`Self::begin_resolution`].
    pub fn resolve(&self, ip: Ipv4Addr, now_secs: u64) -> Option<(MacAddr, Option<PortId>)> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.entries.get_mut(&ip)?;
        match entry.state {
            ArpState::Reachable => entry.mac.map(|mac| (mac, entry.port)),
            ArpState::Stale => {
                let result = entry.mac.map(|mac| (mac, entry.port));
                entry.state = ArpState::Delay;
                entry.last_updated_secs = now_secs;
                result
            }
            ArpState::Delay => entry.mac.map(|mac| (mac, entry.port)),
            _ => None,
        }
    }

    /// Starts (or restarts) resolution for `ip`, creating an `Incomplete`
    /// entry if none exists. No-op if an entry already exists and is not
    /// `Failed`. When the cache is full, the least-recently-updated entry
    /// is recycled to make room rather than failing the caller.
    pub fn begin_resolution(&self, ip: Ipv4Addr, now_secs: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get(&ip) {
            if entry.state != ArpState::Failed {
                return Ok(());
            }
        } else if inner.entries.len() >= self.capacity && !evict_least_recently_updated(&mut inner)
        {
            return Err(SwitchError::ResourceExhausted("ARP cache full".into()));
        }
        inner.entries.insert(
            ip,
            ArpEntry {
                ip,
                mac: None,
                port: None,
                state: ArpState::Incomplete,
                retries: 0,
                last_updated_secs: now_secs,
            },
        );
        Ok(())
    }

    /// Installs a reply (or a gratuitous ARP / learned binding): the entry
    /// becomes `Reachable` regardless of its prior state. When the cache is
    /// full, the least-recently-updated entry is recycled to make room
    /// rather than failing the caller.
    pub fn handle_reply(&self, ip: Ipv4Addr, mac: MacAddr, port: PortId, now_secs: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(&ip)
            && inner.entries.len() >= self.capacity
            && !evict_least_recently_updated(&mut inner)
        {
            return Err(SwitchError::ResourceExhausted("ARP cache full".into()));
        }
        inner.entries.insert(
            ip,
            ArpEntry {
                ip,
                mac: Some(mac),
                port: Some(port),
                state: ArpState::Reachable,
                retries: 0,
                last_updated_secs: now_secs,
            },
        );
        Ok(())
    }

    pub fn delete(&self, ip: Ipv4Addr) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entries
            .remove(&ip)
            .map(|_| ())
            .ok_or_else(|| SwitchError::NotFound(format!("no ARP entry for {ip}")))
    }

    pub fn iter_all(&self) -> Vec<ArpEntry> {
        self.inner.lock().unwrap().entries.values().copied().collect()
    }

    /// Advances every entry's timer against `now_secs` and returns the
    /// transmit/removal events the caller (the core's tick driver) should
    /// act on. `Incomplete` entries retransmit a broadcast request until
    /// `retry_count` is exhausted, then become `Failed`. `Reachable`
    /// entries age into `Stale`. `Delay` entries age into `Probe` after
    /// [`crate::config::ARP_DELAY_FIRST_PROBE_SECS`] and send a unicast
    /// probe; `Probe` entries behave like `Incomplete` but unicast to the
    /// last known MAC instead of broadcasting. `Failed` entries are
    /// removed outright.
    pub fn tick(&self, now_secs: u64) -> Vec<ArpTimerEvent> {
        let mut inner = self.inner.lock().unwrap();
        let mut events = Vec::new();
        let mut to_remove = Vec::new();

        for entry in inner.entries.values_mut() {
            let elapsed = now_secs.saturating_sub(entry.last_updated_secs);
            match entry.state {
                ArpState::Incomplete | ArpState::Probe => {
                    if elapsed >= self.retry_interval_secs {
                        if entry.retries >= self.retry_count {
                            entry.state = ArpState::Failed;
                            events.push(ArpTimerEvent {
                                ip: entry.ip,
                                port: entry.port,
                                kind: ArpTimerEventKind::Expired,
                            });
                            to_remove.push(entry.ip);
                        } else {
                            entry.retries += 1;
                            entry.last_updated_secs = now_secs;
                            events.push(ArpTimerEvent {
                                ip: entry.ip,
                                port: entry.port,
                                kind: ArpTimerEventKind::SendRequest,
                            });
                        }
                    }
                }
                ArpState::Reachable => {
                    if elapsed >= self.reachable_timeout_secs {
                        entry.state = ArpState::Stale;
                    }
                }
                ArpState::Delay => {
                    if elapsed >= ARP_DELAY_FIRST_PROBE_SECS {
                        entry.state = ArpState::Probe;
                        entry.retries = 0;
                        entry.last_updated_secs = now_secs;
                        events.push(ArpTimerEvent {
                            ip: entry.ip,
                            port: entry.port,
                            kind: ArpTimerEventKind::SendRequest,
                        });
                    }
                }
                ArpState::Stale | ArpState::Failed => {}
            }
        }

        for ip in to_remove {
            inner.entries.remove(&ip);
        }
        events
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, n)
    }

    fn mac(n: u8) -> MacAddr {
        MacAddr([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn wire_round_trip_request() {
        let bytes = encode_request(mac(1), ip(1), ip(2));
        let pkt = decode(&bytes).unwrap();
        assert!(pkt.is_request());
        assert_eq!(pkt.sender_mac, mac(1));
        assert_eq!(pkt.sender_ip, ip(1));
        assert_eq!(pkt.target_ip, ip(2));
    }

    #[test]
    fn wire_round_trip_reply() {
        let bytes = encode_reply(mac(2), ip(2), mac(1), ip(1));
        let pkt = decode(&bytes).unwrap();
        assert!(pkt.is_reply());
        assert_eq!(pkt.target_mac, mac(1));
    }

    #[test]
    fn decode_rejects_truncated_packet() {
        assert!(decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn begin_resolution_creates_incomplete_entry() {
        let cache = ArpCache::with_limits(16, 300, 1, 3);
        cache.begin_resolution(ip(1), 0).unwrap();
        let entry = cache.lookup(ip(1)).unwrap();
        assert_eq!(entry.state, ArpState::Incomplete);
        assert!(cache.resolve(ip(1), 0).is_none());
    }

    #[test]
    fn reply_makes_entry_reachable_and_resolvable() {
        let cache = ArpCache::with_limits(16, 300, 1, 3);
        cache.begin_resolution(ip(1), 0).unwrap();
        cache.handle_reply(ip(1), mac(9), PortId::new(1), 1).unwrap();
        let (mac_out, port_out) = cache.resolve(ip(1), 1).unwrap();
        assert_eq!(mac_out, mac(9));
        assert_eq!(port_out, Some(PortId::new(1)));
    }

    #[test]
    fn incomplete_entry_retries_then_fails() {
        let cache = ArpCache::with_limits(16, 300, 1, 2);
        cache.begin_resolution(ip(1), 0).unwrap();

        let first = cache.tick(1);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, ArpTimerEventKind::SendRequest);

        let second = cache.tick(2);
        assert_eq!(second[0].kind, ArpTimerEventKind::SendRequest);

        let third = cache.tick(3);
        assert_eq!(third[0].kind, ArpTimerEventKind::Expired);
        assert!(cache.lookup(ip(1)).is_none());
    }

    #[test]
    fn reachable_entry_ages_into_stale() {
        let cache = ArpCache::with_limits(16, 10, 1, 3);
        cache.handle_reply(ip(1), mac(9), PortId::new(1), 0).unwrap();
        cache.tick(11);
        assert_eq!(cache.lookup(ip(1)).unwrap().state, ArpState::Stale);
    }

    #[test]
    fn using_a_stale_entry_moves_it_to_delay_then_probe() {
        let cache = ArpCache::with_limits(16, 10, 1, 3);
        cache.handle_reply(ip(1), mac(9), PortId::new(1), 0).unwrap();
        cache.tick(11);
        assert_eq!(cache.lookup(ip(1)).unwrap().state, ArpState::Stale);

        let resolved = cache.resolve(ip(1), 11);
        assert!(resolved.is_some());
        assert_eq!(cache.lookup(ip(1)).unwrap().state, ArpState::Delay);

        let events = cache.tick(11 + ARP_DELAY_FIRST_PROBE_SECS);
        assert_eq!(events[0].kind, ArpTimerEventKind::SendRequest);
        assert_eq!(cache.lookup(ip(1)).unwrap().state, ArpState::Probe);
    }

    #[test]
    fn full_cache_recycles_the_least_recently_updated_entry_on_begin_resolution() {
        let cache = ArpCache::with_limits(1, 300, 1, 3);
        cache.begin_resolution(ip(1), 0).unwrap();
        cache.begin_resolution(ip(2), 10).unwrap();
        assert!(cache.lookup(ip(1)).is_none());
        assert!(cache.lookup(ip(2)).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn full_cache_recycles_the_least_recently_updated_entry_on_handle_reply() {
        let cache = ArpCache::with_limits(2, 300, 1, 3);
        cache.handle_reply(ip(1), mac(1), PortId::new(1), 0).unwrap();
        cache.handle_reply(ip(2), mac(2), PortId::new(1), 5).unwrap();
        cache.handle_reply(ip(3), mac(3), PortId::new(1), 10).unwrap();
        assert!(cache.lookup(ip(1)).is_none());
        assert!(cache.lookup(ip(2)).is_some());
        assert!(cache.lookup(ip(3)).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn delete_unknown_entry_is_not_found() {
        let cache = ArpCache::with_limits(16, 300, 1, 3);
        assert!(matches!(cache.delete(ip(9)), Err(SwitchError::NotFound(_))));
    }
}
