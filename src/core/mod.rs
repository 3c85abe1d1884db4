//! C11 — the switch core: owns every engine and wires them into an
//! ingress/egress packet path plus a cooperative tick driver.
//!
//! Every method that needs more than one engine's lock takes them in the
//! fixed order from spec.md §5 to avoid deadlock: Port Registry, VLAN, MAC
//! Table, STP, Routing, ARP. No method here ever holds two engine locks at
//! once across a blocking call, so the order only matters for readers
//! reasoning about the code, not for a runtime lock-ordering check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::arp::{self, ArpCache, ArpTimerEventKind};
use crate::backend::PortBackend;
use crate::buffer::{Direction, PacketBuffer};
use crate::error::{Result, SwitchError};
use crate::ip::fragment::{Endpoints, FragmentKey, FragmentReassembler};
use crate::ip::v4;
use crate::mac_table::MacTable;
use crate::net::{EtherType, EtherTypes, Ipv4Addr, MacAddr, PortId, VlanId};
use crate::pipeline::Pipeline;
use crate::port::PortRegistry;
use crate::routing::{NextHop, RoutingTable};
use crate::stats::{CoreStats, PortStats};
use crate::stp::{PortState, StpEngine};
use crate::vlan::VlanEngine;

const ETH_HEADER_LEN: usize = 14;

/// Owns every engine for one simulated switch instance.
pub struct Core {
    pub ports: PortRegistry,
    pub vlan: VlanEngine,
    pub mac_table: MacTable,
    pub stp: StpEngine,
    pub routing: RoutingTable,
    pub arp: ArpCache,
    pipeline: Pipeline,
    fragments: FragmentReassembler,
    /// IPv4 address the switch itself answers ARP for and sources ARP
    /// requests from on a given port, when that port is configured as an
    /// L3 interface. Not an engine of its own: spec.md's Port Registry
    /// (C2) owns link-layer identity only, so this small table is the
    /// narrowest place the ARP requester's "who am I" binding can live
    /// without inventing a whole extra interface-config module.
    interface_ipv4: Mutex<HashMap<PortId, Ipv4Addr>>,
    backend: Arc<dyn PortBackend>,
}

impl Core {
    pub fn new(backend: Arc<dyn PortBackend>, base_mac: MacAddr) -> Result<Self> {
        let port_count = backend.declared_port_count();
        let ports = PortRegistry::new(port_count, base_mac)?;
        let stp = StpEngine::new(base_mac);
        for port in ports.all_port_ids() {
            stp.add_port(port);
        }
        Ok(Core {
            ports,
            vlan: VlanEngine::new(),
            mac_table: MacTable::new(),
            stp,
            routing: RoutingTable::new(),
            arp: ArpCache::new(),
            pipeline: Pipeline::new(),
            fragments: FragmentReassembler::new(),
            interface_ipv4: Mutex::new(HashMap::new()),
            backend,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn set_interface_ipv4(&self, port: PortId, addr: Ipv4Addr) -> Result<()> {
        if !self.ports.is_valid(port) {
            return Err(SwitchError::NotFound(format!("no such port: {port}")));
        }
        self.interface_ipv4.lock().unwrap().insert(port, addr);
        Ok(())
    }

    pub fn interface_ipv4(&self, port: PortId) -> Option<Ipv4Addr> {
        self.interface_ipv4.lock().unwrap().get(&port).copied()
    }

    /// Processes one frame arriving on `port`. Covers VLAN classification,
    /// the processor pipeline, spanning-tree gating, MAC learning, L2
    /// forwarding/flooding, and — when the frame is addressed to this
    /// switch's own port MAC — IPv4 routing.
    pub fn ingress(&self, port: PortId, frame: &[u8]) -> Result<()> {
        self.ports.require_up(port)?;

        let mut buf = PacketBuffer::from_bytes(frame)?;
        buf.metadata.port = port;
        buf.metadata.direction = Direction::Rx;
        buf.metadata.timestamp_us = self.backend.now_us();

        if buf.len() < ETH_HEADER_LEN {
            return Err(SwitchError::InvalidPacket("frame shorter than an ethernet header".into()));
        }
        let mut dst = [0u8; 6];
        buf.peek(0, 6, &mut dst)?;
        let mut src = [0u8; 6];
        buf.peek(6, 6, &mut src)?;
        let mut eth = [0u8; 2];
        buf.peek(12, 2, &mut eth)?;
        buf.metadata.dst_mac = MacAddr(dst);
        buf.metadata.src_mac = MacAddr(src);
        buf.metadata.ethertype = EtherType::new(u16::from_be_bytes(eth));

        let vlan = self.vlan.ingress(port, &mut buf)?;

        match self.pipeline.run_default(&mut buf)? {
            crate::pipeline::Verdict::Drop | crate::pipeline::Verdict::Consume => return Ok(()),
            _ => {}
        }

        let stp_state = self.stp.port_state(port).unwrap_or(PortState::Forwarding);
        if stp_state.learns_macs() {
            let now = self.backend.now_seconds();
            if let Some(mv) = self.mac_table.learn(buf.metadata.src_mac, vlan, port, now)? {
                let crate::mac_table::MoveEvent { mac, old_port, new_port, .. } = mv;
                tracing::debug!(%mac, %old_port, %new_port, "mac moved ports");
            }
        }
        if !stp_state.forwards_data() {
            return Ok(());
        }

        let own_mac = self.ports.get_mac(port)?;
        if buf.metadata.dst_mac == own_mac && buf.metadata.ethertype == EtherTypes::Ipv4 {
            return self.route_ipv4(port, &mut buf);
        }
        if buf.metadata.ethertype == EtherTypes::Arp {
            self.handle_arp(port, &buf)?;
        }

        self.switch_packet(port, vlan, &buf)
    }

    fn handle_arp(&self, port: PortId, buf: &PacketBuffer) -> Result<()> {
        if buf.len() < ETH_HEADER_LEN + arp::WIRE_LEN {
            return Err(SwitchError::InvalidPacket("truncated ARP frame".into()));
        }
        let payload = &buf.as_slice()[ETH_HEADER_LEN..];
        let pkt = arp::decode(payload)?;
        let now = self.backend.now_seconds();
        self.arp.handle_reply(pkt.sender_ip, pkt.sender_mac, port, now)?;

        if pkt.is_request() {
            if let Some(my_ip) = self.interface_ipv4(port) {
                if pkt.target_ip == my_ip {
                    let my_mac = self.ports.get_mac(port)?;
                    let reply = arp::encode_reply(my_mac, my_ip, pkt.sender_mac, pkt.sender_ip);
                    let mut frame = Vec::with_capacity(ETH_HEADER_LEN + arp::WIRE_LEN);
                    frame.extend_from_slice(pkt.sender_mac.as_bytes());
                    frame.extend_from_slice(my_mac.as_bytes());
                    frame.extend_from_slice(&EtherTypes::Arp.0.to_be_bytes());
                    frame.extend_from_slice(&reply);
                    self.backend.transmit(port, &frame)?;
                }
            }
        }
        Ok(())
    }

    fn switch_packet(&self, ingress_port: PortId, vlan: VlanId, buf: &PacketBuffer) -> Result<()> {
        let dst = buf.metadata.dst_mac;
        if dst.is_multicast() {
            return self.flood(ingress_port, vlan, buf);
        }
        match self.mac_table.get_port(dst, vlan) {
            Ok(out_port) if out_port != ingress_port && self.is_forwarding_member(out_port, vlan) => {
                self.transmit_tagged(out_port, vlan, buf)
            }
            _ => self.flood(ingress_port, vlan, buf),
        }
    }

    fn is_forwarding_member(&self, port: PortId, vlan: VlanId) -> bool {
        self.ports.is_forwarding_eligible(port).unwrap_or(false)
            && self.vlan.is_member(port, vlan)
            && self.stp.port_state(port).map(|s| s.forwards_data()).unwrap_or(true)
    }

    fn flood(&self, ingress_port: PortId, vlan: VlanId, buf: &PacketBuffer) -> Result<()> {
        for port in self.ports.all_port_ids() {
            if port == ingress_port {
                continue;
            }
            if !self.is_forwarding_member(port, vlan) {
                continue;
            }
            self.transmit_tagged(port, vlan, buf)?;
        }
        Ok(())
    }

    fn transmit_tagged(&self, port: PortId, vlan: VlanId, buf: &PacketBuffer) -> Result<()> {
        let mut out = buf.clone_packet();
        self.vlan.egress(port, vlan, &mut out)?;
        self.backend.transmit(port, out.as_slice())
    }

    /// Routes one IPv4 datagram addressed to this switch. Handles
    /// fragment reassembly before the forwarding decision: a fragment that
    /// does not complete a datagram is queued and this call returns
    /// `Ok(())` without transmitting anything.
    fn route_ipv4(&self, ingress_port: PortId, buf: &mut PacketBuffer) -> Result<()> {
        let mut eth_header = [0u8; ETH_HEADER_LEN];
        buf.peek(0, ETH_HEADER_LEN, &mut eth_header)?;
        let ip_buf = PacketBuffer::from_bytes(&buf.as_slice()[ETH_HEADER_LEN..])?;
        let hdr = v4::parse(&ip_buf)?;

        if hdr.more_fragments() || hdr.fragment_offset_bytes() > 0 {
            let header_len = hdr.header_len();
            let mut payload = vec![0u8; ip_buf.len() - header_len];
            ip_buf.peek(header_len, payload.len(), &mut payload)?;
            let key = FragmentKey {
                endpoints: Endpoints::V4(hdr.src, hdr.dst),
                identification: hdr.identification as u32,
                protocol: hdr.protocol,
            };
            let now = self.backend.now_seconds();
            let assembled =
                self.fragments
                    .insert_fragment(key, hdr.fragment_offset_bytes() as usize, &payload, hdr.more_fragments(), now)?;
            let Some(full_payload) = assembled else {
                return Ok(());
            };

            let mut full_header = vec![0u8; header_len];
            ip_buf.peek(0, header_len, &mut full_header)?;
            let total_length = (header_len + full_payload.len()) as u16;
            full_header[2..4].copy_from_slice(&total_length.to_be_bytes());
            full_header[6] = 0;
            full_header[7] = 0;
            full_header[10..12].copy_from_slice(&[0, 0]);
            let checksum = v4::checksum(&full_header);
            full_header[10..12].copy_from_slice(&checksum.to_be_bytes());

            let mut rebuilt = PacketBuffer::allocate(header_len + full_payload.len())?;
            rebuilt.append(&full_header)?;
            rebuilt.append(&full_payload)?;
            return self.forward_ipv4_datagram(ingress_port, eth_header, rebuilt);
        }

        self.forward_ipv4_datagram(ingress_port, eth_header, ip_buf)
    }

    fn forward_ipv4_datagram(
        &self,
        _ingress_port: PortId,
        eth_header: [u8; ETH_HEADER_LEN],
        mut ip_buf: PacketBuffer,
    ) -> Result<()> {
        v4::decrement_ttl_and_rewrite_checksum(&mut ip_buf)?;
        let hdr = v4::parse(&ip_buf)?;

        let route = self.routing.lookup_v4(hdr.dst)?;
        let resolve_target = match route.next_hop {
            NextHop::Direct => hdr.dst,
            NextHop::V4(gateway) => gateway,
            NextHop::V6(_) => {
                return Err(SwitchError::Internal("IPv6 next hop on an IPv4 route".into()))
            }
        };

        let now = self.backend.now_seconds();
        let Some((next_hop_mac, _)) = self.arp.resolve(resolve_target, now) else {
            self.arp.begin_resolution(resolve_target, now)?;
            return Ok(());
        };

        self.ports.require_up(route.out_port)?;
        let out_mac = self.ports.get_mac(route.out_port)?;
        let egress_mtu = self.ports.mtu(route.out_port)? as usize;

        if ip_buf.len() > egress_mtu {
            if hdr.dont_fragment() {
                return Err(SwitchError::FragmentationNeeded);
            }
            for fragment in v4::fragment_for_egress(&ip_buf, egress_mtu)? {
                let mut frame = Vec::with_capacity(ETH_HEADER_LEN + fragment.len());
                frame.extend_from_slice(next_hop_mac.as_bytes());
                frame.extend_from_slice(out_mac.as_bytes());
                frame.extend_from_slice(&eth_header[12..14]);
                frame.extend_from_slice(&fragment);
                self.backend.transmit(route.out_port, &frame)?;
            }
            return Ok(());
        }

        let mut frame = Vec::with_capacity(ETH_HEADER_LEN + ip_buf.len());
        frame.extend_from_slice(next_hop_mac.as_bytes());
        frame.extend_from_slice(out_mac.as_bytes());
        frame.extend_from_slice(&eth_header[12..14]);
        frame.extend_from_slice(ip_buf.as_slice());
        self.backend.transmit(route.out_port, &frame)
    }

    /// Drives every engine's periodic work: MAC aging, STP timers,
    /// fragment-context aging, and ARP retry/probe transmission. Called
    /// once per simulated second by whatever owns this `Core` (a
    /// background thread in a real deployment, a test loop in a scenario
    /// test).
    pub fn tick(&self, elapsed_secs: u32) {
        let now_secs = self.backend.now_seconds();
        self.mac_table.process_aging(now_secs);
        self.stp.tick(elapsed_secs);
        self.fragments.process_aging(now_secs);

        for event in self.arp.tick(now_secs) {
            if event.kind != ArpTimerEventKind::SendRequest {
                continue;
            }
            let Some(port) = event.port else { continue };
            let Some(sender_ip) = self.interface_ipv4(port) else {
                continue;
            };
            let Ok(sender_mac) = self.ports.get_mac(port) else {
                continue;
            };
            let payload = arp::encode_request(sender_mac, sender_ip, event.ip);
            let mut frame = Vec::with_capacity(ETH_HEADER_LEN + arp::WIRE_LEN);
            frame.extend_from_slice(MacAddr::BROADCAST.as_bytes());
            frame.extend_from_slice(sender_mac.as_bytes());
            frame.extend_from_slice(&EtherTypes::Arp.0.to_be_bytes());
            frame.extend_from_slice(&payload);
            let _ = self.backend.transmit(port, &frame);
        }
    }

    pub fn stats(&self) -> CoreStats {
        let ports = self
            .ports
            .all_port_ids()
            .into_iter()
            .map(|port| {
                let info = self.ports.get_info(port).unwrap();
                PortStats {
                    port,
                    admin_up: info.admin_state == crate::port::AdminState::Up,
                    oper_up: info.oper_state == crate::port::OperState::Up,
                    stp_state: format!("{:?}", self.stp.port_state(port).unwrap_or(PortState::Forwarding)),
                }
            })
            .collect();

        CoreStats {
            port_count: self.ports.count(),
            ports,
            mac_table_entries: self.mac_table.len(),
            vlan_count: self.vlan.vlan_count(),
            stp_root: self.stp.root_id(),
            is_root_bridge: self.stp.is_root_bridge(),
            routing_entries: self.routing.len(),
            arp_entries: self.arp.len(),
            fragment_contexts: self.fragments.context_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimBackend;
    use crate::config::STP_DEFAULT_FORWARD_DELAY_SECS;
    use crate::port::{AdminState, OperState};

    /// Brings every port admin/oper up and drives STP's
    /// Listening→Learning→Forwarding progression to completion so scenario
    /// tests exercise steady-state forwarding rather than the bring-up
    /// transient.
    fn up_all_ports(core: &Core) {
        for port in core.ports.all_port_ids() {
            core.ports.set_admin_state(port, AdminState::Up).unwrap();
            core.ports.set_oper_state(port, OperState::Up).unwrap();
            core.stp.begin_forward_transition(port).unwrap();
        }
        core.stp.tick(STP_DEFAULT_FORWARD_DELAY_SECS);
        core.stp.tick(STP_DEFAULT_FORWARD_DELAY_SECS);
    }

    fn frame(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(dst.as_bytes());
        f.extend_from_slice(src.as_bytes());
        f.extend_from_slice(&ethertype.to_be_bytes());
        f.extend_from_slice(payload);
        f
    }

    fn core_with_ports(n: u16) -> (Core, Arc<SimBackend>) {
        let backend = Arc::new(SimBackend::new(n));
        let core = Core::new(backend.clone(), MacAddr([0x02, 0, 0, 0, 0, 0])).unwrap();
        up_all_ports(&core);
        (core, backend)
    }

    #[test]
    fn learns_source_and_floods_unknown_destination() {
        let (core, backend) = core_with_ports(3);
        let host_a = MacAddr([0, 0, 0, 0, 0, 1]);
        let unknown = MacAddr([0, 0, 0, 0, 0, 9]);
        let f = frame(unknown, host_a, 0x0800, &[0; 20]);
        core.ingress(PortId::new(0), &f).unwrap();

        let transmitted = backend.drain_transmitted();
        assert_eq!(transmitted.len(), 2);
        assert!(core.mac_table.lookup(host_a, VlanId::DEFAULT_VLAN).is_some());
    }

    #[test]
    fn forwards_to_learned_port_instead_of_flooding() {
        let (core, backend) = core_with_ports(3);
        let host_a = MacAddr([0, 0, 0, 0, 0, 1]);
        let host_b = MacAddr([0, 0, 0, 0, 0, 2]);

        core.ingress(PortId::new(1), &frame(MacAddr::BROADCAST, host_b, 0x0800, &[0; 10])).unwrap();
        backend.drain_transmitted();

        core.ingress(PortId::new(0), &frame(host_b, host_a, 0x0800, &[0; 10])).unwrap();
        let transmitted = backend.drain_transmitted();
        assert_eq!(transmitted, vec![(PortId::new(1), frame(host_b, host_a, 0x0800, &[0; 10]))]);
    }

    #[test]
    fn vlan_isolation_keeps_floods_within_the_same_vlan() {
        let (core, backend) = core_with_ports(3);
        core.vlan.add_port_to_vlan(PortId::new(2), VlanId::new(20)).unwrap();
        let mut cfg = core.vlan.get_port_config(PortId::new(2));
        cfg.pvid = VlanId::new(20);
        cfg.member_vlans = vec![VlanId::new(20)];
        core.vlan.set_port_config(PortId::new(2), cfg).unwrap();

        let host_a = MacAddr([0, 0, 0, 0, 0, 1]);
        core.ingress(PortId::new(0), &frame(MacAddr::BROADCAST, host_a, 0x0800, &[0; 4])).unwrap();
        let transmitted = backend.drain_transmitted();
        // port 2 is in VLAN 20, port 0's default VLAN 1 flood must not reach it.
        assert!(transmitted.iter().all(|(p, _)| *p != PortId::new(2)));
    }

    #[test]
    fn stp_blocking_port_neither_learns_nor_forwards() {
        let (core, backend) = core_with_ports(2);
        core.stp.block_port(PortId::new(0)).unwrap();
        let host_a = MacAddr([0, 0, 0, 0, 0, 1]);
        core.ingress(PortId::new(0), &frame(MacAddr::BROADCAST, host_a, 0x0800, &[0; 4])).unwrap();
        assert!(backend.drain_transmitted().is_empty());
        assert!(core.mac_table.lookup(host_a, VlanId::DEFAULT_VLAN).is_none());
    }

    #[test]
    fn arp_request_to_configured_interface_gets_a_reply() {
        let (core, backend) = core_with_ports(2);
        let my_ip = Ipv4Addr::new(10, 0, 0, 1);
        core.set_interface_ipv4(PortId::new(0), my_ip).unwrap();
        let requester_mac = MacAddr([0, 0, 0, 0, 0, 5]);
        let requester_ip = Ipv4Addr::new(10, 0, 0, 5);
        let payload = arp::encode_request(requester_mac, requester_ip, my_ip);
        let f = frame(MacAddr::BROADCAST, requester_mac, 0x0806, &payload);

        core.ingress(PortId::new(0), &f).unwrap();
        let transmitted = backend.drain_transmitted();
        let reply = transmitted
            .iter()
            .find(|(_, bytes)| arp::decode(&bytes[ETH_HEADER_LEN..]).map(|p| p.is_reply()).unwrap_or(false))
            .expect("expected an ARP reply");
        let decoded = arp::decode(&reply.1[ETH_HEADER_LEN..]).unwrap();
        assert_eq!(decoded.sender_ip, my_ip);
        assert_eq!(decoded.target_ip, requester_ip);
    }

    #[test]
    fn ttl_exceeded_packet_addressed_to_the_switch_is_dropped() {
        let (core, backend) = core_with_ports(2);
        let own_mac = core.ports.get_mac(PortId::new(0)).unwrap();
        let mut ip_hdr = vec![0u8; v4::MIN_HEADER_LEN];
        ip_hdr[0] = 0x45;
        ip_hdr[2..4].copy_from_slice(&(v4::MIN_HEADER_LEN as u16).to_be_bytes());
        ip_hdr[8] = 1; // ttl at threshold
        ip_hdr[12..16].copy_from_slice(&[10, 0, 0, 5]);
        ip_hdr[16..20].copy_from_slice(&[10, 0, 0, 9]);
        let checksum = v4::checksum(&ip_hdr);
        ip_hdr[10..12].copy_from_slice(&checksum.to_be_bytes());

        let f = frame(own_mac, MacAddr([0, 0, 0, 0, 0, 5]), 0x0800, &ip_hdr);
        assert!(matches!(
            core.ingress(PortId::new(0), &f),
            Err(SwitchError::TtlExceeded)
        ));
        assert!(backend.drain_transmitted().is_empty());
    }

    #[test]
    fn routed_datagram_larger_than_egress_mtu_is_fragmented_on_8_byte_boundaries() {
        use crate::routing::{NextHop, Prefix4, RouteEntry};

        let (core, backend) = core_with_ports(2);
        let dst_ip = Ipv4Addr::new(10, 0, 1, 5);
        core.routing
            .add_v4(
                Prefix4 { addr: Ipv4Addr::new(10, 0, 1, 0), len: 24 },
                RouteEntry {
                    next_hop: NextHop::Direct,
                    out_port: PortId::new(1),
                    admin_distance: 1,
                    metric: 0,
                    installed_secs: 0,
                },
            )
            .unwrap();
        core.ports.set_mtu(PortId::new(1), (v4::MIN_HEADER_LEN + 40) as u32).unwrap();
        let next_hop_mac = MacAddr([0, 0, 0, 0, 0, 0x77]);
        core.arp.handle_reply(dst_ip, next_hop_mac, PortId::new(1), 0).unwrap();

        let own_mac = core.ports.get_mac(PortId::new(0)).unwrap();
        let payload = vec![0xabu8; 100];
        let mut ip_hdr = vec![0u8; v4::MIN_HEADER_LEN];
        ip_hdr[0] = 0x45;
        ip_hdr[2..4].copy_from_slice(&((v4::MIN_HEADER_LEN + payload.len()) as u16).to_be_bytes());
        ip_hdr[8] = 64;
        ip_hdr[12..16].copy_from_slice(&[10, 0, 0, 5]);
        ip_hdr[16..20].copy_from_slice(&dst_ip.octets());
        let checksum = v4::checksum(&ip_hdr);
        ip_hdr[10..12].copy_from_slice(&checksum.to_be_bytes());
        let mut datagram = ip_hdr;
        datagram.extend_from_slice(&payload);

        let f = frame(own_mac, MacAddr([0, 0, 0, 0, 0, 5]), 0x0800, &datagram);
        core.ingress(PortId::new(0), &f).unwrap();

        let transmitted = backend.drain_transmitted();
        assert_eq!(transmitted.len(), 3);
        for (port, bytes) in &transmitted {
            assert_eq!(*port, PortId::new(1));
            assert!(bytes.len() - ETH_HEADER_LEN <= v4::MIN_HEADER_LEN + 40);
        }
    }

    #[test]
    fn routed_datagram_too_large_with_dont_fragment_set_errors() {
        use crate::routing::{NextHop, Prefix4, RouteEntry};

        let (core, _backend) = core_with_ports(2);
        let dst_ip = Ipv4Addr::new(10, 0, 1, 5);
        core.routing
            .add_v4(
                Prefix4 { addr: Ipv4Addr::new(10, 0, 1, 0), len: 24 },
                RouteEntry {
                    next_hop: NextHop::Direct,
                    out_port: PortId::new(1),
                    admin_distance: 1,
                    metric: 0,
                    installed_secs: 0,
                },
            )
            .unwrap();
        core.ports.set_mtu(PortId::new(1), (v4::MIN_HEADER_LEN + 40) as u32).unwrap();
        let next_hop_mac = MacAddr([0, 0, 0, 0, 0, 0x77]);
        core.arp.handle_reply(dst_ip, next_hop_mac, PortId::new(1), 0).unwrap();

        let own_mac = core.ports.get_mac(PortId::new(0)).unwrap();
        let payload = vec![0xabu8; 100];
        let mut ip_hdr = vec![0u8; v4::MIN_HEADER_LEN];
        ip_hdr[0] = 0x45;
        ip_hdr[2..4].copy_from_slice(&((v4::MIN_HEADER_LEN + payload.len()) as u16).to_be_bytes());
        ip_hdr[6] = 0x40; // don't-fragment bit
        ip_hdr[8] = 64;
        ip_hdr[12..16].copy_from_slice(&[10, 0, 0, 5]);
        ip_hdr[16..20].copy_from_slice(&dst_ip.octets());
        let checksum = v4::checksum(&ip_hdr);
        ip_hdr[10..12].copy_from_slice(&checksum.to_be_bytes());
        let mut datagram = ip_hdr;
        datagram.extend_from_slice(&payload);

        let f = frame(own_mac, MacAddr([0, 0, 0, 0, 0, 5]), 0x0800, &datagram);
        assert!(matches!(
            core.ingress(PortId::new(0), &f),
            Err(SwitchError::FragmentationNeeded)
        ));
    }

    #[test]
    fn ports_down_ingress_is_rejected() {
        let backend = Arc::new(SimBackend::new(2));
        let core = Core::new(backend, MacAddr([0x02, 0, 0, 0, 0, 0])).unwrap();
        assert!(matches!(
            core.ingress(PortId::new(0), &frame(MacAddr::BROADCAST, MacAddr::ZERO, 0x0800, &[0; 4])),
            Err(SwitchError::PortDown(_))
        ));
    }
}
