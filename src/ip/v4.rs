//! IPv4 header validation, checksum, and TTL handling (spec.md §4.7).
//!
//! The byte-offset header parsing style (read fixed fields out of a raw
//! slice, validate before trusting any derived length) is grounded on the
//! teacher's `capture::parse_ip_packet`, which did the same for its
//! monitoring-only IPv4/IPv6 parse. Here the parse additionally drives
//! mutation (TTL decrement, checksum rewrite) since this pipeline forwards
//! packets rather than just observing them.

use crate::buffer::PacketBuffer;
use crate::error::{Result, SwitchError};
use crate::net::Ipv4Addr;

pub const MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl_words: u8,
    pub dscp_ecn: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    pub fn header_len(&self) -> usize {
        self.ihl_words as usize * 4
    }

    pub fn more_fragments(&self) -> bool {
        self.flags & 0x1 != 0
    }

    pub fn dont_fragment(&self) -> bool {
        self.flags & 0x2 != 0
    }

    pub fn fragment_offset_bytes(&self) -> u32 {
        self.fragment_offset as u32 * 8
    }
}

/// Computes the internet checksum (RFC 791 §3.1 one's-complement sum)
/// over `bytes`, treating an odd trailing byte as padded with a zero.
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = bytes.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Parses and structurally validates an IPv4 header starting at byte 0 of
/// `buf` (the caller is expected to have already stripped the Ethernet
/// header). Validates version, IHL bounds, total length against the
/// buffer, and the header checksum.
pub fn parse(buf: &PacketBuffer) -> Result<Ipv4Header> {
    if buf.len() < MIN_HEADER_LEN {
        return Err(SwitchError::InvalidPacket(
            "buffer shorter than minimum IPv4 header".into(),
        ));
    }
    let mut hdr = [0u8; MIN_HEADER_LEN];
    buf.peek(0, MIN_HEADER_LEN, &mut hdr)?;

    let version = hdr[0] >> 4;
    if version != 4 {
        return Err(SwitchError::HeaderError(format!(
            "unexpected IP version {version}"
        )));
    }
    let ihl_words = hdr[0] & 0x0f;
    if ihl_words < 5 {
        return Err(SwitchError::HeaderError(format!(
            "IHL {ihl_words} below minimum of 5"
        )));
    }
    let header_len = ihl_words as usize * 4;
    if buf.len() < header_len {
        return Err(SwitchError::InvalidPacket(
            "buffer shorter than claimed IHL".into(),
        ));
    }
    let total_length = u16::from_be_bytes([hdr[2], hdr[3]]);
    if (total_length as usize) > buf.len() || (total_length as usize) < header_len {
        return Err(SwitchError::HeaderError(format!(
            "total_length {total_length} inconsistent with buffer/header"
        )));
    }

    let mut full_header = vec![0u8; header_len];
    buf.peek(0, header_len, &mut full_header)?;
    if checksum(&full_header) != 0 {
        return Err(SwitchError::ChecksumError);
    }

    let flags_fragment = u16::from_be_bytes([hdr[6], hdr[7]]);

    Ok(Ipv4Header {
        version,
        ihl_words,
        dscp_ecn: hdr[1],
        total_length,
        identification: u16::from_be_bytes([hdr[4], hdr[5]]),
        flags: (flags_fragment >> 13) as u8,
        fragment_offset: flags_fragment & 0x1fff,
        ttl: hdr[8],
        protocol: hdr[9],
        checksum: u16::from_be_bytes([hdr[10], hdr[11]]),
        src: Ipv4Addr::from_octets([hdr[12], hdr[13], hdr[14], hdr[15]]),
        dst: Ipv4Addr::from_octets([hdr[16], hdr[17], hdr[18], hdr[19]]),
    })
}

/// Decrements TTL in place and rewrites the checksum. Returns
/// [`SwitchError::TtlExceeded`] without mutating the buffer if TTL would
/// reach 0 (spec.md §4.7/§6 `TTL_THRESHOLD`).
pub fn decrement_ttl_and_rewrite_checksum(buf: &mut PacketBuffer) -> Result<()> {
    let ttl = buf.peek_byte(8)?;
    if ttl <= crate::config::TTL_THRESHOLD {
        return Err(SwitchError::TtlExceeded);
    }
    let new_ttl = ttl - 1;
    buf.update(8, &[new_ttl], 1)?;
    buf.update(10, &[0, 0], 2)?;
    let ihl = buf.peek_byte(0)? & 0x0f;
    let header_len = ihl as usize * 4;
    let mut header = vec![0u8; header_len];
    buf.peek(0, header_len, &mut header)?;
    let new_checksum = checksum(&header);
    buf.update(10, &new_checksum.to_be_bytes(), 2)?;
    Ok(())
}

/// Splits one already-parsed IPv4 datagram into fragments no larger than
/// `egress_mtu` bytes each, aligned to 8-byte boundaries per RFC 791 §3.2.
/// The `more fragments` bit is set on every fragment but the last; each
/// fragment gets its own `total_length`, `fragment_offset`, and checksum.
/// Callers must check `dont_fragment()` themselves before calling this —
/// fragmenting a DF datagram is never correct.
pub fn fragment_for_egress(ip_buf: &PacketBuffer, egress_mtu: usize) -> Result<Vec<Vec<u8>>> {
    let hdr = parse(ip_buf)?;
    let header_len = hdr.header_len();
    let mut header = vec![0u8; header_len];
    ip_buf.peek(0, header_len, &mut header)?;
    let payload_len = ip_buf.len() - header_len;
    let mut payload = vec![0u8; payload_len];
    ip_buf.peek(header_len, payload_len, &mut payload)?;

    if egress_mtu <= header_len {
        return Err(SwitchError::FragmentationNeeded);
    }
    let max_payload_per_fragment = ((egress_mtu - header_len) / 8) * 8;
    if max_payload_per_fragment == 0 {
        return Err(SwitchError::FragmentationNeeded);
    }

    let mut fragments = Vec::new();
    let mut offset = 0usize;
    while offset < payload_len {
        let chunk_len = max_payload_per_fragment.min(payload_len - offset);
        let is_last = offset + chunk_len >= payload_len;

        let mut frag_header = header.clone();
        let frag_total_length = (header_len + chunk_len) as u16;
        frag_header[2..4].copy_from_slice(&frag_total_length.to_be_bytes());
        let frag_offset_words = (offset / 8) as u16;
        let df_bit: u16 = if hdr.dont_fragment() { 0x4000 } else { 0 };
        let mf_bit: u16 = if is_last { 0 } else { 0x2000 };
        let flags_fragment = df_bit | mf_bit | frag_offset_words;
        frag_header[6..8].copy_from_slice(&flags_fragment.to_be_bytes());
        frag_header[10..12].copy_from_slice(&[0, 0]);
        let frag_checksum = checksum(&frag_header);
        frag_header[10..12].copy_from_slice(&frag_checksum.to_be_bytes());

        let mut frag_bytes = Vec::with_capacity(header_len + chunk_len);
        frag_bytes.extend_from_slice(&frag_header);
        frag_bytes.extend_from_slice(&payload[offset..offset + chunk_len]);
        fragments.push(frag_bytes);

        offset += chunk_len;
    }
    Ok(fragments)
}
