//! C1 — packet buffer and metadata.
//!
//! `PacketBuffer` owns a fixed-capacity byte buffer plus the metadata the
//! pipeline stamps and mutates as a frame traverses the engines. Unlike the
//! teacher's `core::rate_limiter`, which guards per-key state behind a
//! `Mutex`, a single in-flight packet is never shared across threads
//! (spec.md §5: "while a packet traverses the pipeline, no other thread may
//! hold a reference"), so this type is plain owned data with no interior
//! mutability.

use serde::{Deserialize, Serialize};

use crate::config::MAX_PACKET_SIZE;
use crate::error::{Result, SwitchError};
use crate::net::{EtherType, MacAddr, PortId, VlanId};

/// Direction a packet is travelling relative to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
    Internal,
    Invalid,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Invalid
    }
}

/// Per-packet metadata: set by ingress, mutated by processors, read by
/// egress (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketMetadata {
    pub port: PortId,
    pub direction: Direction,
    pub vlan: VlanId,
    pub priority: u8,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub ethertype: EtherType,
    pub is_tagged: bool,
    pub is_dropped: bool,
    pub timestamp_us: u64,
}

impl Default for PacketMetadata {
    fn default() -> Self {
        PacketMetadata {
            port: PortId::INVALID,
            direction: Direction::Invalid,
            vlan: VlanId::UNTAGGED,
            priority: 0,
            src_mac: MacAddr::ZERO,
            dst_mac: MacAddr::ZERO,
            ethertype: EtherType::new(0),
            is_tagged: false,
            is_dropped: false,
            timestamp_us: 0,
        }
    }
}

/// Owned, fixed-capacity packet buffer. Invariant: `len <= capacity <=
/// MAX_PACKET_SIZE` at every observable moment (spec.md §8, invariant 1).
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    data: Vec<u8>,
    len: usize,
    capacity: usize,
    pub metadata: PacketMetadata,
}

impl PacketBuffer {
    /// Allocates a zero-initialized buffer of `size` bytes.
    pub fn allocate(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SwitchError::InvalidArgument(
                "packet buffer size must be > 0".into(),
            ));
        }
        if size > MAX_PACKET_SIZE {
            return Err(SwitchError::ResourceExhausted(format!(
                "requested size {size} exceeds MAX_PACKET_SIZE {MAX_PACKET_SIZE}"
            )));
        }
        Ok(PacketBuffer {
            data: vec![0u8; size],
            len: 0,
            capacity: size,
            metadata: PacketMetadata::default(),
        })
    }

    /// Builds a buffer from existing bytes, e.g. a frame arriving from a
    /// `PortBackend`. Capacity equals the byte slice length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > MAX_PACKET_SIZE {
            return Err(SwitchError::InvalidArgument(format!(
                "packet length {} out of range",
                bytes.len()
            )));
        }
        let mut data = vec![0u8; bytes.len()];
        data.copy_from_slice(bytes);
        Ok(PacketBuffer {
            len: bytes.len(),
            capacity: bytes.len(),
            data,
            metadata: PacketMetadata::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Clears `len` to 0 and restores default metadata; `capacity` is
    /// unchanged.
    pub fn reset(&mut self) {
        self.len = 0;
        self.metadata = PacketMetadata::default();
    }

    /// Appends `bytes` to the end of the live region.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.len + bytes.len() > self.capacity {
            return Err(SwitchError::Overflow {
                have: self.len,
                want: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    fn check_range(&self, off: usize, n: usize) -> Result<()> {
        if off + n > self.len {
            return Err(SwitchError::OutOfBounds {
                offset: off,
                len: n,
                buffer_len: self.len,
            });
        }
        Ok(())
    }

    pub fn peek_byte(&self, off: usize) -> Result<u8> {
        self.check_range(off, 1)?;
        Ok(self.data[off])
    }

    /// Copies `n` bytes starting at `off` into `dst`. A zero-length read is
    /// a no-op that always succeeds.
    pub fn peek(&self, off: usize, n: usize, dst: &mut [u8]) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.check_range(off, n)?;
        dst[..n].copy_from_slice(&self.data[off..off + n]);
        Ok(())
    }

    /// Alias for [`Self::peek`] matching spec.md §4.1's `copy` name.
    pub fn copy(&self, off: usize, n: usize, dst: &mut [u8]) -> Result<()> {
        self.peek(off, n, dst)
    }

    /// Overwrites `n` bytes starting at `off` with `src`. The written range
    /// must lie within `[0, len)`.
    pub fn update(&mut self, off: usize, src: &[u8], n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.check_range(off, n)?;
        self.data[off..off + n].copy_from_slice(&src[..n]);
        Ok(())
    }

    /// Returns an independent buffer with copied bytes and metadata;
    /// per-packet `user_data` equivalents are never carried across a clone.
    pub fn clone_packet(&self) -> PacketBuffer {
        self.clone()
    }

    /// Grows or shrinks the live region. If `new_len <= capacity`, only
    /// `len` changes. Otherwise the backing storage is reallocated; on
    /// failure the buffer is left unchanged.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len <= self.capacity {
            if new_len > self.len {
                // zero-extend the newly exposed region
                for b in &mut self.data[self.len..new_len] {
                    *b = 0;
                }
            }
            self.len = new_len;
            return Ok(());
        }
        if new_len > MAX_PACKET_SIZE {
            return Err(SwitchError::ResourceExhausted(format!(
                "resize to {new_len} exceeds MAX_PACKET_SIZE {MAX_PACKET_SIZE}"
            )));
        }
        let mut data = vec![0u8; new_len];
        data[..self.len].copy_from_slice(&self.data[..self.len]);
        self.data = data;
        self.capacity = new_len;
        self.len = new_len;
        Ok(())
    }

    /// Shifts `[off, len)` right by `n` bytes (growing the buffer if
    /// needed) and writes `src` into the gap at `off`.
    pub fn insert(&mut self, off: usize, src: &[u8], n: usize) -> Result<()> {
        if off > self.len {
            return Err(SwitchError::OutOfBounds {
                offset: off,
                len: n,
                buffer_len: self.len,
            });
        }
        let old_len = self.len;
        self.resize(old_len + n)?;
        self.data.copy_within(off..old_len, off + n);
        self.data[off..off + n].copy_from_slice(&src[..n]);
        Ok(())
    }

    /// Removes `n` bytes at `off`, shifting the remainder left.
    pub fn remove(&mut self, off: usize, n: usize) -> Result<()> {
        self.check_range(off, n)?;
        self.data.copy_within(off + n..self.len, off);
        self.len -= n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_rejects_zero_and_oversized() {
        assert!(PacketBuffer::allocate(0).is_err());
        assert!(PacketBuffer::allocate(MAX_PACKET_SIZE + 1).is_err());
        assert!(PacketBuffer::allocate(64).is_ok());
    }

    #[test]
    fn len_never_exceeds_capacity_through_lifecycle() {
        let mut buf = PacketBuffer::allocate(16).unwrap();
        assert!(buf.len() <= buf.capacity());
        buf.append(&[1, 2, 3]).unwrap();
        assert_eq!(buf.len(), 3);
        assert!(buf.len() <= buf.capacity());
        buf.reset();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn append_overflow_is_rejected() {
        let mut buf = PacketBuffer::allocate(4).unwrap();
        assert!(buf.append(&[0; 4]).is_ok());
        assert!(matches!(
            buf.append(&[0; 1]),
            Err(SwitchError::Overflow { .. })
        ));
    }

    #[test]
    fn peek_zero_length_is_a_successful_no_op() {
        let buf = PacketBuffer::allocate(4).unwrap();
        let mut dst = [0u8; 0];
        assert!(buf.peek(100, 0, &mut dst).is_ok());
    }

    #[test]
    fn peek_out_of_bounds_is_rejected() {
        let mut buf = PacketBuffer::allocate(4).unwrap();
        buf.append(&[1, 2]).unwrap();
        let mut dst = [0u8; 4];
        assert!(matches!(
            buf.peek(0, 4, &mut dst),
            Err(SwitchError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn update_overwrites_within_len() {
        let mut buf = PacketBuffer::allocate(4).unwrap();
        buf.append(&[1, 2, 3]).unwrap();
        buf.update(1, &[9, 9], 2).unwrap();
        assert_eq!(buf.as_slice(), &[1, 9, 9]);
    }

    #[test]
    fn clone_is_independent_allocation() {
        let mut buf = PacketBuffer::allocate(8).unwrap();
        buf.append(&[1, 2, 3]).unwrap();
        let mut cloned = buf.clone_packet();
        cloned.update(0, &[9], 1).unwrap();
        assert_eq!(buf.as_slice()[0], 1);
        assert_eq!(cloned.as_slice()[0], 9);
    }

    #[test]
    fn resize_within_capacity_only_changes_len() {
        let mut buf = PacketBuffer::allocate(8).unwrap();
        buf.resize(5).unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn resize_beyond_capacity_reallocates() {
        let mut buf = PacketBuffer::allocate(4).unwrap();
        buf.append(&[1, 2, 3, 4]).unwrap();
        buf.resize(10).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.capacity(), 10);
        assert_eq!(&buf.as_slice()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn insert_then_remove_round_trips_original_bytes() {
        let mut buf = PacketBuffer::allocate(16).unwrap();
        buf.append(&[1, 2, 3, 4]).unwrap();
        let original_len = buf.len();
        let original: Vec<u8> = buf.as_slice().to_vec();

        buf.insert(2, &[9, 9, 9], 3).unwrap();
        assert_eq!(buf.len(), original_len + 3);
        buf.remove(2, 3).unwrap();

        assert_eq!(buf.len(), original_len);
        assert_eq!(buf.as_slice(), original.as_slice());
    }

    #[test]
    fn jumbo_frame_up_to_max_packet_size_is_accepted() {
        let buf = PacketBuffer::allocate(MAX_PACKET_SIZE).unwrap();
        assert_eq!(buf.capacity(), MAX_PACKET_SIZE);
    }
}
