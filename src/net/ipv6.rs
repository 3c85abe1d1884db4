//! 128-bit IPv6 address, stored as a 16-byte array per spec.md §3.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ipv6Addr(pub [u8; 16]);

impl Ipv6Addr {
    pub const UNSPECIFIED: Ipv6Addr = Ipv6Addr([0; 16]);

    pub fn octets(&self) -> [u8; 16] {
        self.0
    }

    /// Converts `prefix_len` (0..=128) to a netmask. Bijective with
    /// [`Self::mask_to_prefix_len`] over the valid range (spec.md §4.8).
    pub fn prefix_len_to_mask(prefix_len: u8) -> [u8; 16] {
        let mut mask = [0u8; 16];
        let full_bytes = (prefix_len / 8) as usize;
        let rem_bits = prefix_len % 8;
        for b in mask.iter_mut().take(full_bytes) {
            *b = 0xff;
        }
        if rem_bits > 0 && full_bytes < 16 {
            mask[full_bytes] = 0xffu8 << (8 - rem_bits);
        }
        mask
    }

    pub fn mask_to_prefix_len(mask: [u8; 16]) -> Option<u8> {
        let mut len = 0u8;
        let mut seen_zero = false;
        for byte in mask {
            for bit in (0..8).rev() {
                let set = (byte >> bit) & 1 == 1;
                if seen_zero && set {
                    return None;
                }
                if set {
                    len += 1;
                } else {
                    seen_zero = true;
                }
            }
        }
        Some(len)
    }

    pub fn masked(&self, prefix_len: u8) -> Ipv6Addr {
        let mask = Self::prefix_len_to_mask(prefix_len);
        let mut out = [0u8; 16];
        for i in 0..16 {
            out[i] = self.0[i] & mask[i];
        }
        Ipv6Addr(out)
    }

    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self
            .0
            .chunks(2)
            .map(|c| format!("{:02x}{:02x}", c[0], c[1]))
            .collect();
        write!(f, "{}", groups.join(":"))
    }
}

impl fmt::Debug for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv6Addr({self})")
    }
}
