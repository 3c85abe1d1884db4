//! C7 — IP pipeline: IPv4/IPv6 header validation, TTL/hop-limit handling,
//! checksums, and fragmentation/reassembly.

pub mod fragment;
pub mod v4;
pub mod v6;

pub use fragment::{Endpoints, FragmentKey, FragmentReassembler};
