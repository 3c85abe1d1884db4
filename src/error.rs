//! Unified error type for every engine in the simulated switch core.
//!
//! `SwitchError` is the single error type returned by engine-level
//! operations (buffer, port registry, MAC table, VLAN, STP, IP pipeline,
//! routing table, ARP cache). Each variant is one kind from the taxonomy in
//! spec.md §7. Unlike the teacher's `AppError` (which serializes for a UI
//! boundary) this type has no custom `Serialize` impl: it never crosses a
//! process boundary, only a `std::error::Error` one.

/// Error taxonomy shared by every core engine. Kinds, not call sites: a
/// `NotFound` from the MAC table and a `NotFound` from the routing table
/// carry the same meaning to a caller deciding whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    /// Null or out-of-range parameter; caller bug, never retried internally.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted before required setup completed.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// Setup operation attempted twice.
    #[error("already initialized: {0}")]
    AlreadyInitialized(String),

    /// Lookup miss; informational to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate add attempt.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Buffer/packet arithmetic escaped `[0, len)`.
    #[error("out of bounds: offset {offset} + len {len} exceeds buffer length {buffer_len}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        buffer_len: usize,
    },

    /// Would-be write exceeds a fixed capacity.
    #[error("overflow: {have} + {want} exceeds capacity {capacity}")]
    Overflow {
        have: usize,
        want: usize,
        capacity: usize,
    },

    /// Capacity hit on a resource with a fixed maximum (allocator,
    /// fragment-context table, ARP cache, routing table, processor slots).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The MAC table specifically is full and no LRU dynamic entry could be
    /// evicted to make room.
    #[error("MAC table full")]
    TableFull,

    /// Operation refused because of the current state of a port/engine.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operation refused because the target port is administratively or
    /// operationally down.
    #[error("port down: {0}")]
    PortDown(PortIdDisplay),

    /// Operation refused because a prerequisite engine/resource is not
    /// ready yet (e.g. ARP resolution pending).
    #[error("not ready: {0}")]
    NotReady(String),

    /// Packet failed structural validation below the header-field level
    /// (e.g. truncated before the claimed header length).
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// A specific header field failed validation (bad version, IHL,
    /// length, or similar).
    #[error("header error: {0}")]
    HeaderError(String),

    /// Header checksum did not verify.
    #[error("checksum error")]
    ChecksumError,

    /// TTL/hop-limit reached zero while forwarding.
    #[error("ttl exceeded")]
    TtlExceeded,

    /// Packet exceeds egress MTU and the don't-fragment bit is set.
    #[error("fragmentation needed")]
    FragmentationNeeded,

    /// A fragment reassembly context expired before completion.
    #[error("reassembly timeout")]
    ReassemblyTimeout,

    /// Opaque failure reported by the port backend (C10).
    #[error("backend error: {0}")]
    BackendError(String),

    /// Programmer-reserved: an invariant the code believes can never break.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Thin wrapper so [`SwitchError::PortDown`] can carry a `PortId` without
/// creating a `mod` dependency cycle between `error` and `net` (`net::MacAddr`
/// parsing already returns `SwitchError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortIdDisplay(pub u16);

impl std::fmt::Display for PortIdDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port({})", self.0)
    }
}

pub type Result<T> = std::result::Result<T, SwitchError>;
