//! Shared wire primitives used across every engine: addresses, port and
//! VLAN identifiers, and the bridge identifier used by the STP engine.

mod mac;
mod ipv4;
mod ipv6;
mod ids;

pub use mac::MacAddr;
pub use ipv4::Ipv4Addr;
pub use ipv6::Ipv6Addr;
pub use ids::{BridgeId, EtherType, EtherTypes, PortId, VlanId};
