//! Software-simulated multi-port Ethernet switch: L2 learning/forwarding,
//! VLANs, spanning tree, IPv4/IPv6 routing, ARP, and IP fragmentation,
//! wired together by [`core::Core`] behind a pluggable [`backend::PortBackend`].

pub mod arp;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod core;
pub mod error;
pub mod ip;
pub mod mac_table;
pub mod net;
pub mod pipeline;
pub mod port;
pub mod routing;
pub mod stats;
pub mod stp;
pub mod vlan;

pub use crate::core::Core;
pub use crate::error::{Result, SwitchError};

/// Installs the panic hook and structured-logging subscriber a host binary
/// should set up before constructing a [`Core`]. Mirrors the teacher's
/// `run()` bootstrap: a panic hook that logs through `tracing` before
/// invoking the default hook, plus an env-filtered `fmt` subscriber.
pub fn init_tracing() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic in netswitch-sim: {info}");
        default_hook(info);
    }));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netswitch_sim=info".into()),
        )
        .try_init();
}
