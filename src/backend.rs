//! C10 — port backend interface.
//!
//! Decouples every engine from how frames actually leave and arrive on the
//! wire. Production deployments plug in a real NIC/DPDK adapter; this crate
//! ships [`SimBackend`], an in-memory stand-in for demos and tests, styled
//! after the teacher's `core::rate_limiter::TokenBucket` — a plain struct
//! guarded by a handful of `Mutex`es rather than a dedicated actor thread.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::net::PortId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEvent {
    pub port: PortId,
    pub up: bool,
}

/// Everything the core needs from the physical/virtual transport. Every
/// method must be safe to call from multiple engine threads concurrently.
pub trait PortBackend: Send + Sync {
    /// Number of front-panel ports this backend exposes, not counting the
    /// CPU port.
    fn declared_port_count(&self) -> u16;

    /// Transmits one frame out `port`. Implementations should not block
    /// indefinitely; a full hardware queue should surface as
    /// [`crate::error::SwitchError::BackendError`].
    fn transmit(&self, port: PortId, frame: &[u8]) -> Result<()>;

    /// Non-blocking receive: returns the next queued frame and its
    /// ingress port, if any, without waiting.
    fn poll_receive(&self) -> Option<(PortId, Vec<u8>)>;

    /// Drains and returns link up/down events observed since the last
    /// call.
    fn drain_link_events(&self) -> Vec<LinkEvent>;

    /// Backend's monotonic clock in microseconds, used for per-packet
    /// timestamps.
    fn now_us(&self) -> u64;

    /// Backend's monotonic clock in whole seconds, used by every engine's
    /// aging/timer sweep.
    fn now_seconds(&self) -> u64;
}

struct Inner {
    rx_queues: Vec<VecDeque<Vec<u8>>>,
    tx_log: Vec<(PortId, Vec<u8>)>,
    link_events: Vec<LinkEvent>,
    clock_offset: Duration,
}

/// In-memory backend for integration tests and demos: each port has its
/// own receive queue a test can push frames into with
/// [`SimBackend::inject_frame`], transmitted frames land in
/// [`SimBackend::drain_transmitted`], and the clock is advanced explicitly
/// with [`SimBackend::advance_clock`] instead of tracking wall time, so
/// scenario tests stay deterministic.
pub struct SimBackend {
    inner: Mutex<Inner>,
    port_count: u16,
    epoch: Instant,
}

impl SimBackend {
    pub fn new(port_count: u16) -> Self {
        let mut rx_queues = Vec::with_capacity(port_count as usize);
        for _ in 0..port_count {
            rx_queues.push(VecDeque::new());
        }
        SimBackend {
            inner: Mutex::new(Inner {
                rx_queues,
                tx_log: Vec::new(),
                link_events: Vec::new(),
                clock_offset: Duration::ZERO,
            }),
            port_count,
            epoch: Instant::now(),
        }
    }

    pub fn inject_frame(&self, port: PortId, frame: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner.rx_queues.get_mut(port.0 as usize) {
            queue.push_back(frame);
        }
    }

    pub fn inject_link_event(&self, port: PortId, up: bool) {
        self.inner.lock().unwrap().link_events.push(LinkEvent { port, up });
    }

    pub fn drain_transmitted(&self) -> Vec<(PortId, Vec<u8>)> {
        std::mem::take(&mut self.inner.lock().unwrap().tx_log)
    }

    pub fn advance_clock(&self, delta: Duration) {
        self.inner.lock().unwrap().clock_offset += delta;
    }
}

impl PortBackend for SimBackend {
    fn declared_port_count(&self) -> u16 {
        self.port_count
    }

    fn transmit(&self, port: PortId, frame: &[u8]) -> Result<()> {
        self.inner.lock().unwrap().tx_log.push((port, frame.to_vec()));
        Ok(())
    }

    fn poll_receive(&self) -> Option<(PortId, Vec<u8>)> {
        let mut inner = self.inner.lock().unwrap();
        for (idx, queue) in inner.rx_queues.iter_mut().enumerate() {
            if let Some(frame) = queue.pop_front() {
                return Some((PortId::new(idx as u16), frame));
            }
        }
        None
    }

    fn drain_link_events(&self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.inner.lock().unwrap().link_events)
    }

    fn now_us(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        (self.epoch.elapsed() + inner.clock_offset).as_micros() as u64
    }

    fn now_seconds(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        (self.epoch.elapsed() + inner.clock_offset).as_secs()
    }
}
