//! IP fragmentation and reassembly (spec.md §3/§4.7).
//!
//! Reassembly contexts are keyed the same way MAC table entries are keyed
//! in [`crate::mac_table`] — a `Mutex<HashMap<Key, Context>>`, with a
//! `process_aging`-style sweep driven by the same cooperative tick rather
//! than a dedicated timer thread.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::{CONFIG_IP_FRAGMENT_TIMEOUT, CONFIG_MAX_IP_FRAGMENTS};
use crate::error::{Result, SwitchError};
use crate::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoints {
    V4(Ipv4Addr, Ipv4Addr),
    V6(Ipv6Addr, Ipv6Addr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub endpoints: Endpoints,
    pub identification: u32,
    pub protocol: u8,
}

struct Piece {
    offset: usize,
    data: Vec<u8>,
}

struct Context {
    pieces: Vec<Piece>,
    /// Total reassembled payload length, known once the final fragment
    /// (the one with `more_fragments == false`) has arrived.
    total_len: Option<usize>,
    created_secs: u64,
}

impl Context {
    fn is_complete(&self) -> bool {
        let Some(total_len) = self.total_len else {
            return false;
        };
        let mut covered = vec![false; total_len];
        for piece in &self.pieces {
            for b in covered
                .iter_mut()
                .skip(piece.offset)
                .take(piece.data.len())
            {
                *b = true;
            }
        }
        covered.iter().all(|b| *b)
    }

    fn assemble(&self) -> Vec<u8> {
        let total_len = self.total_len.unwrap();
        let mut out = vec![0u8; total_len];
        for piece in &self.pieces {
            out[piece.offset..piece.offset + piece.data.len()].copy_from_slice(&piece.data);
        }
        out
    }
}

pub struct FragmentReassembler {
    inner: Mutex<HashMap<FragmentKey, Context>>,
    capacity: usize,
    timeout_secs: u64,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::with_limits(CONFIG_MAX_IP_FRAGMENTS, CONFIG_IP_FRAGMENT_TIMEOUT)
    }

    pub fn with_limits(capacity: usize, timeout_secs: u64) -> Self {
        FragmentReassembler {
            inner: Mutex::new(HashMap::new()),
            capacity,
            timeout_secs,
        }
    }

    pub fn context_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Inserts one fragment. `offset`/`data` are the fragment's payload
    /// position and bytes (header stripped); `more_fragments` is the MF
    /// flag from this fragment's own header. Returns the full reassembled
    /// payload once every byte position is covered.
    pub fn insert_fragment(
        &self,
        key: FragmentKey,
        offset: usize,
        data: &[u8],
        more_fragments: bool,
        now_secs: u64,
    ) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.contains_key(&key) {
            if inner.len() >= self.capacity {
                return Err(SwitchError::ResourceExhausted(
                    "fragment reassembly table full".into(),
                ));
            }
            inner.insert(
                key,
                Context {
                    pieces: Vec::new(),
                    total_len: None,
                    created_secs: now_secs,
                },
            );
        }

        let ctx = inner.get_mut(&key).unwrap();
        if !more_fragments {
            ctx.total_len = Some(offset + data.len());
        }
        ctx.pieces.push(Piece {
            offset,
            data: data.to_vec(),
        });

        if ctx.is_complete() {
            let assembled = ctx.assemble();
            inner.remove(&key);
            return Ok(Some(assembled));
        }
        Ok(None)
    }

    /// Drops contexts older than the configured timeout. Does not itself
    /// return an error per stale context; callers that need to surface
    /// [`SwitchError::ReassemblyTimeout`] to a metrics/log sink should
    /// check [`Self::context_count`] before and after.
    pub fn process_aging(&self, now_secs: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.retain(|_, ctx| now_secs.saturating_sub(ctx.created_secs) < self.timeout_secs);
    }
}

impl Default for FragmentReassembler {
    fn default() -> Self {
        Self::new()
    }
}
