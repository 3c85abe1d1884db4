//! C3 — processor pipeline.
//!
//! An ordered chain of packet processors a buffer walks on its way through
//! the core. Each processor is registered with a `priority`; traversal order
//! is priority ascending, ties broken by registration order. Traversal is
//! snapshot-based: a thread calling [`Pipeline::run`] takes one copy of the
//! current chain, sorted by `(priority, insertion_order)`, under the
//! registry lock and then runs it lock-free, so registering or
//! unregistering a processor never blocks in-flight packets (spec.md
//! §4.3). Slot/generation handles are
//! grounded on the teacher's token-bucket keying in `core::rate_limiter`
//! (each entry addressed by a stable key rather than a raw index), adapted
//! here to a numeric slot since processors, unlike rate-limiter buckets,
//! have no natural external key. The trait-based stage chain itself is
//! grounded on `other_examples/83a3f6e9_abiolaogu-SASE-SDWAN__...－pipeline.rs.rs`'s
//! `Stage`/`Pipeline` pair, generalized from a fixed six-stage chain to a
//! dynamically registered one with bounded recirculation.

use std::sync::{Arc, Mutex};

use crate::buffer::PacketBuffer;
use crate::config::MAX_RECIRCULATION_DEPTH;
use crate::error::{Result, SwitchError};

/// Outcome of a single processor's look at a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Continue to the next processor in the chain.
    Forward,
    /// Stop the chain; the packet is discarded.
    Drop,
    /// Stop the chain; the processor has taken ownership of the packet's
    /// disposition (e.g. queued it for later transmission) and no further
    /// processor or the caller's default egress action should run.
    Consume,
    /// Restart the chain from the first processor, as if the packet had
    /// just re-entered the pipeline. Bounded by the caller-supplied depth
    /// limit to prevent infinite loops (spec.md §4.3/§9).
    Recirculate,
}

/// One stage in the chain. Implementors should not assume anything about
/// how many times `process` may run on the same buffer across recirculation.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;
    fn process(&self, buf: &mut PacketBuffer) -> Result<Verdict>;
}

/// Stable reference to a registered processor, valid until it is
/// unregistered. Carries a generation so a reused slot index cannot be
/// mistaken for the processor that originally received this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorHandle {
    index: usize,
    generation: u32,
}

struct Slot {
    processor: Option<Arc<dyn Processor>>,
    generation: u32,
    priority: u32,
    insertion_order: u64,
}

/// The registered processor chain. Each processor carries a `priority`;
/// traversal order is priority ascending, ties broken by registration order
/// (spec.md §3/§4.3).
pub struct Pipeline {
    inner: Mutex<Vec<Slot>>,
    next_insertion_order: Mutex<u64>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline {
            inner: Mutex::new(Vec::new()),
            next_insertion_order: Mutex::new(0),
        }
    }

    /// Adds `processor` to the chain at the given `priority`. Lower
    /// priorities run first; processors registered at the same priority run
    /// in the order they were registered.
    pub fn register(&self, processor: Arc<dyn Processor>, priority: u32) -> ProcessorHandle {
        let insertion_order = {
            let mut next = self.next_insertion_order.lock().unwrap();
            let order = *next;
            *next += 1;
            order
        };
        let mut slots = self.inner.lock().unwrap();
        slots.push(Slot {
            processor: Some(processor),
            generation: 0,
            priority,
            insertion_order,
        });
        ProcessorHandle {
            index: slots.len() - 1,
            generation: 0,
        }
    }

    /// Removes the processor identified by `handle`. A stale handle (one
    /// already unregistered) returns `NotFound` rather than panicking.
    pub fn unregister(&self, handle: ProcessorHandle) -> Result<()> {
        let mut slots = self.inner.lock().unwrap();
        let slot = slots
            .get_mut(handle.index)
            .filter(|s| s.generation == handle.generation && s.processor.is_some())
            .ok_or_else(|| SwitchError::NotFound("no such processor handle".into()))?;
        slot.processor = None;
        slot.generation += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.processor.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes a point-in-time copy of the live chain, sorted by
    /// `(priority, insertion_order)` ascending so equal-priority processors
    /// still traverse in registration order. Traversal against this
    /// snapshot is unaffected by concurrent register/unregister calls.
    fn snapshot(&self) -> Vec<Arc<dyn Processor>> {
        let mut entries: Vec<(u32, u64, Arc<dyn Processor>)> = self
            .inner
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| {
                s.processor
                    .clone()
                    .map(|p| (s.priority, s.insertion_order, p))
            })
            .collect();
        entries.sort_by_key(|(priority, insertion_order, _)| (*priority, *insertion_order));
        entries.into_iter().map(|(_, _, p)| p).collect()
    }

    /// Runs `buf` through the chain. `max_depth` bounds how many times a
    /// `Recirculate` verdict may restart the chain; exceeding it drops the
    /// packet. The depth limit is a parameter rather than a thread-local so
    /// the same `Pipeline` can serve multiple concurrent traversals with
    /// independent budgets (spec.md §9).
    pub fn run(&self, buf: &mut PacketBuffer, max_depth: u32) -> Result<Verdict> {
        let chain = self.snapshot();
        self.run_snapshot(&chain, buf, max_depth)
    }

    fn run_snapshot(
        &self,
        chain: &[Arc<dyn Processor>],
        buf: &mut PacketBuffer,
        depth_remaining: u32,
    ) -> Result<Verdict> {
        for processor in chain {
            match processor.process(buf)? {
                Verdict::Forward => continue,
                Verdict::Drop => return Ok(Verdict::Drop),
                Verdict::Consume => return Ok(Verdict::Consume),
                Verdict::Recirculate => {
                    if depth_remaining == 0 {
                        return Ok(Verdict::Drop);
                    }
                    return self.run_snapshot(chain, buf, depth_remaining - 1);
                }
            }
        }
        Ok(Verdict::Forward)
    }

    /// Convenience wrapper using the spec's default recirculation budget.
    pub fn run_default(&self, buf: &mut PacketBuffer) -> Result<Verdict> {
        self.run(buf, MAX_RECIRCULATION_DEPTH)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysForward;
    impl Processor for AlwaysForward {
        fn name(&self) -> &str {
            "always-forward"
        }
        fn process(&self, _buf: &mut PacketBuffer) -> Result<Verdict> {
            Ok(Verdict::Forward)
        }
    }

    struct AlwaysDrop;
    impl Processor for AlwaysDrop {
        fn name(&self) -> &str {
            "always-drop"
        }
        fn process(&self, _buf: &mut PacketBuffer) -> Result<Verdict> {
            Ok(Verdict::Drop)
        }
    }

    struct CountingRecirculate {
        counter: std::sync::atomic::AtomicU32,
    }
    impl Processor for CountingRecirculate {
        fn name(&self) -> &str {
            "counting-recirculate"
        }
        fn process(&self, _buf: &mut PacketBuffer) -> Result<Verdict> {
            self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Verdict::Recirculate)
        }
    }

    fn packet() -> PacketBuffer {
        let mut buf = PacketBuffer::allocate(64).unwrap();
        buf.append(&[1, 2, 3]).unwrap();
        buf
    }

    #[test]
    fn empty_pipeline_forwards() {
        let pipeline = Pipeline::new();
        let mut buf = packet();
        assert_eq!(pipeline.run_default(&mut buf).unwrap(), Verdict::Forward);
    }

    #[test]
    fn chain_runs_in_registration_order_and_stops_on_drop() {
        let pipeline = Pipeline::new();
        pipeline.register(Arc::new(AlwaysForward), 0);
        pipeline.register(Arc::new(AlwaysDrop), 0);
        pipeline.register(Arc::new(AlwaysForward), 0);
        let mut buf = packet();
        assert_eq!(pipeline.run_default(&mut buf).unwrap(), Verdict::Drop);
    }

    #[test]
    fn unregister_removes_processor_from_future_traversals() {
        let pipeline = Pipeline::new();
        let handle = pipeline.register(Arc::new(AlwaysDrop), 0);
        pipeline.unregister(handle).unwrap();
        let mut buf = packet();
        assert_eq!(pipeline.run_default(&mut buf).unwrap(), Verdict::Forward);
    }

    #[test]
    fn unregister_twice_is_not_found() {
        let pipeline = Pipeline::new();
        let handle = pipeline.register(Arc::new(AlwaysForward), 0);
        pipeline.unregister(handle).unwrap();
        assert!(matches!(
            pipeline.unregister(handle),
            Err(SwitchError::NotFound(_))
        ));
    }

    #[test]
    fn recirculation_is_bounded_and_then_drops() {
        let pipeline = Pipeline::new();
        let recirc = Arc::new(CountingRecirculate {
            counter: std::sync::atomic::AtomicU32::new(0),
        });
        pipeline.register(recirc.clone(), 0);
        let mut buf = packet();
        let verdict = pipeline.run(&mut buf, 3).unwrap();
        assert_eq!(verdict, Verdict::Drop);
        // Runs once at depth 3, then 2, 1, 0 before giving up: 4 calls.
        assert_eq!(
            recirc.counter.load(std::sync::atomic::Ordering::SeqCst),
            4
        );
    }

    #[test]
    fn recirculation_depth_zero_drops_immediately_after_first_pass() {
        let pipeline = Pipeline::new();
        let recirc = Arc::new(CountingRecirculate {
            counter: std::sync::atomic::AtomicU32::new(0),
        });
        pipeline.register(recirc.clone(), 0);
        let mut buf = packet();
        assert_eq!(pipeline.run(&mut buf, 0).unwrap(), Verdict::Drop);
        assert_eq!(
            recirc.counter.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    struct RecordingProcessor {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }
    impl Processor for RecordingProcessor {
        fn name(&self) -> &str {
            &self.name
        }
        fn process(&self, _buf: &mut PacketBuffer) -> Result<Verdict> {
            self.log.lock().unwrap().push(self.name.clone());
            Ok(Verdict::Forward)
        }
    }

    #[test]
    fn traversal_follows_priority_ascending_regardless_of_registration_order() {
        let pipeline = Pipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &str| {
            Arc::new(RecordingProcessor {
                name: name.to_string(),
                log: log.clone(),
            })
        };
        pipeline.register(make("p20"), 20);
        pipeline.register(make("p5"), 5);
        pipeline.register(make("p10"), 10);
        let mut buf = packet();
        pipeline.run_default(&mut buf).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["p5", "p10", "p20"]);
    }

    #[test]
    fn equal_priority_processors_run_in_registration_order() {
        let pipeline = Pipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &str| {
            Arc::new(RecordingProcessor {
                name: name.to_string(),
                log: log.clone(),
            })
        };
        pipeline.register(make("first"), 7);
        pipeline.register(make("second"), 7);
        pipeline.register(make("third"), 7);
        let mut buf = packet();
        pipeline.run_default(&mut buf).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }
}
