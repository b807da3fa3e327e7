use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::trace::{SpanId, TraceId};

/// Produces the identifiers for new traces and spans.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// The default generator, drawing uniformly random non-zero ids from a
/// per-thread PRNG.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = TraceId::from(rng.gen::<u128>());
                if id != TraceId::INVALID {
                    return id;
                }
            }
        })
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = SpanId::from(rng.gen::<u64>());
                if id != SpanId::INVALID {
                    return id;
                }
            }
        })
    }
}

thread_local! {
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

/// A deterministic generator producing sequential ids, for tests that
/// assert on specific identifiers.
#[derive(Clone, Debug, Default)]
pub struct SequentialIdGenerator {
    next: Arc<AtomicU64>,
}

impl IdGenerator for SequentialIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(u128::from(self.next.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
