use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    // ingestion
    pub ticks_accepted: Arc<AtomicU64>,
    pub messages_dropped: Arc<AtomicU64>,
    pub ticks_evicted: Arc<AtomicU64>,

    // persistence
    pub flushes: Arc<AtomicU64>,
    pub flush_failures: Arc<AtomicU64>,

    // broadcast
    pub broadcast_cycles: Arc<AtomicU64>,
    pub broadcast_failures: Arc<AtomicU64>,
    pub subscribers_dropped: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub ticks_accepted: u64,
    pub messages_dropped: u64,
    pub ticks_evicted: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub broadcast_cycles: u64,
    pub broadcast_failures: u64,
    pub subscribers_dropped: u64,
}

pub fn bump(c: &AtomicU64, n: u64) {
    c.fetch_add(n, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> CounterSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            ticks_accepted: get(&self.ticks_accepted),
            messages_dropped: get(&self.messages_dropped),
            ticks_evicted: get(&self.ticks_evicted),
            flushes: get(&self.flushes),
            flush_failures: get(&self.flush_failures),
            broadcast_cycles: get(&self.broadcast_cycles),
            broadcast_failures: get(&self.broadcast_failures),
            subscribers_dropped: get(&self.subscribers_dropped),
        }
    }
}
