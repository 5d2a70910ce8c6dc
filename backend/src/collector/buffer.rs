use std::collections::VecDeque;

use market::Tick;

/// Ticks accepted but not yet persisted.
///
/// Holds at most `capacity` ticks; beyond that the oldest are evicted. A
/// flush is requested when the buffer reaches `flush_at`, which is
/// `batch_size` normally and `retained + batch_size` after a failed write.
///
/// `epoch` advances on every `clear`, so a batch taken before a reset is
/// never restored into the cleared buffer.
pub struct TickBuffer {
    ticks: VecDeque<Tick>,
    capacity: usize,
    batch_size: usize,
    flush_at: usize,
    epoch: u64,
}

/// Contents swapped out for one write.
pub struct TakenBatch {
    pub ticks: Vec<Tick>,
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub evicted: usize,
    pub should_flush: bool,
}

impl TickBuffer {
    pub fn new(batch_size: usize, capacity: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            ticks: VecDeque::new(),
            capacity: capacity.max(batch_size),
            batch_size,
            flush_at: batch_size,
            epoch: 0,
        }
    }

    pub fn push(&mut self, tick: Tick) -> PushOutcome {
        self.ticks.push_back(tick);
        let evicted = self.evict_overflow();
        PushOutcome {
            evicted,
            should_flush: self.ticks.len() >= self.flush_at,
        }
    }

    /// Swap out the current contents; later pushes land in a fresh generation.
    pub fn take(&mut self) -> TakenBatch {
        self.flush_at = self.batch_size;
        TakenBatch {
            ticks: Vec::from(std::mem::take(&mut self.ticks)),
            epoch: self.epoch,
        }
    }

    /// Put back a batch whose write failed, ahead of anything pushed since.
    ///
    /// Returns the number of ticks evicted to stay within capacity, or `None`
    /// when the buffer was cleared after the take and the batch is discarded.
    pub fn restore(&mut self, batch: TakenBatch) -> Option<usize> {
        if batch.epoch != self.epoch {
            return None;
        }
        let newer = std::mem::take(&mut self.ticks);
        self.ticks = VecDeque::from(batch.ticks);
        self.ticks.extend(newer);
        let evicted = self.evict_overflow();
        self.flush_at = self.ticks.len().saturating_add(self.batch_size);
        Some(evicted)
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
        self.flush_at = self.batch_size;
        self.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    fn evict_overflow(&mut self) -> usize {
        let over = self.ticks.len().saturating_sub(self.capacity);
        self.ticks.drain(..over);
        over
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ts_ms: u64) -> Tick {
        Tick::new(ts_ms, "BTCUSDT", 1.0, 1.0, 0.0)
    }

    #[test]
    fn flush_requested_exactly_at_batch_size() {
        let mut b = TickBuffer::new(3, 10);
        assert!(!b.push(tick(1)).should_flush);
        assert!(!b.push(tick(2)).should_flush);
        assert!(b.push(tick(3)).should_flush);

        let batch = b.take();
        assert_eq!(batch.ticks.len(), 3);
        assert!(b.is_empty());
    }

    #[test]
    fn restored_batch_keeps_order_and_defers_next_flush() {
        let mut b = TickBuffer::new(2, 10);
        b.push(tick(1));
        b.push(tick(2));
        let failed = b.take();
        b.push(tick(3));

        assert_eq!(b.restore(failed), Some(0));
        let order: Vec<u64> = b.ticks.iter().map(|t| t.ts_ms).collect();
        assert_eq!(order, vec![1, 2, 3]);

        // Next attempt once another batch has accumulated on top.
        assert!(!b.push(tick(4)).should_flush);
        assert!(b.push(tick(5)).should_flush);
    }

    #[test]
    fn oldest_ticks_are_evicted_beyond_capacity() {
        let mut b = TickBuffer::new(2, 3);
        b.push(tick(1));
        b.push(tick(2));
        let failed = b.take();
        b.push(tick(3));
        b.push(tick(4));

        assert_eq!(b.restore(failed), Some(1));
        let order: Vec<u64> = b.ticks.iter().map(|t| t.ts_ms).collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn batch_taken_before_clear_is_not_restored() {
        let mut b = TickBuffer::new(2, 10);
        b.push(tick(1));
        b.push(tick(2));
        let in_flight = b.take();
        b.clear();
        b.push(tick(3));

        assert_eq!(b.restore(in_flight), None);
        let order: Vec<u64> = b.ticks.iter().map(|t| t.ts_ms).collect();
        assert_eq!(order, vec![3]);
        // Threshold is back to a plain batch.
        assert!(b.push(tick(4)).should_flush);
    }
}
