//! Tick → OHLCV aggregation.
//!
//! Ticks are partitioned into non-overlapping, epoch-aligned buckets. Each
//! non-empty bucket yields exactly one bar; empty buckets yield nothing (no
//! forward fill). The output depends only on the input sequence, so
//! re-resampling a longer history that starts with the same ticks reproduces
//! every bar whose bucket is fully covered by the shorter one.

use crate::interval::Interval;
use crate::types::{OhlcvBar, Tick};

/// Aggregate a time-ascending tick sequence into bars.
///
/// Ticks whose price is not a positive finite number are skipped.
pub fn resample(ticks: &[Tick], interval: Interval) -> Vec<OhlcvBar> {
    let mut bars: Vec<OhlcvBar> = Vec::new();

    for tick in ticks.iter().filter(|t| t.has_valid_price()) {
        let bucket = interval.bucket_start(tick.ts_ms);

        match bars.last_mut() {
            Some(bar) if bar.bucket_start_ms == bucket => {
                bar.high = bar.high.max(tick.price);
                bar.low = bar.low.min(tick.price);
                bar.close = tick.price;
                bar.volume += tick.size;
            }
            _ => bars.push(OhlcvBar {
                bucket_start_ms: bucket,
                open: tick.price,
                high: tick.price,
                low: tick.price,
                close: tick.price,
                volume: tick.size,
            }),
        }
    }

    bars
}
