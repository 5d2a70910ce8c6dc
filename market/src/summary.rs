use serde::{Deserialize, Serialize};

use crate::analytics::stats::{finite, mean, sample_std};
use crate::types::Tick;

/// Descriptive statistics over raw tick prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub symbol: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Summarize a time-ascending tick sequence. `None` when it is empty.
pub fn summarize(symbol: &str, ticks: &[Tick]) -> Option<TickSummary> {
    let first = ticks.first()?;
    let last = ticks.last()?;
    let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();

    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(TickSummary {
        symbol: symbol.to_ascii_uppercase(),
        count: ticks.len(),
        mean: mean(&prices),
        std: sample_std(&prices),
        min: finite(min),
        max: finite(max),
        start_ms: first.ts_ms,
        end_ms: last.ts_ms,
    })
}
