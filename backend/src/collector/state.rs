use std::collections::{BTreeMap, HashSet};

use market::Tick;
use market::types::normalize_symbol;
use serde::{Deserialize, Serialize};

/// Process-wide stream state, owned by the collector.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    pub running: bool,
    pub symbols: Vec<String>,
    pub tick_count: u64,
    pub last_ticks: BTreeMap<String, Tick>,
}

impl StreamState {
    pub fn record(&mut self, tick: &Tick) {
        self.tick_count += 1;
        self.last_ticks.insert(tick.symbol.clone(), tick.clone());
    }

    pub fn reset_stats(&mut self) {
        self.tick_count = 0;
        self.last_ticks.clear();
    }
}

/// Consistent snapshot reported by `GetStatus` and the broadcast payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub running: bool,
    pub symbols: Vec<String>,
    pub tick_count: u64,
    pub buffer_size: usize,
    pub dropped_messages: u64,
}

/// Trim, uppercase and dedupe symbols, keeping first-seen order.
pub fn normalize_symbols(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|s| normalize_symbol(s))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_normalized_in_order() {
        let raw = vec![
            " btcusdt".to_string(),
            "ETHUSDT".to_string(),
            "BTCUSDT ".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(normalize_symbols(&raw), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn record_tracks_latest_per_symbol() {
        let mut s = StreamState::default();
        s.record(&Tick::new(1, "A", 1.0, 1.0, 0.0));
        s.record(&Tick::new(2, "A", 2.0, 1.0, 0.0));
        s.record(&Tick::new(3, "B", 5.0, 1.0, 0.0));

        assert_eq!(s.tick_count, 3);
        assert_eq!(s.last_ticks["A"].price, 2.0);

        s.reset_stats();
        assert_eq!(s.tick_count, 0);
        assert!(s.last_ticks.is_empty());
    }
}
