use serde::{Deserialize, Serialize};

/// A single trade print for one instrument.
///
/// Ticks are immutable once built. Non-positive prices are kept as-is so raw
/// history survives; read paths filter them with [`Tick::has_valid_price`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Event time (ms since epoch)
    pub ts_ms: u64,

    /// Uppercased instrument identifier, e.g. `BTCUSDT`
    pub symbol: String,

    pub price: f64,
    pub size: f64,

    /// Wall-clock ingestion time (seconds since epoch)
    pub ingested_at: f64,
}

impl Tick {
    pub fn new(ts_ms: u64, symbol: &str, price: f64, size: f64, ingested_at: f64) -> Self {
        Self {
            ts_ms,
            symbol: symbol.trim().to_ascii_uppercase(),
            price,
            size,
            ingested_at,
        }
    }

    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Trim and uppercase a user supplied symbol. Blank input yields `None`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_ascii_uppercase())
    }
}

/// Open/high/low/close/volume aggregate of one time bucket.
///
/// Bars are derived on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Bucket start, aligned to the interval boundary (ms since epoch)
    pub bucket_start_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Inclusive time range. Missing bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start_ms: Some(start_ms),
            end_ms: Some(end_ms),
        }
    }

    pub fn contains(&self, ts_ms: u64) -> bool {
        self.start_ms.is_none_or(|s| ts_ms >= s) && self.end_ms.is_none_or(|e| ts_ms <= e)
    }
}

/// Two instruments analysed together. `first` is the dependent leg of the
/// hedge regression.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub first: String,
    pub second: String,
}

impl Pair {
    pub fn new(first: &str, second: &str) -> Self {
        Self {
            first: first.trim().to_ascii_uppercase(),
            second: second.trim().to_ascii_uppercase(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.first, self.second)
    }

    /// Parse `A:B` (or `A/B`).
    pub fn parse(raw: &str) -> Option<Self> {
        let (a, b) = raw.split_once([':', '/'])?;
        let first = normalize_symbol(a)?;
        let second = normalize_symbol(b)?;
        Some(Self { first, second })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_symbol_is_uppercased() {
        let t = Tick::new(1, " btcusdt ", 10.0, 1.0, 0.0);
        assert_eq!(t.symbol, "BTCUSDT");
    }

    #[test]
    fn non_positive_price_is_not_valid() {
        assert!(!Tick::new(1, "X", 0.0, 1.0, 0.0).has_valid_price());
        assert!(!Tick::new(1, "X", -3.0, 1.0, 0.0).has_valid_price());
        assert!(!Tick::new(1, "X", f64::NAN, 1.0, 0.0).has_valid_price());
        assert!(Tick::new(1, "X", 0.01, 0.0, 0.0).has_valid_price());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let r = TimeRange::between(10, 20);
        assert!(r.contains(10));
        assert!(r.contains(20));
        assert!(!r.contains(21));
        assert!(TimeRange::all().contains(0));
    }

    #[test]
    fn pair_parses_both_separators() {
        let p = Pair::parse("btcusdt:ethusdt").unwrap();
        assert_eq!(p.id(), "BTCUSDT/ETHUSDT");
        assert_eq!(Pair::parse("A/B"), Some(Pair::new("a", "b")));
        assert_eq!(Pair::parse("A:"), None);
        assert_eq!(Pair::parse("AB"), None);
    }
}
