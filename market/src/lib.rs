pub mod alerts;
pub mod analytics;
pub mod error;
pub mod interval;
pub mod resample;
pub mod rolling_window;
pub mod summary;
pub mod types;

pub use alerts::{AlertRule, Comparison, MetricSet, TriggeredAlert, evaluate_rule, evaluate_rules};
pub use analytics::{AnalyticsParams, PairAnalyticsSnapshot, analyze_pair};
pub use error::MarketError;
pub use interval::Interval;
pub use resample::resample;
pub use summary::{TickSummary, summarize};
pub use types::{OhlcvBar, Pair, Tick, TimeRange};
