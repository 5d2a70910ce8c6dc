use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use market::{AlertRule, AnalyticsParams, Interval, Pair};

use crate::broadcast::BroadcastConfig;
use crate::collector::CollectorConfig;
use crate::service::ServiceConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Tick Store connection string.
    pub database_url: String,

    // =========================
    // Ingestion
    // =========================
    /// Number of buffered ticks that triggers one batched write into the
    /// Tick Store.
    ///
    /// Purpose:
    /// - amortize persistence cost under high tick rates
    /// - bound the amount of unpersisted data at any moment
    ///
    /// After a failed write the retained ticks stay buffered and the next
    /// attempt happens once another `batch_size` ticks have arrived.
    pub batch_size: usize,

    /// Hard bound on buffered ticks. When failed batches pile up beyond it
    /// the oldest ticks are evicted (and counted).
    pub buffer_capacity: usize,

    /// Capacity of the channel between the per-symbol feed tasks and the
    /// single ingest loop.
    ///
    /// Acts as backpressure:
    /// - if ingestion stalls on a flush, feed readers block on send
    /// - prevents unbounded memory growth
    pub ingest_queue_capacity: usize,

    /// Base URL of the trade feed. Each symbol connects to
    /// `{feed_ws_url}/{symbol}@trade`.
    pub feed_ws_url: String,

    /// Delay before a dropped feed connection is re-established.
    pub feed_retry_ms: u64,

    /// Symbols started automatically at boot. Empty means the stream is
    /// started on demand.
    pub stream_symbols: Vec<String>,

    // =========================
    // Broadcast
    // =========================
    /// Period of the broadcast loop.
    pub broadcast_period_ms: u64,

    /// Outbound queue per subscriber. A subscriber whose queue is full when
    /// a payload is pushed is disconnected.
    pub subscriber_queue_capacity: usize,

    /// Pairs analysed on every broadcast cycle. Empty means the payload's
    /// `analytics` map is always empty.
    pub broadcast_pairs: Vec<Pair>,

    /// Bar interval used by broadcast analytics.
    pub broadcast_interval: Interval,

    /// Most recent ticks per symbol fed into broadcast analytics. Bounds the
    /// per-cycle work.
    pub broadcast_lookback_ticks: usize,

    /// Rules seeding the in-memory alert store.
    pub alert_rules: Vec<AlertRule>,

    /// Address of the WebSocket endpoint.
    pub listen_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://tick_data.db?mode=rwc".to_string(),

            batch_size: 100,
            buffer_capacity: 10_000,
            ingest_queue_capacity: 1_024,
            feed_ws_url: "wss://fstream.binance.com/ws".to_string(),
            feed_retry_ms: 3_000,
            stream_symbols: Vec::new(),

            broadcast_period_ms: 500,
            subscriber_queue_capacity: 64,
            broadcast_pairs: Vec::new(),
            broadcast_interval: Interval::OneMinute,
            broadcast_lookback_ticks: 5_000,
            alert_rules: Vec::new(),

            listen_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset keys keep defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let d = Self::default();

        let cfg = Self {
            database_url: get("DATABASE_URL").unwrap_or(d.database_url),

            batch_size: parse_or(&get, "BATCH_SIZE", d.batch_size)?,
            buffer_capacity: parse_or(&get, "BUFFER_CAPACITY", d.buffer_capacity)?,
            ingest_queue_capacity: parse_or(&get, "INGEST_QUEUE_CAPACITY", d.ingest_queue_capacity)?,
            feed_ws_url: get("FEED_WS_URL").unwrap_or(d.feed_ws_url),
            feed_retry_ms: parse_or(&get, "FEED_RETRY_MS", d.feed_retry_ms)?,
            stream_symbols: get("STREAM_SYMBOLS")
                .map(|v| split_list(&v).map(str::to_string).collect())
                .unwrap_or(d.stream_symbols),

            broadcast_period_ms: parse_or(&get, "BROADCAST_PERIOD_MS", d.broadcast_period_ms)?,
            subscriber_queue_capacity: parse_or(
                &get,
                "SUBSCRIBER_QUEUE_CAPACITY",
                d.subscriber_queue_capacity,
            )?,
            broadcast_pairs: match get("BROADCAST_PAIRS") {
                Some(v) => parse_pairs(&v)?,
                None => d.broadcast_pairs,
            },
            broadcast_interval: parse_or(&get, "BROADCAST_INTERVAL", d.broadcast_interval)?,
            broadcast_lookback_ticks: parse_or(
                &get,
                "BROADCAST_LOOKBACK_TICKS",
                d.broadcast_lookback_ticks,
            )?,
            alert_rules: match get("ALERT_RULES") {
                Some(v) if !v.trim().is_empty() => {
                    serde_json::from_str(&v).context("ALERT_RULES must be a JSON array of rules")?
                }
                _ => d.alert_rules,
            },

            listen_addr: get("LISTEN_ADDR").unwrap_or(d.listen_addr),
        };

        if cfg.batch_size == 0 {
            return Err(anyhow!("BATCH_SIZE must be at least 1"));
        }
        if cfg.buffer_capacity < cfg.batch_size {
            return Err(anyhow!(
                "BUFFER_CAPACITY ({}) must not be below BATCH_SIZE ({})",
                cfg.buffer_capacity,
                cfg.batch_size
            ));
        }

        Ok(cfg)
    }

    pub fn collector(&self) -> CollectorConfig {
        CollectorConfig {
            batch_size: self.batch_size,
            buffer_capacity: self.buffer_capacity,
            ingest_queue_capacity: self.ingest_queue_capacity.max(1),
        }
    }

    pub fn broadcast(&self) -> BroadcastConfig {
        BroadcastConfig {
            period: Duration::from_millis(self.broadcast_period_ms.max(1)),
            subscriber_queue_capacity: self.subscriber_queue_capacity.max(1),
        }
    }

    pub fn service(&self) -> ServiceConfig {
        ServiceConfig {
            broadcast_pairs: self.broadcast_pairs.clone(),
            broadcast_interval: self.broadcast_interval,
            broadcast_lookback_ticks: self.broadcast_lookback_ticks,
            params: AnalyticsParams::default(),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_pairs(raw: &str) -> anyhow::Result<Vec<Pair>> {
    split_list(raw)
        .map(|p| Pair::parse(p).ok_or_else(|| anyhow!("invalid pair {p:?} in BROADCAST_PAIRS; expected A:B")))
        .collect()
}
