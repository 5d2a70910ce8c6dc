//! Service facade: the operations exposed to the transport layer, plus the
//! broadcast cycle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use market::alerts::{MetricSet, evaluate_rules};
use market::analytics::{CorrelationMatrix, correlation_matrix};
use market::types::normalize_symbol;
use market::{
    AnalyticsParams, Interval, OhlcvBar, Pair, PairAnalyticsSnapshot, Tick,
    TickSummary, TimeRange, analyze_pair, resample, summarize,
};
use tracing::{debug, instrument, warn};

use crate::alerts::AlertStore;
use crate::broadcast::CycleSource;
use crate::broadcast::protocol::AnalyticsUpdate;
use crate::collector::Collector;
use crate::collector::state::StreamStatus;
use crate::error::ServiceError;
use crate::logger::warn_if_slow;
use crate::store::{StoreStats, TickStore};
use crate::time::now_ms;

const QUERY_BUDGET: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub broadcast_pairs: Vec<Pair>,
    pub broadcast_interval: Interval,
    pub broadcast_lookback_ticks: usize,
    pub params: AnalyticsParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            broadcast_pairs: Vec::new(),
            broadcast_interval: Interval::OneMinute,
            broadcast_lookback_ticks: 5_000,
            params: AnalyticsParams::default(),
        }
    }
}

pub struct AnalyticsService {
    collector: Arc<Collector>,
    store: Arc<dyn TickStore>,
    alerts: Arc<dyn AlertStore>,
    cfg: ServiceConfig,
}

impl AnalyticsService {
    pub fn new(
        collector: Arc<Collector>,
        store: Arc<dyn TickStore>,
        alerts: Arc<dyn AlertStore>,
        cfg: ServiceConfig,
    ) -> Self {
        Self {
            collector,
            store,
            alerts,
            cfg,
        }
    }

    pub async fn start_stream(&self, symbols: &[String]) -> Result<(), ServiceError> {
        self.collector.start(symbols).await
    }

    pub async fn stop_stream(&self) -> Result<(), ServiceError> {
        self.collector.stop().await
    }

    pub fn status(&self) -> StreamStatus {
        self.collector.status()
    }

    pub fn latest_ticks(&self) -> BTreeMap<String, Tick> {
        self.collector.latest_ticks()
    }

    pub fn reset_stats(&self) {
        self.collector.reset_stats();
    }

    pub async fn ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        range: TimeRange,
    ) -> Result<Vec<OhlcvBar>, ServiceError> {
        let interval: Interval = interval.parse()?;
        let symbol = require_symbol(symbol)?;
        self.bars(&symbol, interval, range, None).await
    }

    #[instrument(skip(self, range))]
    pub async fn pair_analytics(
        &self,
        symbol1: &str,
        symbol2: &str,
        interval: &str,
        range: TimeRange,
    ) -> Result<PairAnalyticsSnapshot, ServiceError> {
        let interval: Interval = interval.parse()?;
        let pair = Pair::new(&require_symbol(symbol1)?, &require_symbol(symbol2)?);
        self.analyze(&pair, interval, range, None).await
    }

    pub async fn summary(
        &self,
        symbol: &str,
        range: TimeRange,
    ) -> Result<TickSummary, ServiceError> {
        let symbol = require_symbol(symbol)?;
        let ticks = self.ticks(&symbol, range, None).await?;
        summarize(&symbol, &ticks)
            .ok_or_else(|| ServiceError::NoData(format!("no ticks for {symbol}")))
    }

    pub async fn correlation_matrix(
        &self,
        symbols: &[String],
        interval: &str,
    ) -> Result<CorrelationMatrix, ServiceError> {
        let interval: Interval = interval.parse()?;

        let mut seen = HashSet::new();
        let symbols: Vec<String> = symbols
            .iter()
            .filter_map(|s| normalize_symbol(s))
            .filter(|s| seen.insert(s.clone()))
            .collect();
        if symbols.len() < 2 {
            return Err(ServiceError::TooFewSymbols { required: 2 });
        }

        let mut series = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let bars = self.bars(&symbol, interval, TimeRange::all(), None).await?;
            if bars.is_empty() {
                debug!(symbol = %symbol, "no data; excluded from correlation matrix");
                continue;
            }
            series.push((symbol, bars));
        }
        if series.len() < 2 {
            return Err(ServiceError::NoData(
                "fewer than 2 symbols have data".to_string(),
            ));
        }

        Ok(correlation_matrix(&series))
    }

    pub async fn store_stats(&self) -> Result<StoreStats, ServiceError> {
        self.store.stats().await.map_err(ServiceError::Storage)
    }

    pub async fn clear_ticks(&self) -> Result<u64, ServiceError> {
        self.store.clear().await.map_err(ServiceError::Storage)
    }

    async fn ticks(
        &self,
        symbol: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Tick>, ServiceError> {
        warn_if_slow("tick_store_query", QUERY_BUDGET, async {
            self.store.query(symbol, range, limit).await
        })
        .await
        .with_context(|| format!("loading ticks for {symbol}"))
        .map_err(ServiceError::Storage)
    }

    async fn bars(
        &self,
        symbol: &str,
        interval: Interval,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<OhlcvBar>, ServiceError> {
        let ticks = self.ticks(symbol, range, limit).await?;
        Ok(resample(&ticks, interval))
    }

    async fn analyze(
        &self,
        pair: &Pair,
        interval: Interval,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<PairAnalyticsSnapshot, ServiceError> {
        let bars1 = self.bars(&pair.first, interval, range, limit).await?;
        let bars2 = self.bars(&pair.second, interval, range, limit).await?;
        Ok(analyze_pair(pair, &bars1, &bars2, self.cfg.params)?)
    }
}

fn require_symbol(raw: &str) -> Result<String, ServiceError> {
    normalize_symbol(raw).ok_or_else(|| ServiceError::Invalid("symbol must not be blank".into()))
}

#[async_trait]
impl CycleSource for AnalyticsService {
    async fn next_update(&self) -> anyhow::Result<AnalyticsUpdate> {
        let stream_status = self.collector.status();
        let latest_ticks = self.collector.latest_ticks();

        let mut analytics = BTreeMap::new();
        let mut metrics = Vec::with_capacity(self.cfg.broadcast_pairs.len());
        for pair in &self.cfg.broadcast_pairs {
            let res = self
                .analyze(
                    pair,
                    self.cfg.broadcast_interval,
                    TimeRange::all(),
                    Some(self.cfg.broadcast_lookback_ticks),
                )
                .await;
            match res {
                Ok(snap) => {
                    metrics.push((pair.clone(), MetricSet::from_snapshot(&snap)));
                    analytics.insert(pair.id(), snap);
                }
                Err(ServiceError::InsufficientData { aligned, .. }) => {
                    debug!(pair = %pair.id(), aligned, "not enough data for pair yet");
                }
                Err(ServiceError::Storage(e)) => return Err(e),
                Err(e) => return Err(e.into()),
            }
        }

        let rules = self
            .alerts
            .enabled_rules()
            .await
            .context("loading alert rules")?;
        let prices: HashMap<String, f64> = latest_ticks
            .iter()
            .map(|(s, t)| (s.clone(), t.price))
            .collect();
        let alerts = evaluate_rules(&rules, &metrics, &prices);

        let timestamp = now_ms();
        for alert in &alerts {
            if let Err(e) = self.alerts.record_trigger(alert.alert_id, timestamp).await {
                warn!(error = ?e, alert_id = alert.alert_id, "failed to record alert trigger");
            }
        }

        Ok(AnalyticsUpdate {
            stream_status,
            latest_ticks,
            analytics,
            alerts,
            timestamp,
        })
    }
}
