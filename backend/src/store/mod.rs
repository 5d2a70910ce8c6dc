pub mod sqlx_store;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use market::{Tick, TimeRange};
use serde::Serialize;

pub use sqlx_store::SqlxTickStore;

/// Append-only persistent tick log.
///
/// The single boundary between ingestion and historical analytics.
#[async_trait]
pub trait TickStore: Send + Sync {
    /// Durable batched insert. An empty batch is a no-op.
    async fn append(&self, ticks: &[Tick]) -> Result<()>;

    /// Ticks for `symbol` (case-insensitive) with a positive price inside
    /// `range`, ascending by timestamp. With `limit`, the most recent
    /// `limit` matching ticks are selected.
    async fn query(&self, symbol: &str, range: TimeRange, limit: Option<usize>)
    -> Result<Vec<Tick>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Delete all ticks; returns the number of rows removed.
    async fn clear(&self) -> Result<u64>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_ticks: u64,
    pub by_symbol: BTreeMap<String, u64>,
    /// Most recently inserted tick.
    pub latest: Option<Tick>,
}
