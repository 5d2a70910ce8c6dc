use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use backend::store::{StoreStats, TickStore};
use market::{Tick, TimeRange};

/// In-memory TickStore whose appends can be made to fail or to wait for a
/// release signal.
#[derive(Default)]
pub struct InMemoryTickStore {
    pub ticks: Mutex<Vec<Tick>>,
    pub fail_appends: AtomicBool,
    pub append_calls: AtomicUsize,
    pub hold_appends: AtomicBool,
    /// Signalled when a held append starts waiting.
    pub append_started: Notify,
    pub release: Notify,
}

impl InMemoryTickStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::SeqCst);
    }

    /// While set, each append blocks until `release` is notified.
    pub fn set_holding(&self, holding: bool) {
        self.hold_appends.store(holding, Ordering::SeqCst);
    }

    pub fn appends(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.ticks.lock().await.len()
    }
}

#[async_trait]
impl TickStore for InMemoryTickStore {
    async fn append(&self, ticks: &[Tick]) -> anyhow::Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_appends.load(Ordering::SeqCst) {
            self.append_started.notify_one();
            self.release.notified().await;
        }
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable"));
        }
        self.ticks.lock().await.extend_from_slice(ticks);
        Ok(())
    }

    async fn query(
        &self,
        symbol: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<Tick>> {
        let mut out: Vec<Tick> = self
            .ticks
            .lock()
            .await
            .iter()
            .filter(|t| t.symbol.eq_ignore_ascii_case(symbol.trim()))
            .filter(|t| t.has_valid_price() && range.contains(t.ts_ms))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.ts_ms);
        if let Some(n) = limit {
            let skip = out.len().saturating_sub(n);
            out.drain(..skip);
        }
        Ok(out)
    }

    async fn stats(&self) -> anyhow::Result<StoreStats> {
        let ticks = self.ticks.lock().await;
        let mut by_symbol = BTreeMap::new();
        for t in ticks.iter() {
            *by_symbol.entry(t.symbol.clone()).or_insert(0) += 1;
        }
        Ok(StoreStats {
            total_ticks: ticks.len() as u64,
            by_symbol,
            latest: ticks.last().cloned(),
        })
    }

    async fn clear(&self) -> anyhow::Result<u64> {
        let mut ticks = self.ticks.lock().await;
        let n = ticks.len() as u64;
        ticks.clear();
        Ok(n)
    }
}
