//! Ingestion collector.
//!
//! One feed task per symbol pushes raw messages into a single bounded
//! channel; one ingest loop normalizes them and is the only writer of the
//! shared buffer and stream state. Batched writes run on their own task,
//! outside the state lock, so a slow write never blocks the ingest loop,
//! readers or feed I/O.

pub mod buffer;
pub mod feed;
pub mod parser;
pub mod state;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use market::Tick;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::ServiceError;
use crate::logger::warn_if_slow;
use crate::metrics::counters::{Counters, bump};
use crate::store::TickStore;
use crate::time::now_secs;
use buffer::{TakenBatch, TickBuffer};
use feed::TradeFeed;
use parser::normalize_trade;
use state::{StreamState, StreamStatus, normalize_symbols};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorConfig {
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub ingest_queue_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            buffer_capacity: 10_000,
            ingest_queue_capacity: 1_024,
        }
    }
}

/// Everything mutated by ingestion, guarded by one lock.
struct Shared {
    state: StreamState,
    buffer: TickBuffer,
}

struct RunningStream {
    feeds: Vec<JoinHandle<()>>,
    ingest: JoinHandle<()>,
}

pub struct Collector {
    store: Arc<dyn TickStore>,
    feed: Arc<dyn TradeFeed>,
    cfg: CollectorConfig,
    shared: Mutex<Shared>,
    /// Serializes flushes so a failed batch is restored before the next take.
    flush_gate: Arc<tokio::sync::Mutex<()>>,
    /// Held across start/stop so they never interleave.
    lifecycle: tokio::sync::Mutex<Option<RunningStream>>,
    counters: Counters,
}

impl Collector {
    pub fn new(
        store: Arc<dyn TickStore>,
        feed: Arc<dyn TradeFeed>,
        cfg: CollectorConfig,
        counters: Counters,
    ) -> Self {
        Self {
            store,
            feed,
            cfg,
            shared: Mutex::new(Shared {
                state: StreamState::default(),
                buffer: TickBuffer::new(cfg.batch_size, cfg.buffer_capacity),
            }),
            flush_gate: Arc::new(tokio::sync::Mutex::new(())),
            lifecycle: tokio::sync::Mutex::new(None),
            counters,
        }
    }

    /// Spawn one feed task per symbol plus the ingest loop.
    pub async fn start(self: &Arc<Self>, symbols: &[String]) -> Result<(), ServiceError> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Err(ServiceError::EmptySymbolSet);
        }

        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }

        {
            let mut s = self.shared.lock();
            s.state.running = true;
            s.state.symbols = symbols.clone();
        }

        let (tx, rx) = mpsc::channel::<String>(self.cfg.ingest_queue_capacity);

        let feeds = symbols
            .iter()
            .map(|symbol| {
                let feed = Arc::clone(&self.feed);
                let sink = tx.clone();
                let symbol = symbol.clone();
                let span = info_span!("symbol_feed", symbol = %symbol);
                tokio::spawn(
                    async move {
                        if let Err(e) = feed.run(&symbol, sink).await {
                            error!(error = ?e, "trade feed terminated");
                        }
                    }
                    .instrument(span),
                )
            })
            .collect();
        // Only feed tasks hold senders; the ingest loop ends once they are gone.
        drop(tx);

        let this = Arc::clone(self);
        let ingest =
            tokio::spawn(this.ingest_loop(rx).instrument(info_span!("ingest_loop")));

        *lifecycle = Some(RunningStream { feeds, ingest });
        info!(symbols = ?symbols, "stream started");
        Ok(())
    }

    /// Mark the stream stopped, tear down feeds and perform the final flush.
    ///
    /// Returns only after every accepted tick has been handed to the store;
    /// a failed final write is reported as `Storage` and the ticks stay
    /// buffered.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return Err(ServiceError::NotRunning);
        };

        {
            let mut s = self.shared.lock();
            s.state.running = false;
            s.state.symbols.clear();
        }

        for h in &running.feeds {
            h.abort();
        }
        for h in running.feeds {
            match h.await {
                Err(e) if e.is_panic() => warn!(error = ?e, "feed task panicked"),
                // Cancelled is the expected outcome.
                _ => {}
            }
        }
        if let Err(e) = running.ingest.await {
            warn!(error = ?e, "ingest loop ended abnormally");
        }

        self.flush().await.map_err(ServiceError::Storage)?;
        info!("stream stopped");
        Ok(())
    }

    /// A due batch is taken here, under the flush gate, and written on its
    /// own task. While a write holds the gate the threshold keeps reporting,
    /// so the next tick after it finishes triggers another.
    async fn ingest_loop(self: Arc<Self>, mut rx: mpsc::Receiver<String>) {
        let mut pending: Option<JoinHandle<()>> = None;

        while let Some(raw) = rx.recv().await {
            let tick = match normalize_trade(&raw, now_secs()) {
                Ok(Some(tick)) => tick,
                Ok(None) => continue,
                Err(e) => {
                    bump(&self.counters.messages_dropped, 1);
                    debug!(error = %e, "dropping malformed feed message");
                    continue;
                }
            };

            if !self.accept(tick) {
                continue;
            }
            let Ok(gate) = Arc::clone(&self.flush_gate).try_lock_owned() else {
                continue;
            };
            let batch = self.shared.lock().buffer.take();
            let this = Arc::clone(&self);
            pending = Some(tokio::spawn(
                async move {
                    let _gate = gate;
                    // Failures are logged and the batch stays buffered.
                    let _ = this.write_batch(batch).await;
                }
                .instrument(info_span!("tick_flush")),
            ));
        }

        if let Some(h) = pending {
            if let Err(e) = h.await {
                warn!(error = ?e, "background flush ended abnormally");
            }
        }
        debug!("ingest channel drained");
    }

    /// Accept one tick and, when the batch threshold is reached, flush
    /// before returning.
    pub async fn ingest(&self, tick: Tick) {
        if self.accept(tick) {
            // Failures are logged and the batch stays buffered.
            let _ = self.flush().await;
        }
    }

    /// Record and buffer one tick; `true` when a flush is due.
    fn accept(&self, tick: Tick) -> bool {
        let outcome = {
            let mut s = self.shared.lock();
            s.state.record(&tick);
            s.buffer.push(tick)
        };

        bump(&self.counters.ticks_accepted, 1);
        if outcome.evicted > 0 {
            bump(&self.counters.ticks_evicted, outcome.evicted as u64);
        }
        outcome.should_flush
    }

    /// Write everything currently buffered as one batch.
    ///
    /// Ticks accepted while the write is in flight go to a fresh buffer
    /// generation. On failure the batch is put back ahead of them.
    pub async fn flush(&self) -> anyhow::Result<usize> {
        let _gate = self.flush_gate.lock().await;
        let batch = self.shared.lock().buffer.take();
        self.write_batch(batch).await
    }

    /// Caller holds the flush gate.
    async fn write_batch(&self, batch: TakenBatch) -> anyhow::Result<usize> {
        if batch.ticks.is_empty() {
            return Ok(0);
        }
        let n = batch.ticks.len();

        let res = warn_if_slow("tick_store_append", Duration::from_millis(250), async {
            self.store.append(&batch.ticks).await
        })
        .await;

        match res {
            Ok(()) => {
                bump(&self.counters.flushes, 1);
                debug!(ticks = n, "flushed tick batch");
                Ok(n)
            }
            Err(e) => {
                bump(&self.counters.flush_failures, 1);
                match self.shared.lock().buffer.restore(batch) {
                    Some(evicted) => {
                        if evicted > 0 {
                            bump(&self.counters.ticks_evicted, evicted as u64);
                        }
                        warn!(error = ?e, ticks = n, evicted, "tick flush failed; batch retained");
                    }
                    None => {
                        warn!(error = ?e, ticks = n, "tick flush failed after reset; batch discarded");
                    }
                }
                Err(e)
            }
        }
    }

    pub fn status(&self) -> StreamStatus {
        let s = self.shared.lock();
        StreamStatus {
            running: s.state.running,
            symbols: s.state.symbols.clone(),
            tick_count: s.state.tick_count,
            buffer_size: s.buffer.len(),
            dropped_messages: self
                .counters
                .messages_dropped
                .load(std::sync::atomic::Ordering::Relaxed),
        }
    }

    pub fn latest_ticks(&self) -> BTreeMap<String, Tick> {
        self.shared.lock().state.last_ticks.clone()
    }

    /// Zero the tick counter and drop buffered ticks and the latest-tick map.
    pub fn reset_stats(&self) {
        let mut s = self.shared.lock();
        s.state.reset_stats();
        s.buffer.clear();
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}
