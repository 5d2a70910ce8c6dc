//! Periodic fan-out of analytics snapshots.
//!
//! The loop is IDLE (no task) while nobody is subscribed and ACTIVE (one
//! task) otherwise. The first subscriber spawns the task; the task ends
//! itself when it finds the subscriber set empty. Both transitions happen
//! under the hub lock, so a subscriber arriving while the loop winds down
//! always gets a fresh one.

pub mod protocol;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info_span};

use crate::metrics::counters::{Counters, bump};
use protocol::AnalyticsUpdate;

/// Produces the payload of one broadcast cycle.
#[async_trait]
pub trait CycleSource: Send + Sync {
    async fn next_update(&self) -> anyhow::Result<AnalyticsUpdate>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    pub period: Duration,
    pub subscriber_queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(500),
            subscriber_queue_capacity: 64,
        }
    }
}

type Outbox = mpsc::Sender<Arc<AnalyticsUpdate>>;

#[derive(Default)]
struct HubState {
    subscribers: HashMap<u64, Outbox>,
    /// `Some` while ACTIVE.
    task: Option<JoinHandle<()>>,
}

struct HubInner {
    source: Arc<dyn CycleSource>,
    cfg: BroadcastConfig,
    state: Mutex<HubState>,
    next_id: AtomicU64,
    counters: Counters,
}

#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<AnalyticsUpdate>>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next payload; `None` once the hub has disconnected this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<AnalyticsUpdate>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.state.lock().subscribers.remove(&self.id);
        }
    }
}

impl BroadcastHub {
    pub fn new(source: Arc<dyn CycleSource>, cfg: BroadcastConfig, counters: Counters) -> Self {
        Self {
            inner: Arc::new(HubInner {
                source,
                cfg,
                state: Mutex::new(HubState::default()),
                next_id: AtomicU64::new(1),
                counters,
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.cfg.subscriber_queue_capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut st = self.inner.state.lock();
        st.subscribers.insert(id, tx);
        // A finished handle means the loop is gone; treat it as IDLE.
        if st.task.as_ref().is_none_or(JoinHandle::is_finished) {
            let inner = Arc::clone(&self.inner);
            st.task = Some(tokio::spawn(
                run_loop(inner).instrument(info_span!("broadcast_loop")),
            ));
            debug!("broadcast loop activated");
        }

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .state
            .lock()
            .task
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Disconnect everyone and tear the loop down.
    pub async fn shutdown(&self) {
        let task = {
            let mut st = self.inner.state.lock();
            st.subscribers.clear();
            st.task.take()
        };
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

async fn run_loop(inner: Arc<HubInner>) {
    let period = inner.cfg.period;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        {
            let mut st = inner.state.lock();
            if st.subscribers.is_empty() {
                st.task = None;
                debug!("no subscribers; broadcast loop going idle");
                return;
            }
        }

        let cycle = AssertUnwindSafe(inner.source.next_update())
            .catch_unwind()
            .await;
        match cycle {
            Ok(Ok(update)) => {
                inner.fan_out(Arc::new(update));
                bump(&inner.counters.broadcast_cycles, 1);
            }
            Ok(Err(e)) => {
                bump(&inner.counters.broadcast_failures, 1);
                error!(error = ?e, "broadcast cycle failed");
                tokio::time::sleep(period).await;
            }
            Err(panic) => {
                bump(&inner.counters.broadcast_failures, 1);
                error!(panic = %panic_message(&*panic), "broadcast cycle panicked");
                tokio::time::sleep(period).await;
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl HubInner {
    /// Push to every subscriber; any that cannot take it is dropped.
    fn fan_out(&self, update: Arc<AnalyticsUpdate>) {
        let mut st = self.state.lock();
        let before = st.subscribers.len();
        st.subscribers
            .retain(|_, tx| tx.try_send(Arc::clone(&update)).is_ok());
        let dropped = before - st.subscribers.len();
        if dropped > 0 {
            bump(&self.counters.subscribers_dropped, dropped as u64);
            debug!(dropped, "removed subscribers whose send failed");
        }
    }
}
