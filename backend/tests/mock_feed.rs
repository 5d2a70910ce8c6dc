use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use backend::collector::feed::TradeFeed;

/// Replays canned messages per symbol, then stays "connected" until the
/// ingest side goes away or the task is aborted.
#[derive(Default)]
pub struct ScriptedFeed {
    pub messages: HashMap<String, Vec<String>>,
    pub connections: AtomicUsize,
}

impl ScriptedFeed {
    pub fn with(mut self, symbol: &str, messages: Vec<String>) -> Self {
        self.messages.insert(symbol.to_string(), messages);
        self
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeFeed for ScriptedFeed {
    async fn run(&self, symbol: &str, sink: Sender<String>) -> anyhow::Result<()> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        for m in self.messages.get(symbol).into_iter().flatten() {
            if sink.send(m.clone()).await.is_err() {
                return Ok(());
            }
        }
        sink.closed().await;
        Ok(())
    }
}

pub fn trade(symbol: &str, ts_ms: u64, price: f64, qty: f64) -> String {
    format!(
        r#"{{"e":"trade","E":{ts_ms},"s":"{symbol}","t":1,"p":"{price}","q":"{qty}","T":{ts_ms},"m":false}}"#
    )
}
