use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, instrument, warn};

/// Source of raw trade messages for one symbol.
///
/// Implementations own their reconnect policy and only return once the sink
/// is closed (or on an unrecoverable error).
#[async_trait]
pub trait TradeFeed: Send + Sync {
    async fn run(&self, symbol: &str, sink: Sender<String>) -> anyhow::Result<()>;
}

/// Binance trade stream over WebSocket, one connection per symbol.
pub struct BinanceTradeFeed {
    pub base_url: String,
    pub retry: Duration,
}

impl BinanceTradeFeed {
    pub fn new(base_url: String, retry: Duration) -> Self {
        Self { base_url, retry }
    }

    pub fn stream_url(&self, symbol: &str) -> String {
        format!(
            "{}/{}@trade",
            self.base_url.trim_end_matches('/'),
            symbol.to_ascii_lowercase()
        )
    }
}

#[async_trait]
impl TradeFeed for BinanceTradeFeed {
    #[instrument(skip(self, sink), fields(url = %self.stream_url(symbol)))]
    async fn run(&self, symbol: &str, sink: Sender<String>) -> anyhow::Result<()> {
        let url = self.stream_url(symbol);
        info!("starting trade feed worker");

        loop {
            debug!("connecting to trade stream");
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    info!("trade stream connected");
                    let (_write, mut read) = ws.split();

                    // Process all messages until this socket dies.
                    while let Some(msg) = read.next().await {
                        let msg = match msg {
                            Ok(m) => m,
                            Err(e) => {
                                warn!(error = ?e, "trade stream error encountered");
                                break;
                            }
                        };

                        if msg.is_ping() || msg.is_pong() {
                            continue;
                        }

                        if !msg.is_text() {
                            debug!(msg_type = ?msg, "ignoring non-text message");
                            continue;
                        }

                        let raw = match msg.into_text() {
                            Ok(t) => t,
                            Err(e) => {
                                error!(error = ?e, "failed to extract text from message");
                                continue;
                            }
                        };

                        tracing::trace!(raw_event = %raw.as_str(), "received raw trade message");

                        if sink.send(raw.as_str().to_owned()).await.is_err() {
                            debug!("ingest channel closed; feed worker shutting down");
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    error!(error = ?e, "trade stream connection failed");
                }
            }

            if sink.is_closed() {
                return Ok(());
            }

            warn!(interval = ?self.retry, "disconnected; attempting reconnection");
            tokio::time::sleep(self.retry).await;
        }
    }
}
