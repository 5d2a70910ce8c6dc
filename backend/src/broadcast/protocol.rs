use std::collections::BTreeMap;

use market::{PairAnalyticsSnapshot, Tick, TriggeredAlert};
use serde::{Deserialize, Serialize};

use crate::collector::state::StreamStatus;
use crate::time::now_rfc3339;

/// Payload pushed to every subscriber once per broadcast cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsUpdate {
    pub stream_status: StreamStatus,
    pub latest_ticks: BTreeMap<String, Tick>,
    /// Keyed by pair id (`A/B`). Empty unless pairs are configured.
    pub analytics: BTreeMap<String, PairAnalyticsSnapshot>,
    pub alerts: Vec<TriggeredAlert>,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
    #[serde(other)]
    Other,
}

/// Adds the `type` discriminator to an outbound body.
#[derive(Serialize)]
struct Envelope<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

pub fn encode_update(update: &AnalyticsUpdate) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope {
        kind: "analytics_update",
        body: update,
    })
}

pub fn encode_pong(pong: &Pong) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope {
        kind: "pong",
        body: pong,
    })
}

/// Reply to a client frame, if it warrants one. Only `ping` does; anything
/// else, malformed input included, is ignored.
pub fn reply_to(text: &str) -> Option<Pong> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => Some(Pong {
            timestamp: now_rfc3339(),
        }),
        Ok(ClientMessage::Other) | Err(_) => None,
    }
}
