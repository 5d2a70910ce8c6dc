//! WebSocket endpoint bridging sockets to broadcast subscriptions.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::broadcast::BroadcastHub;
use crate::broadcast::protocol::{encode_pong, encode_update, reply_to};

const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// Accept loop. Accept errors (e.g. fd exhaustion) are logged and retried
/// after a short pause; the endpoint only ends when the task is aborted.
pub async fn serve(listener: TcpListener, hub: BroadcastHub) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = ?e, "accept failed; retrying");
                tokio::time::sleep(ACCEPT_RETRY).await;
                continue;
            }
        };
        let hub = hub.clone();
        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, hub).await {
                    debug!(error = ?e, "client connection closed with error");
                }
            }
            .instrument(info_span!("ws_client", peer = %peer)),
        );
    }
}

async fn handle_connection(stream: TcpStream, hub: BroadcastHub) -> anyhow::Result<()> {
    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let mut sub = hub.subscribe();
    info!(subscriber = sub.id(), "client subscribed");

    loop {
        tokio::select! {
            update = sub.recv() => {
                let Some(update) = update else {
                    warn!(subscriber = sub.id(), "subscriber dropped by hub");
                    break;
                };
                write.send(Message::Text(encode_update(&update)?.into())).await?;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(pong) = reply_to(text.as_str()) {
                        write.send(Message::Text(encode_pong(&pong)?.into())).await?;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = ?e, "client read error");
                    break;
                }
            },
        }
    }

    info!(subscriber = sub.id(), "client disconnected");
    Ok(())
}
