//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channel::Inner;
use super::types::ConnectionStatus;
use crate::protocol::Envelope;

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for correlated requests.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
pub(crate) async fn connection_loop(inner: Arc<Inner>) {
    let config = inner.config.clone();
    let shutdown = inner.shutdown.clone();
    let mut reconnect_delay = config.reconnect_delay_secs;
    let mut reconnecting = false;

    loop {
        info!(url = %config.display_url(), "Connecting to signaling server");

        let attempt = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = tokio::time::timeout(
                config.connect_timeout,
                tokio_tungstenite::connect_async(config.url.as_str()),
            ) => result,
        };

        match attempt {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                info!("Signaling connected");

                // Rejoin rooms ahead of anything queued while we were down.
                let rejoin = if reconnecting {
                    inner.rejoin_frames().await
                } else {
                    Vec::new()
                };
                if !rejoin.is_empty() {
                    info!(frames = rejoin.len(), "Rejoining rooms after reconnect");
                }
                reconnecting = true;

                let (ws_write, mut ws_read) = ws_stream.split();
                let writer_stop = shutdown.child_token();
                let writer_handle = tokio::spawn(outbound_forwarder(
                    Arc::clone(&inner.outbound_rx),
                    rejoin,
                    ws_write,
                    writer_stop.clone(),
                ));
                inner.status_tx.send_replace(ConnectionStatus::Connected);

                loop {
                    let msg = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        msg = ws_read.next() => msg,
                    };
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<Envelope>(&text) {
                                Ok(envelope) => inner.dispatcher.dispatch(envelope).await,
                                Err(e) => {
                                    debug!(error = %e, text = %text, "Unrecognized frame from signaling server");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("Signaling server closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        None => break,
                        Some(Ok(_)) => {}
                    }
                }

                // Cleanup. Answers to requests sent on this socket will
                // never arrive.
                writer_stop.cancel();
                let _ = writer_handle.await;
                inner.status_tx.send_replace(ConnectionStatus::Disconnected);
                let failed = inner.dispatcher.cancel_pending().await;
                if failed > 0 {
                    warn!(failed, "Cancelled requests pending on the lost connection");
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling server");
            }
            Err(_elapsed) => {
                error!(
                    timeout = ?config.connect_timeout,
                    "Signaling connection timed out"
                );
            }
        }

        if shutdown.is_cancelled() {
            break;
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }

    inner.status_tx.send_replace(ConnectionStatus::Disconnected);
    info!("Signaling connection loop stopped");
}

// ---------------------------------------------------------------------------
// Outbound Forwarder
// ---------------------------------------------------------------------------

/// Write `first`, then drain the outbound queue onto the socket until
/// stopped or the socket fails. Frames queued while disconnected wait for
/// the next socket. Returns the sink.
async fn outbound_forwarder<S>(
    outbound_rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    first: Vec<Envelope>,
    mut ws_write: S,
    stop: CancellationToken,
) -> S
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    for envelope in &first {
        if !write_frame(&mut ws_write, envelope).await {
            return ws_write;
        }
    }

    let mut rx = outbound_rx.lock().await;
    loop {
        let envelope = tokio::select! {
            _ = stop.cancelled() => {
                let _ = ws_write.send(WsMessage::Close(None)).await;
                return ws_write;
            }
            envelope = rx.recv() => envelope,
        };
        let Some(envelope) = envelope else {
            return ws_write;
        };
        if !write_frame(&mut ws_write, &envelope).await {
            return ws_write;
        }
    }
}

/// False once the socket is unusable.
async fn write_frame<S>(ws_write: &mut S, envelope: &Envelope) -> bool
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, event = %envelope.event, "Failed to encode outbound frame");
            return true;
        }
    };
    if let Err(e) = ws_write.send(WsMessage::Text(json.into())).await {
        warn!(error = %e, event = %envelope.event, "Failed to send frame");
        return false;
    }
    true
}
