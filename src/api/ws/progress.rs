// WebSocket Progress Streaming

use crate::api::state::AppState;
use crate::jobs::{ProgressCursor, ProgressEvent, ScanId};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

type WsSender = SplitSink<WebSocket, Message>;

/// Stream progress events of one scan until it reaches a final state.
///
/// The subscription is taken before the current state is read, so no update
/// between the two is lost. Buffered events older than the snapshot are
/// dropped by the connection's cursor. A lagging subscriber is resynchronized
/// from the store instead of replaying the missed events.
pub async fn scan_websocket_handler(socket: WebSocket, scan_id: ScanId, state: Arc<AppState>) {
    info!("WebSocket connection established for scan: {}", scan_id);

    let (mut sender, mut receiver) = socket.split();
    let mut progress_rx = state.subscribe_progress();
    let ping_every = Duration::from_secs(state.config.ws_ping_interval_seconds.max(1));

    let mut send_task = tokio::spawn({
        let state = state.clone();
        let scan_id = scan_id.clone();
        async move {
            let mut cursor = ProgressCursor::default();
            if !send_snapshot(&state, &scan_id, &mut sender, &mut cursor).await {
                let _ = sender.send(Message::Close(None)).await;
                return;
            }

            let mut ping = tokio::time::interval(ping_every);
            ping.tick().await;

            loop {
                tokio::select! {
                    received = progress_rx.recv() => match received {
                        Ok(event) if event.scan_id == scan_id => {
                            if !cursor.admit(&event) {
                                debug!("Skipping stale event for scan {}", scan_id);
                            } else if !send_event(&mut sender, &event).await {
                                break;
                            } else if cursor.is_closed() {
                                debug!("Scan {} finished, closing WebSocket", scan_id);
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("WebSocket for scan {} lagged by {} events, resyncing", scan_id, skipped);
                            if !send_snapshot(&state, &scan_id, &mut sender, &mut cursor).await {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = ping.tick() => {
                        if sender.send(Message::Ping(Vec::new())).await.is_err() {
                            debug!("Client disconnected");
                            return;
                        }
                    }
                }
            }

            let _ = sender.send(Message::Close(None)).await;
        }
    });

    // Spawn task to receive messages from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("Client sent close message");
                    break;
                }
                Ok(Message::Text(text)) => {
                    debug!("Ignoring client message: {}", text);
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket connection closed for scan: {}", scan_id);
}

/// Send the stored state of the scan; false when the stream should end
async fn send_snapshot(
    state: &AppState,
    scan_id: &ScanId,
    sender: &mut WsSender,
    cursor: &mut ProgressCursor,
) -> bool {
    match state.store.get_job(None, scan_id).await {
        Ok(Some(job)) => {
            let event = ProgressEvent::from_job(&job);
            if !cursor.admit(&event) {
                return true;
            }
            send_event(sender, &event).await && !cursor.is_closed()
        }
        Ok(None) => {
            debug!("Scan {} no longer exists", scan_id);
            false
        }
        Err(e) => {
            error!("Failed to load scan {} for streaming: {}", scan_id, e);
            false
        }
    }
}

async fn send_event(sender: &mut WsSender, event: &ProgressEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize progress message: {}", e);
            return true;
        }
    };

    if sender.send(Message::Text(json)).await.is_err() {
        debug!("Client disconnected");
        return false;
    }
    true
}
