//! Push Channel
//!
//! Each WebSocket is one viewer session fed from the broadcaster. Writes are
//! bounded by a timeout so a stalled client only ever hurts itself.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use metrics::gauge;
use obd_scheduler::{Broadcaster, ViewerFeed};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::AppState;

/// Longest a single frame write may take before the session is dropped
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upgrade to a WebSocket viewer session
pub async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| async move {
        let feed = broadcaster.subscribe();
        viewer_session(socket, feed, &broadcaster, remote).await;
    })
}

async fn viewer_session(
    socket: WebSocket,
    mut feed: ViewerFeed,
    broadcaster: &Broadcaster,
    remote: SocketAddr,
) {
    let (mut sender, mut receiver) = socket.split();
    info!(remote = %remote, sessions = broadcaster.session_count(), "Viewer connected");
    gauge!("obd_viewer_sessions").set(broadcaster.session_count() as f64);

    loop {
        tokio::select! {
            update = feed.next() => {
                let Some(snapshot) = update else {
                    break;
                };
                let text = match snapshot.to_push_json() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "Failed to encode snapshot");
                        continue;
                    }
                };
                match tokio::time::timeout(WRITE_TIMEOUT, sender.send(Message::Text(text))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(remote = %remote, error = %err, "Viewer write failed");
                        break;
                    }
                    Err(_) => {
                        debug!(remote = %remote, "Viewer write timed out");
                        break;
                    }
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(remote = %remote, error = %err, "Viewer read failed");
                    break;
                }
                // Viewers have nothing to say on this channel
                Some(Ok(_)) => {}
            }
        }
    }

    drop(feed);
    gauge!("obd_viewer_sessions").set(broadcaster.session_count() as f64);
    info!(remote = %remote, "Viewer disconnected");
}
