//! Snapshot fan-out to viewer sessions
//!
//! Uses a single `tokio::sync::broadcast` channel. Publishing never waits on
//! a session: a viewer that falls behind skips to the newest snapshot, and
//! with no viewers attached a publish is a no-op.

use crate::snapshot::Snapshot;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// Snapshots buffered per session before it starts skipping
pub const DEFAULT_CAPACITY: usize = 16;

/// Publisher side, cloneable into app state
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<Arc<Snapshot>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Attach a viewer session
    pub fn subscribe(&self) -> ViewerFeed {
        ViewerFeed {
            receiver: self.sender.subscribe(),
        }
    }

    /// Deliver a snapshot to every attached session; returns how many
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        // send() errors only when nobody is listening
        self.sender.send(Arc::new(snapshot)).unwrap_or(0)
    }

    /// Sessions currently attached
    pub fn session_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// One session's view of the snapshot stream
pub struct ViewerFeed {
    receiver: broadcast::Receiver<Arc<Snapshot>>,
}

impl ViewerFeed {
    /// Next snapshot, skipping any this session was too slow to take.
    /// `None` once the broadcaster is gone.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Viewer lagging, skipping stale snapshots");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
