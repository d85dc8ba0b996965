//! Polling Loop
//!
//! One task, one writer: every `interval` the loop reads the current
//! selection, queries each enabled signal in turn and publishes the result.
//! A cycle that overruns delays the next tick instead of queueing extra ones.

use crate::broadcast::Broadcaster;
use crate::link::{VehicleLink, PLACEHOLDER};
use crate::snapshot::Snapshot;
use metrics::{counter, gauge};
use signals::{Selection, SignalCatalog};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between cycle starts (default: 1s)
    pub interval: Duration,
    /// Upper bound on a single signal query (default: 1s)
    pub query_timeout: Duration,
    /// Value substituted for unavailable readings
    pub placeholder: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            query_timeout: Duration::from_secs(1),
            placeholder: PLACEHOLDER,
        }
    }
}

/// Counters the loop exposes to the health endpoint
#[derive(Debug, Default)]
pub struct PollStatus {
    cycles: AtomicU64,
    published: AtomicU64,
    connected: AtomicBool,
}

impl PollStatus {
    /// Completed poll cycles
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Cycles that produced a broadcast
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Link state observed by the latest cycle
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// The polling loop
pub struct PollingLoop<L> {
    link: L,
    catalog: Arc<SignalCatalog>,
    selection: watch::Receiver<Arc<Selection>>,
    broadcaster: Broadcaster,
    config: SchedulerConfig,
    status: Arc<PollStatus>,
    /// Signals whose last query failed, to log only transitions loudly
    failing: HashSet<String>,
    last_connected: Option<bool>,
}

impl<L: VehicleLink> PollingLoop<L> {
    pub fn new(
        link: L,
        catalog: Arc<SignalCatalog>,
        selection: watch::Receiver<Arc<Selection>>,
        broadcaster: Broadcaster,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            link,
            catalog,
            selection,
            broadcaster,
            config,
            status: Arc::new(PollStatus::default()),
            failing: HashSet::new(),
            last_connected: None,
        }
    }

    /// Shared handle on the loop's counters
    pub fn status(&self) -> Arc<PollStatus> {
        self.status.clone()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Run one cycle. Returns the snapshot that was published, or `None` when
    /// no signal is enabled.
    pub async fn poll_once(&mut self) -> Option<Snapshot> {
        let selection = self.selection.borrow().clone();
        let connected = self.link.is_connected();
        self.observe_link(connected);

        let mut snapshot = Snapshot::new();
        for signal in selection.enabled(&self.catalog) {
            let value = if !connected {
                self.config.placeholder
            } else {
                match self.link.query(signal, self.config.query_timeout).await {
                    Ok(value) => {
                        if self.failing.remove(&signal.key) {
                            info!(signal = %signal.key, "Signal readings resumed");
                        }
                        value
                    }
                    Err(err) => {
                        counter!("obd_query_failures_total", "signal" => signal.key.clone())
                            .increment(1);
                        if self.failing.insert(signal.key.clone()) {
                            warn!(signal = %signal.key, error = %err, "Signal query failed, reporting placeholder");
                        } else {
                            debug!(signal = %signal.key, error = %err, "Signal query failed");
                        }
                        self.config.placeholder
                    }
                }
            };
            snapshot.insert(signal.key.clone(), value);
        }

        self.status.cycles.fetch_add(1, Ordering::Relaxed);
        counter!("obd_poll_cycles_total").increment(1);

        let published = if snapshot.is_empty() {
            debug!("No signals enabled, skipping broadcast");
            None
        } else {
            let sessions = self.broadcaster.publish(snapshot.clone());
            self.status.published.fetch_add(1, Ordering::Relaxed);
            debug!(signals = snapshot.len(), sessions, "Published snapshot");
            Some(snapshot)
        };

        if !connected {
            self.link.reconnect().await;
        }

        published
    }

    fn observe_link(&mut self, connected: bool) {
        self.status.connected.store(connected, Ordering::Relaxed);
        gauge!("obd_link_connected").set(if connected { 1.0 } else { 0.0 });

        if self.last_connected != Some(connected) {
            if connected {
                info!("Vehicle link connected");
            } else {
                warn!("Vehicle link disconnected, publishing placeholders");
            }
            self.failing.clear();
            self.last_connected = Some(connected);
        }
    }

    /// Poll forever at the configured interval
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            signals = self.catalog.len(),
            "Starting polling loop"
        );

        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }
}
