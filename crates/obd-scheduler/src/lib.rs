//! OBD-II Polling and Broadcast
//!
//! Provides the fixed-cadence polling loop that turns the enabled signal
//! selection into one snapshot per tick, the [`VehicleLink`] boundary it
//! polls through, and the [`Broadcaster`] that fans snapshots out to
//! viewer sessions.

mod broadcast;
mod link;
mod scheduler;
mod snapshot;

pub use broadcast::{Broadcaster, ViewerFeed, DEFAULT_CAPACITY};
pub use link::{normalize, ObdLink, QueryError, VehicleLink, PLACEHOLDER};
pub use scheduler::{PollStatus, PollingLoop, SchedulerConfig};
pub use snapshot::{Snapshot, OBD_DATA_EVENT};
