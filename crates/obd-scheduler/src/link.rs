//! Vehicle Link
//!
//! The boundary between the polling loop and the adapter. Everything that
//! crosses it is a plain `f64` in the unit [`Pid::unit`] documents for the
//! signal's PID.

use obd_protocol::{ObdClient, ObdError, Pid};
use signals::SignalDescriptor;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Value reported when a live reading is unavailable
pub const PLACEHOLDER: f64 = 0.0;

/// Why a single signal query produced no value
#[derive(Debug, Error)]
pub enum QueryError {
    /// No reply within the query timeout
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Vehicle answered without data (PID unsupported or not ready)
    #[error("no data")]
    NoData,

    /// Decoded value is not physically possible for the PID
    #[error("value {value} {unit} outside [{min}, {max}]")]
    OutOfRange {
        value: f64,
        unit: &'static str,
        min: f64,
        max: f64,
    },

    /// Adapter or transport failure
    #[error(transparent)]
    Adapter(#[from] ObdError),
}

/// Connection to the vehicle as seen by the polling loop
pub trait VehicleLink: Send {
    /// Current transport state, read fresh on every call
    fn is_connected(&self) -> bool;

    /// Read one signal, normalized to its PID's unit
    fn query(
        &mut self,
        signal: &SignalDescriptor,
        timeout: Duration,
    ) -> impl Future<Output = Result<f64, QueryError>> + Send;

    /// Invoked after a cycle that found the link disconnected
    fn reconnect(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Check a decoded reading against its PID's unit range
pub fn normalize(pid: Pid, value: f64) -> Result<f64, QueryError> {
    let (min, max) = pid.valid_range();
    if !value.is_finite() || value < min || value > max {
        return Err(QueryError::OutOfRange {
            value,
            unit: pid.unit(),
            min,
            max,
        });
    }
    Ok(value)
}

/// [`VehicleLink`] backed by an ELM327 [`ObdClient`]
pub struct ObdLink {
    client: ObdClient,
    reconnect_interval: Duration,
    last_attempt: Option<Instant>,
}

impl ObdLink {
    /// Wrap a client; reconnects are attempted at most once per interval
    pub fn new(client: ObdClient, reconnect_interval: Duration) -> Self {
        Self {
            client,
            reconnect_interval,
            last_attempt: None,
        }
    }

    /// Initial connection attempt at startup
    pub async fn connect(&mut self) -> Result<(), ObdError> {
        self.last_attempt = Some(Instant::now());
        self.bounded_connect().await
    }

    /// Adapter init can take well over ten seconds when the adapter answers
    /// but the vehicle does not. Cap it at one reconnect interval so the
    /// loop keeps publishing placeholders.
    async fn bounded_connect(&mut self) -> Result<(), ObdError> {
        match tokio::time::timeout(self.reconnect_interval, self.client.connect()).await {
            Ok(result) => result,
            Err(_) => {
                self.client.disconnect();
                Err(ObdError::Timeout(self.reconnect_interval.as_millis() as u64))
            }
        }
    }
}

impl VehicleLink for ObdLink {
    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    async fn query(&mut self, signal: &SignalDescriptor, timeout: Duration) -> Result<f64, QueryError> {
        match self
            .client
            .query_pid_with_timeout(signal.command, timeout)
            .await
        {
            Ok(response) => normalize(signal.command, response.value),
            Err(ObdError::NoData(_)) => Err(QueryError::NoData),
            Err(ObdError::Timeout(_)) => Err(QueryError::Timeout(timeout)),
            Err(err) => Err(err.into()),
        }
    }

    async fn reconnect(&mut self) {
        if let Some(last) = self.last_attempt {
            if last.elapsed() < self.reconnect_interval {
                return;
            }
        }
        self.last_attempt = Some(Instant::now());

        debug!("Attempting to reconnect OBD adapter");
        match self.bounded_connect().await {
            Ok(()) => info!("OBD adapter reconnected"),
            Err(err) => debug!(error = %err, "OBD adapter still unavailable"),
        }
    }
}
