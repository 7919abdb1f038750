//! Battery level polling.

use crate::ble::{Link, LinkError};
use std::convert::Infallible;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Default time between battery reads.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Remaining battery charge reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerStatus {
    percent: u8,
}

impl PowerStatus {
    pub fn percent(&self) -> u8 {
        self.percent
    }
}

impl fmt::Display for PowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent)
    }
}

/// A failed battery read. Never fatal to the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("Battery level read returned no data")]
    EmptyReading,
    #[error("Battery level {0} is outside 0-100")]
    OutOfRange(u8),
}

/// Read the battery level once.
pub async fn poll(link: &dyn Link) -> Result<PowerStatus, PollError> {
    let value = link.read_battery_level().await?;
    match value.first() {
        None => Err(PollError::EmptyReading),
        Some(&percent) if percent > 100 => Err(PollError::OutOfRange(percent)),
        Some(&percent) => Ok(PowerStatus { percent }),
    }
}

/// Poll the battery level every `interval`, starting immediately, and log the
/// result. Failures are logged and the next read happens on schedule.
///
/// Never completes; the caller stops it by dropping the future.
pub async fn run_poller(link: &dyn Link, interval: Duration) -> Infallible {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match poll(link).await {
            Ok(status) => info!(battery = %status, "battery level"),
            Err(error) => warn!(%error, "could not read battery level"),
        }
    }
}
