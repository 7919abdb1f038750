//! Session controller: discover, connect, stream and shut down.
//!
//! One run is a single attempt that ends in exactly one [`Outcome`]:
//!
//! ```text
//! Discovering -> Matching -> Connecting -> Active -> ShuttingDown -> Disconnected
//!                   |            |
//!                   v            v
//!                NotFound      Failed
//! ```
//!
//! This module is decoupled from CLI parsing and process exit codes so it can
//! be driven by fake radios in tests.

use crate::ble::{Central, DiscoveredDevice, DiscoveryError, Link, LinkError, ScanMode};
use crate::config::Settings;
use crate::heart_rate;
use crate::measurement::Measurement;
use crate::output::Publisher;
use crate::status;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Durations that shape a run. Tests shrink these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Length of the first, metadata-rich discovery scan
    pub detailed_scan: Duration,
    /// Length of the fallback scan when the detailed one is unsupported
    pub basic_scan: Duration,
    /// Time between battery reads while active
    pub poll_interval: Duration,
    /// Pause after "device not found" so the operator can read the message
    pub not_found_cooldown: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            detailed_scan: Duration::from_secs(10),
            basic_scan: Duration::from_secs(5),
            poll_interval: status::POLL_INTERVAL,
            not_found_cooldown: Duration::from_secs(10),
        }
    }
}

/// Why an active session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Disconnect {
    /// Cancelled by the user
    Normal,
    /// The transport failed underneath the session
    Error(LinkError),
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No discovered device matched the configured name
    NotFound,
    /// The matched device could not be connected
    Failed(LinkError),
    /// The session was active and has been released
    Disconnected(Disconnect),
    /// Interrupted before a session was established
    Cancelled,
}

/// Errors that abort a run before any device is matched.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Pick the first device, in discovery order, whose name contains `pattern`
/// ignoring case.
pub fn find_target<'a>(
    devices: &'a [DiscoveredDevice],
    pattern: &str,
) -> Option<&'a DiscoveredDevice> {
    devices.iter().find(|device| device.name_matches(pattern))
}

/// Decode one notification and forward it to the publisher.
///
/// Decode and publish failures are logged and contained; the returned
/// measurement is `None` when the payload could not be decoded.
pub fn handle_notification(
    payload: &[u8],
    osc_path: &str,
    publisher: Option<&dyn Publisher>,
) -> Option<Measurement> {
    let measurement = match heart_rate::decode(payload) {
        Ok(measurement) => measurement,
        Err(error) => {
            warn!(%error, payload = ?payload, "dropping heart rate notification");
            return None;
        }
    };

    info!(%measurement, "heart rate");

    if let Some(publisher) = publisher {
        match publisher.publish(osc_path, measurement.heart_rate) {
            Ok(()) => debug!(path = osc_path, heart_rate = measurement.heart_rate, "OSC sent"),
            Err(error) => warn!(%error, path = osc_path, "OSC send failed"),
        }
    }

    Some(measurement)
}

async fn discover(
    central: &dyn Central,
    timings: &Timings,
) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
    match central
        .discover(ScanMode::Detailed, timings.detailed_scan)
        .await
    {
        Err(DiscoveryError::Unsupported(mode)) => {
            info!(%mode, "scan mode unsupported, falling back to basic scan");
            central.discover(ScanMode::Basic, timings.basic_scan).await
        }
        result => result,
    }
}

fn log_devices(devices: &[DiscoveredDevice]) {
    info!(count = devices.len(), "detected devices");
    for device in devices {
        info!(
            device_name = device.name.as_deref().unwrap_or("N/A"),
            address = %device.address,
            uuids = ?device.service_uuids,
            "device"
        );
    }
}

/// Stream notifications until cancellation or a transport fault, polling the
/// battery alongside, then unsubscribe. The link itself is left open.
async fn stream_session<F>(
    link: &dyn Link,
    settings: &Settings,
    publisher: Option<&dyn Publisher>,
    poll_interval: Duration,
    shutdown: F,
) -> Disconnect
where
    F: Future<Output = ()>,
{
    let mut notifications = match link.subscribe().await {
        Ok(notifications) => notifications,
        Err(error) => return Disconnect::Error(error),
    };
    info!("started heart rate notifications, press Ctrl+C to exit");

    let on_notification =
        |payload: &[u8]| handle_notification(payload, &settings.osc_path, publisher);

    let reason = {
        let stream = async {
            while let Some(payload) = notifications.next().await {
                on_notification(&payload);
            }
            Disconnect::Error(LinkError::Closed)
        };

        tokio::select! {
            reason = stream => reason,
            never = status::run_poller(link, poll_interval) => match never {},
            () = shutdown => Disconnect::Normal,
        }
    };

    match link.unsubscribe(notifications).await {
        Ok(()) => info!("stopped notifications"),
        Err(error) => warn!(%error, "failed to stop notifications"),
    }

    reason
}

/// Run one session attempt until it reaches a terminal state.
///
/// `shutdown` resolving is treated as a user interrupt at any stage. An open
/// link is always unsubscribed and disconnected before returning, including
/// one that finished connecting after the interrupt.
///
/// # Arguments
/// * `settings` - Target device name and OSC path
/// * `central` - Radio used to discover and connect
/// * `publisher` - OSC destination, or `None` to only log measurements
/// * `timings` - Scan, poll and cooldown durations
/// * `shutdown` - Future that resolves when the user asks to stop
///
/// # Errors
/// Returns `RunError::Discovery` if neither scan mode can be started. Every
/// later fault is reported through the returned [`Outcome`].
pub async fn run<F>(
    settings: &Settings,
    central: &dyn Central,
    publisher: Option<&dyn Publisher>,
    timings: &Timings,
    shutdown: F,
) -> Result<Outcome, RunError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    info!("scanning for Bluetooth devices, this can take a while");
    let devices = tokio::select! {
        result = discover(central, timings) => result?,
        () = &mut shutdown => return Ok(Outcome::Cancelled),
    };
    log_devices(&devices);

    let Some(target) = find_target(&devices, &settings.device_name) else {
        warn!(
            device_name = %settings.device_name,
            "target device not found; check the detected names and adjust device_name in the config file or --device-name"
        );
        tokio::select! {
            () = tokio::time::sleep(timings.not_found_cooldown) => {}
            () = &mut shutdown => {}
        }
        return Ok(Outcome::NotFound);
    };
    let target_name = target.name.as_deref().unwrap_or_default();
    info!(target_name, address = %target.address, "target device found");

    let mut connecting = central.connect(target.address);
    let settled = tokio::select! {
        result = &mut connecting => Some(result),
        () = &mut shutdown => None,
    };
    // an interrupted attempt may already hold the radio, so it runs to the end
    let (result, interrupted) = match settled {
        Some(result) => (result, false),
        None => {
            info!("interrupted while connecting, waiting for the attempt to settle");
            (connecting.await, true)
        }
    };
    let link = match result {
        Ok(link) => link,
        Err(error) if interrupted => {
            debug!(%error, "connection attempt failed after interrupt");
            return Ok(Outcome::Cancelled);
        }
        Err(error) => {
            warn!(%error, address = %target.address, "failed to connect");
            return Ok(Outcome::Failed(error));
        }
    };
    if interrupted {
        release(link.as_ref(), target).await;
        return Ok(Outcome::Cancelled);
    }
    info!(target_name, address = %target.address, "connected");

    let reason = stream_session(
        link.as_ref(),
        settings,
        publisher,
        timings.poll_interval,
        &mut shutdown,
    )
    .await;

    release(link.as_ref(), target).await;
    Ok(Outcome::Disconnected(reason))
}

/// Best-effort disconnect; failures are logged and otherwise ignored.
async fn release(link: &dyn Link, target: &DiscoveredDevice) {
    match link.disconnect().await {
        Ok(()) => info!(address = %target.address, "disconnected"),
        Err(error) => warn!(%error, "failed to disconnect"),
    }
}
