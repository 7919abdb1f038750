//! Bluetooth LE collaborator abstraction.
//!
//! The session controller only talks to the [`Central`] and [`Link`] traits so
//! it can be driven by fakes in tests. The BlueZ backend lives in [`bluer`].

#[cfg(feature = "bluer")]
pub mod bluer;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Heart Rate service (0x180D).
pub const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic (0x2A37).
pub const HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);
/// Battery service (0x180F).
pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic (0x2A19).
pub const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Errors from an open link or from opening one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// The device does not expose a required characteristic
    #[error("Characteristic {0} not found on device")]
    MissingCharacteristic(Uuid),
    /// The notification stream ended
    #[error("Notification stream closed")]
    Closed,
}

/// Errors from a discovery scan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    /// The platform cannot run the requested scan mode
    #[error("Scan mode '{0}' not supported by this adapter")]
    Unsupported(ScanMode),
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// How much metadata a discovery scan collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// LE-filtered scan collecting advertised service UUIDs
    Detailed,
    /// Unfiltered scan collecting only names and addresses
    Basic,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Detailed => write!(f, "detailed"),
            ScanMode::Basic => write!(f, "basic"),
        }
    }
}

/// A Bluetooth device address stored as 6 bytes, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceAddress(pub [u8; 6]);

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[cfg(feature = "bluer")]
impl From<::bluer::Address> for DeviceAddress {
    fn from(addr: ::bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<DeviceAddress> for ::bluer::Address {
    fn from(addr: DeviceAddress) -> Self {
        ::bluer::Address(addr.0)
    }
}

/// One entry of a discovery snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub address: DeviceAddress,
    /// Advertised or remote name, if the device sent one
    pub name: Option<String>,
    /// Advertised service UUIDs (empty for [`ScanMode::Basic`] scans)
    pub service_uuids: Vec<Uuid>,
}

impl DiscoveredDevice {
    /// Case-insensitive substring match of `pattern` against the device name.
    ///
    /// Devices that never sent a name do not match.
    pub fn name_matches(&self, pattern: &str) -> bool {
        self.name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(&pattern.to_lowercase()))
    }
}

/// Stream of raw Heart Rate Measurement payloads.
pub type Notifications = BoxStream<'static, Vec<u8>>;

/// Adapter-side operations: discovery and connecting.
pub trait Central: Send + Sync {
    /// Scan for nearby devices for `duration` and return them in discovery order.
    fn discover(
        &self,
        mode: ScanMode,
        duration: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredDevice>, DiscoveryError>>;

    /// Open a link to the device at `address`.
    fn connect(&self, address: DeviceAddress) -> BoxFuture<'_, Result<Box<dyn Link>, LinkError>>;
}

/// An open connection to one heart rate sensor.
pub trait Link: Send + Sync {
    /// Start Heart Rate Measurement notifications.
    fn subscribe(&self) -> BoxFuture<'_, Result<Notifications, LinkError>>;

    /// Stop the notifications started by [`Link::subscribe`].
    fn unsubscribe(&self, notifications: Notifications) -> BoxFuture<'_, Result<(), LinkError>>;

    /// Read the raw Battery Level characteristic value.
    fn read_battery_level(&self) -> BoxFuture<'_, Result<Vec<u8>, LinkError>>;

    /// Release the connection.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), LinkError>>;
}
