//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{
    BATTERY_LEVEL, BATTERY_SERVICE, Central, DeviceAddress, DiscoveredDevice, DiscoveryError,
    HEART_RATE_MEASUREMENT, HEART_RATE_SERVICE, Link, LinkError, Notifications, ScanMode,
};
use bluer::gatt::remote::Characteristic;
use bluer::{
    Adapter, AdapterEvent, Address, Device, DiscoveryFilter, DiscoveryTransport, ErrorKind,
    Session,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// How often to look for GATT services while BlueZ is still resolving them.
const SERVICE_RESOLVE_ATTEMPTS: usize = 10;
const SERVICE_RESOLVE_DELAY: Duration = Duration::from_millis(500);

impl From<bluer::Error> for LinkError {
    fn from(err: bluer::Error) -> Self {
        LinkError::Bluetooth(err.to_string())
    }
}

impl From<bluer::Error> for DiscoveryError {
    fn from(err: bluer::Error) -> Self {
        DiscoveryError::Bluetooth(err.to_string())
    }
}

/// The default BlueZ adapter.
pub struct BluerCentral {
    _session: Session,
    adapter: Adapter,
}

impl BluerCentral {
    /// Open a D-Bus session and power on the default adapter.
    pub async fn new() -> Result<Self, DiscoveryError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        debug!(adapter = adapter.name(), "using Bluetooth adapter");

        Ok(Self {
            _session: session,
            adapter,
        })
    }

    async fn apply_filter(&self, mode: ScanMode) -> Result<(), DiscoveryError> {
        let filter = match mode {
            ScanMode::Detailed => DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                ..Default::default()
            },
            ScanMode::Basic => DiscoveryFilter::default(),
        };

        match self.adapter.set_discovery_filter(filter).await {
            Ok(()) => Ok(()),
            Err(err) if matches!(err.kind, ErrorKind::NotSupported) => {
                Err(DiscoveryError::Unsupported(mode))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn scan(
        &self,
        mode: ScanMode,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        self.apply_filter(mode).await?;

        let mut events = Box::pin(self.adapter.discover_devices().await?);
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        let mut addresses: Vec<Address> = Vec::new();
        loop {
            tokio::select! {
                () = &mut deadline => break,
                event = events.next() => match event {
                    Some(event) => track_device(&mut addresses, event),
                    None => break,
                },
            }
        }
        // dropping the event stream ends discovery
        drop(events);

        let mut devices = Vec::with_capacity(addresses.len());
        for addr in addresses {
            match self.describe(addr, mode).await {
                Ok(device) => devices.push(device),
                Err(err) => debug!(address = %addr, error = %err, "skipping device"),
            }
        }

        Ok(devices)
    }

    /// Read the properties of one discovered device.
    async fn describe(
        &self,
        addr: Address,
        mode: ScanMode,
    ) -> Result<DiscoveredDevice, bluer::Error> {
        let device = self.adapter.device(addr)?;
        let name = device.name().await?;
        let service_uuids = match mode {
            ScanMode::Detailed => device
                .uuids()
                .await?
                .unwrap_or_default()
                .into_iter()
                .collect(),
            ScanMode::Basic => Vec::new(),
        };
        Ok(DiscoveredDevice {
            address: addr.into(),
            name,
            service_uuids,
        })
    }

    async fn open(&self, address: DeviceAddress) -> Result<Box<dyn Link>, LinkError> {
        let device = self.adapter.device(address.into())?;
        if !device.is_connected().await? {
            device.connect().await?;
        }

        match find_characteristics(&device).await {
            Ok((heart_rate, battery)) => Ok(Box::new(BluerLink {
                device,
                heart_rate,
                battery,
            })),
            Err(err) => {
                if let Err(disconnect_err) = device.disconnect().await {
                    warn!(error = %disconnect_err, "disconnect after failed setup");
                }
                Err(err)
            }
        }
    }
}

impl Central for BluerCentral {
    fn discover(
        &self,
        mode: ScanMode,
        duration: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredDevice>, DiscoveryError>> {
        self.scan(mode, duration).boxed()
    }

    fn connect(&self, address: DeviceAddress) -> BoxFuture<'_, Result<Box<dyn Link>, LinkError>> {
        self.open(address).boxed()
    }
}

/// Keep `addresses` in sync with the adapter's view, in first-seen order.
fn track_device(addresses: &mut Vec<Address>, event: AdapterEvent) {
    match event {
        AdapterEvent::DeviceAdded(addr) if !addresses.contains(&addr) => addresses.push(addr),
        AdapterEvent::DeviceRemoved(addr) => addresses.retain(|known| *known != addr),
        _ => {}
    }
}

async fn find_characteristic(
    device: &Device,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
) -> Result<Option<Characteristic>, bluer::Error> {
    for service in device.services().await? {
        if service.uuid().await? != service_uuid {
            continue;
        }
        for characteristic in service.characteristics().await? {
            if characteristic.uuid().await? == characteristic_uuid {
                return Ok(Some(characteristic));
            }
        }
    }
    Ok(None)
}

/// Locate the heart rate (required) and battery (optional) characteristics,
/// waiting for BlueZ to finish service resolution after connecting.
async fn find_characteristics(
    device: &Device,
) -> Result<(Characteristic, Option<Characteristic>), LinkError> {
    for _ in 0..SERVICE_RESOLVE_ATTEMPTS {
        if let Some(heart_rate) =
            find_characteristic(device, HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT).await?
        {
            let battery = find_characteristic(device, BATTERY_SERVICE, BATTERY_LEVEL).await?;
            if battery.is_none() {
                debug!("device has no battery level characteristic");
            }
            return Ok((heart_rate, battery));
        }
        tokio::time::sleep(SERVICE_RESOLVE_DELAY).await;
    }
    Err(LinkError::MissingCharacteristic(HEART_RATE_MEASUREMENT))
}

/// Connected BlueZ device with its resolved characteristics.
struct BluerLink {
    device: Device,
    heart_rate: Characteristic,
    battery: Option<Characteristic>,
}

impl Link for BluerLink {
    fn subscribe(&self) -> BoxFuture<'_, Result<Notifications, LinkError>> {
        async move {
            let stream = self.heart_rate.notify().await?;
            Ok(stream.boxed())
        }
        .boxed()
    }

    fn unsubscribe(&self, notifications: Notifications) -> BoxFuture<'_, Result<(), LinkError>> {
        async move {
            // BlueZ stops the notify session once the stream is dropped
            drop(notifications);
            Ok(())
        }
        .boxed()
    }

    fn read_battery_level(&self) -> BoxFuture<'_, Result<Vec<u8>, LinkError>> {
        async move {
            match &self.battery {
                Some(battery) => Ok(battery.read().await?),
                None => Err(LinkError::MissingCharacteristic(BATTERY_LEVEL)),
            }
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), LinkError>> {
        async move { Ok(self.device.disconnect().await?) }.boxed()
    }
}
