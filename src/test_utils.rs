//! Fakes for the radio and publisher, shared by unit tests.

use crate::ble::{
    Central, DeviceAddress, DiscoveredDevice, DiscoveryError, Link, LinkError, Notifications,
    ScanMode,
};
use crate::output::{PublishError, Publisher};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, stream};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A named heart rate sensor whose address differs only in the last octet.
pub fn named_device(name: &str, last_octet: u8) -> DiscoveredDevice {
    DiscoveredDevice {
        address: DeviceAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last_octet]),
        name: Some(name.to_string()),
        service_uuids: vec![crate::ble::HEART_RATE_SERVICE],
    }
}

#[derive(Debug, Default)]
struct LinkState {
    payloads: Vec<Vec<u8>>,
    keep_open: bool,
    payload_spacing: Option<Duration>,
    battery_delay: Option<Duration>,
    subscribe_error: Option<LinkError>,
    unsubscribe_error: Option<LinkError>,
    battery: VecDeque<Result<Vec<u8>, LinkError>>,
    battery_reads: usize,
    calls: Vec<&'static str>,
}

/// Scripted [`Link`]. Clones share state so tests can inspect it afterwards.
#[derive(Debug, Clone, Default)]
pub struct FakeLink {
    state: Arc<Mutex<LinkState>>,
}

impl FakeLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notification payloads delivered after subscribing.
    pub fn with_payloads(self, payloads: Vec<Vec<u8>>) -> Self {
        self.state.lock().unwrap().payloads = payloads;
        self
    }

    /// Keep the notification stream open after the scripted payloads.
    pub fn keep_open(self) -> Self {
        self.state.lock().unwrap().keep_open = true;
        self
    }

    /// Deliver each scripted payload this long after the previous one.
    pub fn with_payload_spacing(self, spacing: Duration) -> Self {
        self.state.lock().unwrap().payload_spacing = Some(spacing);
        self
    }

    /// Make every battery read take `delay` before resolving.
    pub fn slow_battery(self, delay: Duration) -> Self {
        self.state.lock().unwrap().battery_delay = Some(delay);
        self
    }

    pub fn failing_subscribe(self, err: LinkError) -> Self {
        self.state.lock().unwrap().subscribe_error = Some(err);
        self
    }

    pub fn failing_unsubscribe(self, err: LinkError) -> Self {
        self.state.lock().unwrap().unsubscribe_error = Some(err);
        self
    }

    /// Battery read results, in order. Reads past the end return 75%.
    pub fn with_battery(self, reads: Vec<Result<Vec<u8>, LinkError>>) -> Self {
        self.state.lock().unwrap().battery = reads.into();
        self
    }

    pub fn battery_reads(&self) -> usize {
        self.state.lock().unwrap().battery_reads
    }

    /// Names of the subscribe/unsubscribe/disconnect calls made, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl Link for FakeLink {
    fn subscribe(&self) -> BoxFuture<'_, Result<Notifications, LinkError>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("subscribe");
        let result = match state.subscribe_error.take() {
            Some(err) => Err(err),
            None => {
                let payloads = match state.payload_spacing {
                    Some(spacing) => stream::iter(state.payloads.clone())
                        .then(move |payload| async move {
                            tokio::time::sleep(spacing).await;
                            payload
                        })
                        .boxed(),
                    None => stream::iter(state.payloads.clone()).boxed(),
                };
                if state.keep_open {
                    Ok(payloads.chain(stream::pending()).boxed())
                } else {
                    Ok(payloads.boxed())
                }
            }
        };
        async move { result }.boxed()
    }

    fn unsubscribe(&self, notifications: Notifications) -> BoxFuture<'_, Result<(), LinkError>> {
        drop(notifications);
        let mut state = self.state.lock().unwrap();
        state.calls.push("unsubscribe");
        let result = state.unsubscribe_error.take().map_or(Ok(()), Err);
        async move { result }.boxed()
    }

    fn read_battery_level(&self) -> BoxFuture<'_, Result<Vec<u8>, LinkError>> {
        let mut state = self.state.lock().unwrap();
        state.battery_reads += 1;
        let result = state.battery.pop_front().unwrap_or(Ok(vec![75]));
        let delay = state.battery_delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), LinkError>> {
        self.state.lock().unwrap().calls.push("disconnect");
        async { Ok(()) }.boxed()
    }
}

/// Scripted [`Central`] handing out a shared [`FakeLink`].
#[derive(Debug)]
pub struct FakeCentral {
    devices: Vec<DiscoveredDevice>,
    unsupported: Vec<ScanMode>,
    connect_error: Option<LinkError>,
    connect_delay: Option<Duration>,
    link: FakeLink,
    scans: Mutex<Vec<(ScanMode, Duration)>>,
    connects: Mutex<Vec<DeviceAddress>>,
}

impl FakeCentral {
    pub fn new(devices: Vec<DiscoveredDevice>, link: FakeLink) -> Self {
        Self {
            devices,
            unsupported: Vec::new(),
            connect_error: None,
            connect_delay: None,
            link,
            scans: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub fn basic_scan_only(mut self) -> Self {
        self.unsupported = vec![ScanMode::Detailed];
        self
    }

    pub fn without_scanning(mut self) -> Self {
        self.unsupported = vec![ScanMode::Detailed, ScanMode::Basic];
        self
    }

    pub fn failing_connect(mut self, err: LinkError) -> Self {
        self.connect_error = Some(err);
        self
    }

    /// Make connecting take `delay`, as when services resolve slowly.
    pub fn slow_connect(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn scans(&self) -> Vec<(ScanMode, Duration)> {
        self.scans.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<DeviceAddress> {
        self.connects.lock().unwrap().clone()
    }
}

impl Central for FakeCentral {
    fn discover(
        &self,
        mode: ScanMode,
        duration: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredDevice>, DiscoveryError>> {
        self.scans.lock().unwrap().push((mode, duration));
        async move {
            if self.unsupported.contains(&mode) {
                return Err(DiscoveryError::Unsupported(mode));
            }
            tokio::time::sleep(duration).await;
            Ok(self.devices.clone())
        }
        .boxed()
    }

    fn connect(&self, address: DeviceAddress) -> BoxFuture<'_, Result<Box<dyn Link>, LinkError>> {
        self.connects.lock().unwrap().push(address);
        async move {
            if let Some(delay) = self.connect_delay {
                tokio::time::sleep(delay).await;
            }
            match &self.connect_error {
                Some(err) => Err(err.clone()),
                None => Ok(Box::new(self.link.clone()) as Box<dyn Link>),
            }
        }
        .boxed()
    }
}

/// [`Publisher`] that records every publish, optionally failing them all.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, u16)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, u16)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, path: &str, heart_rate: u16) -> Result<(), PublishError> {
        self.sent.lock().unwrap().push((path.to_string(), heart_rate));
        if self.fail {
            return Err(PublishError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }
}
