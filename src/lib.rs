//! `hrm-osc-bridge` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The heart rate codec lives in [`crate::heart_rate`]; the
//! run loop lives in [`crate::session`] where it can be tested
//! deterministically with an injected radio and publisher.

pub mod ble;
pub mod config;
pub mod heart_rate;
pub mod measurement;
pub mod output;
pub mod session;
pub mod status;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use ble::{Central, DeviceAddress, DiscoveredDevice, Link, LinkError};
pub use config::{Options, Settings};
pub use heart_rate::{DecodeError, decode, encode};
pub use measurement::{Measurement, SensorContact};
pub use output::Publisher;
pub use output::osc::OscPublisher;
pub use session::{Outcome, Timings, run};
pub use status::{PollError, PowerStatus};
