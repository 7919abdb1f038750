//! Outbound publishing of decoded measurements.
//!
//! This module provides a trait for sending a heart rate value to another
//! process and the OSC-over-UDP implementation used by the binary.

pub mod osc;

use std::io;
use thiserror::Error;

/// Errors from a single publish attempt.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Send failed: {0}")]
    Io(#[from] io::Error),
    #[error("Message encoding failed: {0}")]
    Encode(String),
}

/// Trait for forwarding heart rate values.
///
/// Implementations are fire-and-forget: no acknowledgement is awaited and a
/// returned error only describes the local send.
pub trait Publisher: Send + Sync {
    /// Send `heart_rate` as a single-value message under `path`.
    fn publish(&self, path: &str, heart_rate: u16) -> Result<(), PublishError>;
}
