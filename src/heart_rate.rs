//! Heart Rate Measurement characteristic (0x2A37) codec.
//!
//! Layout, all integers little-endian:
//!
//! | field            | size     | present when          |
//! |------------------|----------|-----------------------|
//! | flags            | 1        | always                |
//! | heart rate       | 1 or 2   | always (bit 0 = u16)  |
//! | energy expended  | 2        | bit 3                 |
//! | RR intervals     | 2 each   | bit 4, up to the end  |
//!
//! Bits 1-2 carry sensor contact state, bits 5-7 are reserved and ignored.

use crate::measurement::{Measurement, RR_TICKS_PER_SECOND, SensorContact};
use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

bitflags! {
    /// Flags byte at the start of every measurement payload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const HEART_RATE_U16 = 1 << 0;
        const CONTACT_DETECTED = 1 << 1;
        const CONTACT_SUPPORTED = 1 << 2;
        const ENERGY_EXPENDED = 1 << 3;
        const RR_INTERVALS = 1 << 4;
    }
}

/// Payload field being read when decoding stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Flags,
    HeartRate,
    EnergyExpended,
    RrInterval,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Flags => "flags",
            Field::HeartRate => "heart rate",
            Field::EnergyExpended => "energy expended",
            Field::RrInterval => "RR interval",
        };
        f.write_str(name)
    }
}

/// Error returned when a payload does not hold the fields its flags announce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(
        "Truncated payload: {field} needs {needed} byte(s) at offset {offset}, {remaining} left"
    )]
    TruncatedPayload {
        field: Field,
        offset: usize,
        needed: usize,
        remaining: usize,
    },
}

/// Read position over a payload. Every read is bounds-checked up front.
struct Cursor<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, offset: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        &self.payload[self.offset..]
    }

    fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    fn truncated(&self, field: Field, needed: usize) -> DecodeError {
        DecodeError::TruncatedPayload {
            field,
            offset: self.offset,
            needed,
            remaining: self.remaining(),
        }
    }

    fn read_u8(&mut self, field: Field) -> Result<u8, DecodeError> {
        match self.rest().first() {
            Some(&byte) => {
                self.offset += 1;
                Ok(byte)
            }
            None => Err(self.truncated(field, 1)),
        }
    }

    fn read_u16_le(&mut self, field: Field) -> Result<u16, DecodeError> {
        match self.rest().split_first_chunk::<2>() {
            Some((bytes, _)) => {
                self.offset += 2;
                Ok(u16::from_le_bytes(*bytes))
            }
            None => Err(self.truncated(field, 2)),
        }
    }
}

fn sensor_contact(flags: Flags) -> SensorContact {
    if !flags.contains(Flags::CONTACT_SUPPORTED) {
        SensorContact::Unsupported
    } else if flags.contains(Flags::CONTACT_DETECTED) {
        SensorContact::Detected
    } else {
        SensorContact::NotDetected
    }
}

/// Decode a Heart Rate Measurement notification.
///
/// The result depends only on `payload`. A payload that ends before any field
/// its flags announce yields [`DecodeError::TruncatedPayload`]; a partially
/// decoded measurement is never returned.
///
/// # Example
/// ```
/// use hrm_osc_bridge::heart_rate::decode;
///
/// let m = decode(&[0x08, 0x4B, 0x0A, 0x00]).unwrap();
/// assert_eq!(m.heart_rate, 75);
/// assert_eq!(m.energy_expended, Some(10));
/// ```
pub fn decode(payload: &[u8]) -> Result<Measurement, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let flags = Flags::from_bits_retain(cursor.read_u8(Field::Flags)?);

    let heart_rate = if flags.contains(Flags::HEART_RATE_U16) {
        cursor.read_u16_le(Field::HeartRate)?
    } else {
        u16::from(cursor.read_u8(Field::HeartRate)?)
    };

    let energy_expended = if flags.contains(Flags::ENERGY_EXPENDED) {
        Some(cursor.read_u16_le(Field::EnergyExpended)?)
    } else {
        None
    };

    let mut rr_intervals = Vec::new();
    if flags.contains(Flags::RR_INTERVALS) {
        rr_intervals.reserve(cursor.remaining() / 2);
        while cursor.remaining() > 0 {
            let ticks = cursor.read_u16_le(Field::RrInterval)?;
            rr_intervals.push(f64::from(ticks) / RR_TICKS_PER_SECOND);
        }
    }

    Ok(Measurement {
        heart_rate,
        sensor_contact: sensor_contact(flags),
        energy_expended,
        rr_intervals,
    })
}

/// Encode a measurement into its canonical notification payload.
///
/// The 8-bit heart rate form is used whenever the value fits. RR intervals
/// are written as [`Measurement::rr_interval_ticks`], so out-of-range
/// intervals saturate instead of wrapping.
pub fn encode(measurement: &Measurement) -> Vec<u8> {
    let mut flags = Flags::empty();
    let wide = measurement.heart_rate > u16::from(u8::MAX);
    flags.set(Flags::HEART_RATE_U16, wide);
    match measurement.sensor_contact {
        SensorContact::Unsupported => {}
        SensorContact::NotDetected => flags |= Flags::CONTACT_SUPPORTED,
        SensorContact::Detected => flags |= Flags::CONTACT_SUPPORTED | Flags::CONTACT_DETECTED,
    }
    flags.set(Flags::ENERGY_EXPENDED, measurement.energy_expended.is_some());
    flags.set(Flags::RR_INTERVALS, !measurement.rr_intervals.is_empty());

    let mut payload = Vec::with_capacity(5 + 2 * measurement.rr_intervals.len());
    payload.push(flags.bits());
    if wide {
        payload.extend_from_slice(&measurement.heart_rate.to_le_bytes());
    } else {
        payload.push(measurement.heart_rate as u8);
    }
    if let Some(energy) = measurement.energy_expended {
        payload.extend_from_slice(&energy.to_le_bytes());
    }
    for ticks in measurement.rr_interval_ticks() {
        payload.extend_from_slice(&ticks.to_le_bytes());
    }
    payload
}
