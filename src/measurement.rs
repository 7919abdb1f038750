//! Heart rate measurement data structure.

use std::fmt;

/// Raw RR-interval ticks per second (the profile reports RR in 1/1024 s).
pub const RR_TICKS_PER_SECOND: f64 = 1024.0;

/// Sensor contact state carried in bits 1-2 of the flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorContact {
    /// The sensor does not report skin contact
    #[default]
    Unsupported,
    /// Contact reporting is supported but the sensor is not touching skin
    NotDetected,
    /// Contact reporting is supported and contact is detected
    Detected,
}

/// One decoded heart rate measurement notification.
///
/// Optional fields mirror the presence flags of the source payload: `None`
/// and an empty RR list mean "not sent", never "zero".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Measurement {
    /// Heart rate in beats per minute
    pub heart_rate: u16,
    /// Skin contact state
    pub sensor_contact: SensorContact,
    /// Cumulative energy expended in joules since the last reset
    pub energy_expended: Option<u16>,
    /// RR intervals in seconds, in payload order
    pub rr_intervals: Vec<f64>,
}

impl Measurement {
    /// RR intervals converted back to raw 1/1024 s ticks.
    ///
    /// Every tick value `v` decodes to `v / 1024.0`, which is exact in `f64`,
    /// so rounding here recovers the original integer.
    ///
    /// Intervals the 16-bit field cannot carry saturate: negative and NaN
    /// values become 0, anything from 64 s upwards becomes `u16::MAX`.
    pub fn rr_interval_ticks(&self) -> impl Iterator<Item = u16> + '_ {
        self.rr_intervals.iter().map(|seconds| {
            let ticks = (seconds * RR_TICKS_PER_SECOND).round();
            if ticks.is_nan() {
                0
            } else {
                ticks.clamp(0.0, f64::from(u16::MAX)) as u16
            }
        })
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bpm", self.heart_rate)?;
        if let Some(energy) = self.energy_expended {
            write!(f, ", {energy} J")?;
        }
        if !self.rr_intervals.is_empty() {
            write!(f, ", RR {:?} s", self.rr_intervals)?;
        }
        Ok(())
    }
}
