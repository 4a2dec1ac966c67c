//! Volume percentage and its mapping to the encoder gain unit.

use std::fmt;

use crate::error::ValidationError;

pub const MIN_VOLUME: i64 = 0;
/// Values above 100 are a deliberate headroom allowance.
pub const MAX_VOLUME: i64 = 111;
pub const DEFAULT_VOLUME: u8 = 100;

/// Gain unit corresponding to 100%.
pub const GAIN_BASELINE: u32 = 256;

/// A validated volume percentage in `0..=111`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume(u8);

impl Volume {
    pub fn new(percent: i64) -> Result<Self, ValidationError> {
        if (MIN_VOLUME..=MAX_VOLUME).contains(&percent) {
            Ok(Self(percent as u8))
        } else {
            Err(ValidationError::VolumeOutOfRange(percent))
        }
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    /// `round(percent / 100 * 256)`
    pub fn gain(self) -> u32 {
        (self.0 as f64 / 100.0 * GAIN_BASELINE as f64).round() as u32
    }

    /// Gain as a linear multiplier (1.0 at 100%).
    pub fn factor(self) -> f64 {
        self.gain() as f64 / GAIN_BASELINE as f64
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(DEFAULT_VOLUME)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
