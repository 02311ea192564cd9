//! Dial port domain: a 64 bit position inside `min..=max`, aligned to `step`.

use openhat_core::constants::{DEFAULT_DIAL_MAX, DEFAULT_DIAL_MIN, DEFAULT_DIAL_STEP};
use openhat_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialState {
    pub min: i64,
    pub max: i64,
    pub step: u64,
    pub position: i64,
}

impl Default for DialState {
    fn default() -> Self {
        Self {
            min: DEFAULT_DIAL_MIN,
            max: DEFAULT_DIAL_MAX,
            step: DEFAULT_DIAL_STEP,
            position: DEFAULT_DIAL_MIN,
        }
    }
}

impl DialState {
    /// # Errors
    /// Returns `Error::Config` unless `min < max` and `step >= 1`.
    pub fn new(port: &str, min: i64, max: i64, step: u64) -> Result<Self> {
        if min >= max {
            return Err(Error::Config(format!(
                "{port}: Wrong dial port setting: Maximum ({max}) must be greater than Minimum ({min})"
            )));
        }
        if step < 1 {
            return Err(Error::Config(format!(
                "{port}: Wrong dial port setting: Step may not be negative or zero: {step}"
            )));
        }
        Ok(Self {
            min,
            max,
            step,
            position: min,
        })
    }

    /// Check a requested position and align it down to the step grid.
    ///
    /// # Errors
    /// Returns `Error::Domain` if the position is outside `min..=max`.
    pub fn validate(&self, port: &str, position: i64) -> Result<i64> {
        if position < self.min {
            return Err(Error::domain(
                port,
                format!("Position must not be less than the minimum: {}", self.min),
            ));
        }
        if position > self.max {
            return Err(Error::domain(
                port,
                format!("Position must not be greater than the maximum: {}", self.max),
            ));
        }
        Ok(self.align(position))
    }

    /// Align a position inside the range down to the nearest step.
    #[must_use]
    pub fn align(&self, position: i64) -> i64 {
        let offset = i128::from(position) - i128::from(self.min);
        let step = i128::from(self.step);
        // result lies between min and position
        (i128::from(self.min) + offset / step * step) as i64
    }

    /// The closest valid position to `position`.
    #[must_use]
    pub fn normalize(&self, position: i64) -> i64 {
        self.align(position.clamp(self.min, self.max))
    }

    /// Move the minimum, shifting the maximum if it would be crossed.
    ///
    /// # Errors
    /// Returns `Error::Domain` if the shifted maximum does not fit an `i64`.
    pub fn shift_min(&mut self, port: &str, min: i64) -> Result<()> {
        if min >= self.max {
            self.max = i64::try_from(i128::from(min) + self.width()).map_err(|_| {
                Error::domain(port, format!("Minimum leaves no room for the range: {min}"))
            })?;
        }
        self.min = min;
        Ok(())
    }

    /// Move the maximum, shifting the minimum if it would be crossed.
    ///
    /// # Errors
    /// Returns `Error::Domain` if the shifted minimum does not fit an `i64`.
    pub fn shift_max(&mut self, port: &str, max: i64) -> Result<()> {
        if max <= self.min {
            self.min = i64::try_from(i128::from(max) - self.width()).map_err(|_| {
                Error::domain(port, format!("Maximum leaves no room for the range: {max}"))
            })?;
        }
        self.max = max;
        Ok(())
    }

    fn width(&self) -> i128 {
        (i128::from(self.max) - i128::from(self.min)).max(1)
    }
}
