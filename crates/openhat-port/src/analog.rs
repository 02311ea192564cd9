//! Analog port domain.
//!
//! The absolute value lives in `0..=2^resolution - 1`; out of range values
//! are clamped rather than rejected. The relative value is the absolute
//! value scaled to `0.0..=1.0`.

use openhat_core::constants::{
    DEFAULT_ANALOG_RESOLUTION, MAX_ANALOG_RESOLUTION, MIN_ANALOG_RESOLUTION,
    analog_resolution_flag,
};
use openhat_core::{AnalogMode, AnalogReference, Error, Result};
use serde::{Deserialize, Serialize};

/// Committed value of an analog port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogState {
    pub mode: AnalogMode,
    pub resolution: u8,
    pub reference: AnalogReference,
    pub value: i32,
}

impl Default for AnalogState {
    fn default() -> Self {
        Self {
            mode: AnalogMode::Input,
            resolution: DEFAULT_ANALOG_RESOLUTION,
            reference: AnalogReference::Internal,
            value: 0,
        }
    }
}

impl AnalogState {
    /// Largest absolute value at the current resolution.
    #[must_use]
    pub fn max_value(&self) -> i32 {
        (1i32 << self.resolution) - 1
    }

    /// Clamp a value into the range of the current resolution.
    #[must_use]
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(0, self.max_value())
    }

    #[must_use]
    pub fn relative(&self) -> f64 {
        f64::from(self.value) / f64::from(self.max_value())
    }

    /// Absolute value for a relative value; truncates toward zero.
    #[must_use]
    pub fn absolute_for(&self, relative: f64) -> i32 {
        // `as` saturates on overflow and maps NaN to 0
        self.clamp((relative * f64::from(self.max_value())) as i32)
    }
}

/// Check a resolution against the supported range and the port's flags.
///
/// # Errors
/// Returns `Error::Domain` if the resolution is outside 8..=12 bits or not
/// enabled by the port flags.
pub fn validate_resolution(port: &str, flags: u32, resolution: u8) -> Result<()> {
    if !(MIN_ANALOG_RESOLUTION..=MAX_ANALOG_RESOLUTION).contains(&resolution) {
        return Err(Error::domain(
            port,
            format!(
                "Analog port resolution not supported; allowed values are 8..12 (bits): {resolution}"
            ),
        ));
    }
    match analog_resolution_flag(resolution) {
        Some(flag) if flags & flag == flag => Ok(()),
        _ => Err(Error::domain(
            port,
            format!("Analog port resolution not supported (port flags): {resolution}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openhat_core::constants::{ANALOG_ALL_RESOLUTIONS, ANALOG_RESOLUTION_10};
    use proptest::prelude::*;

    #[test]
    fn test_default_state() {
        let state = AnalogState::default();
        assert_eq!(state.resolution, 12);
        assert_eq!(state.max_value(), 4095);
        assert_eq!(state.mode, AnalogMode::Input);
    }

    #[test]
    fn test_relative_conversion_truncates() {
        let state = AnalogState {
            resolution: 8,
            ..AnalogState::default()
        };
        assert_eq!(state.absolute_for(0.5), 127);
        assert_eq!(state.absolute_for(1.0), 255);
        assert_eq!(state.absolute_for(2.0), 255);
        assert_eq!(state.absolute_for(-1.0), 0);
        assert_eq!(state.absolute_for(f64::NAN), 0);
    }

    #[test]
    fn test_resolution_validation() {
        assert!(validate_resolution("A", ANALOG_ALL_RESOLUTIONS, 10).is_ok());
        assert!(validate_resolution("A", ANALOG_ALL_RESOLUTIONS, 7).is_err());
        assert!(validate_resolution("A", ANALOG_ALL_RESOLUTIONS, 13).is_err());
        assert!(validate_resolution("A", ANALOG_RESOLUTION_10, 12).is_err());
        assert!(validate_resolution("A", ANALOG_RESOLUTION_10, 10).is_ok());
    }

    proptest! {
        #[test]
        fn test_clamp_stays_in_range(resolution in 8u8..=12, value in any::<i32>()) {
            let state = AnalogState { resolution, ..AnalogState::default() };
            let clamped = state.clamp(value);
            prop_assert!(clamped >= 0 && clamped <= state.max_value());
        }

        #[test]
        fn test_relative_in_unit_interval(resolution in 8u8..=12, raw in 0i32..4096) {
            let mut state = AnalogState { resolution, ..AnalogState::default() };
            state.value = state.clamp(raw);
            let relative = state.relative();
            prop_assert!((0.0..=1.0).contains(&relative));
        }
    }
}
