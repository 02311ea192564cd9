//! Runtime constants shared by the OpenHAT crates.
//!
//! Constants are grouped by the component that owns them. Timing values are
//! in milliseconds unless the name says otherwise.
//!
//! # Usage
//!
//! ```
//! use openhat_core::constants::*;
//! use std::time::Duration;
//!
//! let tick = Duration::from_secs(1) / DEFAULT_TARGET_FPS;
//! assert_eq!(tick, Duration::from_millis(50));
//!
//! assert_eq!(persist_key("Relay1", KEY_LINE), "Relay1.Line");
//! ```

// ============================================================================
// Scheduler
// ============================================================================

/// Default number of scheduler ticks per second.
pub const DEFAULT_TARGET_FPS: u32 = 20;

/// Minimum time between two refresh notifications of the same port.
pub const MIN_REFRESH_INTERVAL_MS: u64 = 1000;

/// Length of the statistics window in microseconds.
///
/// Frames per second and load are computed once this much wall time has
/// been accumulated by the poll loop.
pub const STATS_WINDOW_US: u64 = 1_000_000;

/// Load percentage above which the scheduler reports a slow work loop.
pub const HIGH_LOAD_PERCENT: f64 = 90.0;

// ============================================================================
// Worker
// ============================================================================

/// Bounded wait of a worker's dequeue before it re-checks the shutdown flag.
pub const ACTION_QUEUE_POLL_MS: u64 = 100;

// ============================================================================
// Port Flags
// ============================================================================

/// Digital input is always operated with the internal pullup.
pub const DIGITAL_PULLUP_ALWAYS: u32 = 0x0002;

/// Digital input is always operated with the internal pulldown.
pub const DIGITAL_PULLDOWN_ALWAYS: u32 = 0x0008;

/// Analog port supports 8 bit resolution.
pub const ANALOG_RESOLUTION_8: u32 = 0x0100;

/// Analog port supports 9 bit resolution.
pub const ANALOG_RESOLUTION_9: u32 = 0x0200;

/// Analog port supports 10 bit resolution.
pub const ANALOG_RESOLUTION_10: u32 = 0x0400;

/// Analog port supports 11 bit resolution.
pub const ANALOG_RESOLUTION_11: u32 = 0x0800;

/// Analog port supports 12 bit resolution.
pub const ANALOG_RESOLUTION_12: u32 = 0x1000;

/// All analog resolution flags combined.
pub const ANALOG_ALL_RESOLUTIONS: u32 = ANALOG_RESOLUTION_8
    | ANALOG_RESOLUTION_9
    | ANALOG_RESOLUTION_10
    | ANALOG_RESOLUTION_11
    | ANALOG_RESOLUTION_12;

// ============================================================================
// Port Domains
// ============================================================================

/// Smallest supported analog resolution in bits.
pub const MIN_ANALOG_RESOLUTION: u8 = 8;

/// Largest supported analog resolution in bits.
pub const MAX_ANALOG_RESOLUTION: u8 = 12;

/// Analog resolution of a freshly created port.
pub const DEFAULT_ANALOG_RESOLUTION: u8 = 12;

/// Maximum number of labels of a select port.
pub const MAX_SELECT_LABELS: usize = 65535;

/// Default dial port range and step.
pub const DEFAULT_DIAL_MIN: i64 = 0;
pub const DEFAULT_DIAL_MAX: i64 = 100;
pub const DEFAULT_DIAL_STEP: u64 = 1;

/// Returns the resolution flag for a given bit count, if supported.
///
/// # Examples
///
/// ```
/// use openhat_core::constants::{analog_resolution_flag, ANALOG_RESOLUTION_10};
///
/// assert_eq!(analog_resolution_flag(10), Some(ANALOG_RESOLUTION_10));
/// assert_eq!(analog_resolution_flag(16), None);
/// ```
#[must_use]
pub fn analog_resolution_flag(bits: u8) -> Option<u32> {
    match bits {
        8 => Some(ANALOG_RESOLUTION_8),
        9 => Some(ANALOG_RESOLUTION_9),
        10 => Some(ANALOG_RESOLUTION_10),
        11 => Some(ANALOG_RESOLUTION_11),
        12 => Some(ANALOG_RESOLUTION_12),
        _ => None,
    }
}

// ============================================================================
// Persistence Keys
// ============================================================================

pub const KEY_MODE: &str = "Mode";
pub const KEY_LINE: &str = "Line";
pub const KEY_RESOLUTION: &str = "Resolution";
pub const KEY_VALUE: &str = "Value";
pub const KEY_POSITION: &str = "Position";

/// Timestamp entry written on every save of the persistent store.
pub const KEY_LAST_CHANGE: &str = "LastChange";

/// Builds a persistence key of the form `<port_id>.<field>`.
#[must_use]
pub fn persist_key(port_id: &str, field: &str) -> String {
    format!("{port_id}.{field}")
}
