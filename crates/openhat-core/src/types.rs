use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin of a port mutation.
///
/// Every state change carries its source so that cascades can be routed to
/// the `OnChangeInt` or `OnChangeUser` port list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeSource {
    /// Device, plugin or automation driven change.
    Internal,
    /// Operator driven change, usually arriving from the controller.
    User,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChangeSource::Internal => write!(f, "internal"),
            ChangeSource::User => write!(f, "user"),
        }
    }
}

/// Refresh policy of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RefreshMode {
    /// Not configured; resolved to [`RefreshMode::Auto`] by `prepare`.
    #[default]
    NotSet,
    /// Never notify the controller automatically.
    Off,
    /// Notify the controller every `RefreshTime` milliseconds.
    Periodic,
    /// Notify the controller whenever the value or the error changes.
    Auto,
}

impl FromStr for RefreshMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Off" => Ok(RefreshMode::Off),
            "Periodic" => Ok(RefreshMode::Periodic),
            "Auto" => Ok(RefreshMode::Auto),
            _ => Err(Error::Config(format!(
                "Unknown RefreshMode specified; expected 'Off', 'Periodic' or 'Auto': {s}"
            ))),
        }
    }
}

/// Sticky value error of a port.
///
/// A port whose error is not [`ValueError::Ok`] has no valid value; reading
/// its state fails until a new value is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueError {
    #[default]
    Ok,
    Expired,
    NotAvailable,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            ValueError::Ok => "Ok",
            ValueError::Expired => "Expired",
            ValueError::NotAvailable => "NotAvailable",
        };
        write!(f, "{}", text)
    }
}

/// Direction capability of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DirCaps {
    Input,
    Output,
    #[default]
    Bidi,
}

impl FromStr for DirCaps {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Input" => Ok(DirCaps::Input),
            "Output" => Ok(DirCaps::Output),
            "Bidi" => Ok(DirCaps::Bidi),
            _ => Err(Error::Config(format!(
                "Unknown DirCaps specified; expected 'Input', 'Output' or 'Bidi': {s}"
            ))),
        }
    }
}

/// Logging detail level used by the daemon and by individual ports.
///
/// Ordered from least to most verbose so that `port_level >= Verbose`
/// comparisons read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogVerbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
    Extreme,
}

impl LogVerbosity {
    /// Translate the verbosity into a `tracing` filter directive.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            LogVerbosity::Quiet => "error",
            LogVerbosity::Normal => "warn",
            LogVerbosity::Verbose => "info",
            LogVerbosity::Debug => "debug",
            LogVerbosity::Extreme => "trace",
        }
    }
}

impl FromStr for LogVerbosity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Quiet" => Ok(LogVerbosity::Quiet),
            "Normal" => Ok(LogVerbosity::Normal),
            "Verbose" => Ok(LogVerbosity::Verbose),
            "Debug" => Ok(LogVerbosity::Debug),
            "Extreme" => Ok(LogVerbosity::Extreme),
            _ => Err(Error::Config(format!(
                "Invalid LogVerbosity setting; expected 'Quiet', 'Normal', 'Verbose', 'Debug' or 'Extreme': {s}"
            ))),
        }
    }
}

/// Mode of a digital port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigitalMode {
    InputFloating,
    InputPullup,
    InputPulldown,
    Output,
}

impl DigitalMode {
    /// Wire code of the mode (0 to 3).
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            DigitalMode::InputFloating => 0,
            DigitalMode::InputPullup => 1,
            DigitalMode::InputPulldown => 2,
            DigitalMode::Output => 3,
        }
    }

    /// Create a mode from its wire code.
    ///
    /// # Errors
    /// Returns `Error::Config` for codes greater than 3.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(DigitalMode::InputFloating),
            1 => Ok(DigitalMode::InputPullup),
            2 => Ok(DigitalMode::InputPulldown),
            3 => Ok(DigitalMode::Output),
            _ => Err(Error::Config(format!("Digital port mode not supported: {code}"))),
        }
    }

    #[must_use]
    pub fn is_input(self) -> bool {
        self != DigitalMode::Output
    }
}

impl fmt::Display for DigitalMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            DigitalMode::InputFloating => "Input",
            DigitalMode::InputPullup => "Input with pullup",
            DigitalMode::InputPulldown => "Input with pulldown",
            DigitalMode::Output => "Output",
        };
        write!(f, "{}", text)
    }
}

impl FromStr for DigitalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Input" => Ok(DigitalMode::InputFloating),
            "Input with pullup" => Ok(DigitalMode::InputPullup),
            "Input with pulldown" => Ok(DigitalMode::InputPulldown),
            "Output" => Ok(DigitalMode::Output),
            _ => Err(Error::Config(format!(
                "Unknown Mode specified; expected 'Input', 'Input with pullup', 'Input with pulldown', or 'Output': {s}"
            ))),
        }
    }
}

/// Mode of an analog port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnalogMode {
    #[default]
    Input,
    Output,
}

impl fmt::Display for AnalogMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalogMode::Input => write!(f, "Input"),
            AnalogMode::Output => write!(f, "Output"),
        }
    }
}

impl FromStr for AnalogMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Input" => Ok(AnalogMode::Input),
            "Output" => Ok(AnalogMode::Output),
            _ => Err(Error::Config(format!(
                "Unknown mode specified; expected 'Input' or 'Output': {s}"
            ))),
        }
    }
}

/// Voltage reference of an analog port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnalogReference {
    #[default]
    Internal,
    External,
}

impl fmt::Display for AnalogReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalogReference::Internal => write!(f, "Internal"),
            AnalogReference::External => write!(f, "External"),
        }
    }
}
