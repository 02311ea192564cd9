//! Settings of a window node.

use std::str::FromStr;
use std::time::Duration;

use openhat_core::{ConfigView, Error, Result};

/// How the motor is wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMode {
    /// Two motor lines select the direction; the enable line is optional.
    HBridge {
        motor_a: String,
        motor_b: String,
        enable: Option<String>,
        /// Time the motor keeps running after the end was reached.
        motor_delay: Duration,
    },
    /// One relay selects the direction, a second one switches the power.
    SerialRelay { direction: String, enable: String },
}

impl ControlMode {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ControlMode::HBridge { .. } => "H-Bridge",
            ControlMode::SerialRelay { .. } => "SerialRelay",
        }
    }
}

/// Where a reset port sends a window that is in error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetTo {
    #[default]
    Off,
    Closed,
    Open,
}

impl FromStr for ResetTo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Off" => Ok(ResetTo::Off),
            "Closed" => Ok(ResetTo::Closed),
            "Open" => Ok(ResetTo::Open),
            other => Err(Error::Config(format!(
                "Invalid value for the ResetTo setting; expected 'Off', 'Closed' or 'Open': {other}"
            ))),
        }
    }
}

/// An end position sensor and the line that signals it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub port: String,
    pub active: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub mode: ControlMode,
    pub enable_delay: Duration,
    pub sensor_closed: Option<SensorConfig>,
    pub sensor_open: Option<SensorConfig>,
    /// Line level that drives a motor or direction output.
    pub motor_active: u8,
    pub enable_active: u8,
    pub opening_time: Duration,
    pub closing_time: Duration,
    pub auto_open: String,
    pub auto_close: String,
    pub force_open: String,
    pub force_close: String,
    pub status_port: Option<String>,
    pub error_ports: String,
    pub reset_ports: String,
    pub reset_to: ResetTo,
    pub position_after_close: Option<u16>,
    pub position_after_open: Option<u16>,
}

impl WindowConfig {
    /// An H-Bridge window without sensors or auxiliary ports.
    pub fn h_bridge(motor_a: impl Into<String>, motor_b: impl Into<String>, travel: Duration) -> Self {
        Self::with_mode(
            ControlMode::HBridge {
                motor_a: motor_a.into(),
                motor_b: motor_b.into(),
                enable: None,
                motor_delay: Duration::ZERO,
            },
            travel,
        )
    }

    /// A serial relay window without sensors or auxiliary ports.
    pub fn serial_relay(direction: impl Into<String>, enable: impl Into<String>, travel: Duration) -> Self {
        Self::with_mode(
            ControlMode::SerialRelay {
                direction: direction.into(),
                enable: enable.into(),
            },
            travel,
        )
    }

    fn with_mode(mode: ControlMode, travel: Duration) -> Self {
        Self {
            mode,
            enable_delay: Duration::ZERO,
            sensor_closed: None,
            sensor_open: None,
            motor_active: 1,
            enable_active: 1,
            opening_time: travel,
            closing_time: travel,
            auto_open: String::new(),
            auto_close: String::new(),
            force_open: String::new(),
            force_close: String::new(),
            status_port: None,
            error_ports: String::new(),
            reset_ports: String::new(),
            reset_to: ResetTo::Off,
            position_after_close: None,
            position_after_open: None,
        }
    }

    /// Read and validate the window keys of a node.
    ///
    /// # Errors
    /// Returns a configuration error for missing control ports, negative
    /// delays, non binary line levels, non positive travel times and
    /// conflicting force settings.
    pub fn from_config(config: &ConfigView) -> Result<Self> {
        let id = config.name().to_string();
        let enable_delay = millis(config, "EnableDelay")?;

        let control_mode = config.get_string("ControlMode", "", true)?;
        let mode = match control_mode.as_str() {
            "H-Bridge" => {
                let motor_delay = millis(config, "MotorDelay")?;
                if enable_delay < motor_delay {
                    return Err(Error::Config(format!(
                        "{id}: If using MotorDelay, EnableDelay must be greater or equal: {}",
                        enable_delay.as_millis()
                    )));
                }
                ControlMode::HBridge {
                    motor_a: config.get_string("MotorA", "", true)?,
                    motor_b: config.get_string("MotorB", "", true)?,
                    enable: optional(config.get_string("Enable", "", false)?),
                    motor_delay,
                }
            }
            "SerialRelay" => ControlMode::SerialRelay {
                direction: config.get_string("Direction", "", true)?,
                enable: config.get_string("Enable", "", true)?,
            },
            other => {
                return Err(Error::Config(format!(
                    "{id}: ControlMode setting not supported; expected 'H-Bridge' or 'SerialRelay': {other}"
                )));
            }
        };

        if !config.get_string("Sensor", "", false)?.is_empty() {
            return Err(Error::Config(format!(
                "{id}: Setting 'Sensor' is deprecated, please use 'SensorClosed' instead"
            )));
        }

        let sensor_closed = sensor(config, "SensorClosed")?;
        let sensor_open = sensor(config, "SensorOpen")?;
        let motor_active = binary(config, "MotorActive")?;
        let enable_active = binary(config, "EnableActive")?;

        let opening = config.get_int64("OpeningTime", 0, false)?;
        if opening <= 0 {
            return Err(Error::Config(format!(
                "{id}: OpeningTime must be specified and greater than 0: {opening}"
            )));
        }
        let closing = config.get_int64("ClosingTime", opening, false)?;
        if closing <= 0 {
            return Err(Error::Config(format!(
                "{id}: ClosingTime must be greater than 0: {closing}"
            )));
        }

        let force_open = config.get_string("ForceOpen", "", false)?;
        let force_close = config.get_string("ForceClose", "", false)?;
        if !force_open.is_empty() && !force_close.is_empty() {
            return Err(Error::Config(format!(
                "{id}: You cannot use ForceOpen and ForceClose at the same time"
            )));
        }

        Ok(Self {
            mode,
            enable_delay,
            sensor_closed,
            sensor_open,
            motor_active,
            enable_active,
            opening_time: Duration::from_millis(opening.unsigned_abs()),
            closing_time: Duration::from_millis(closing.unsigned_abs()),
            auto_open: config.get_string("AutoOpen", "", false)?,
            auto_close: config.get_string("AutoClose", "", false)?,
            force_open,
            force_close,
            status_port: optional(config.get_string("StatusPort", "", false)?),
            error_ports: config.get_string("ErrorPorts", "", false)?,
            reset_ports: config.get_string("ResetPorts", "", false)?,
            reset_to: config.get_string("ResetTo", "Off", false)?.parse()?,
            position_after_close: position_after(config, "PositionAfterClose")?,
            position_after_open: position_after(config, "PositionAfterOpen")?,
        })
    }

    /// Output line for an active (`true`) or inactive motor signal.
    #[must_use]
    pub fn motor_line(&self, active: bool) -> u8 {
        level(self.motor_active, active)
    }

    #[must_use]
    pub fn enable_line(&self, active: bool) -> u8 {
        level(self.enable_active, active)
    }

    #[must_use]
    pub fn enable_port(&self) -> Option<&str> {
        match &self.mode {
            ControlMode::HBridge { enable, .. } => enable.as_deref(),
            ControlMode::SerialRelay { enable, .. } => Some(enable),
        }
    }

    #[must_use]
    pub fn motor_delay(&self) -> Duration {
        match &self.mode {
            ControlMode::HBridge { motor_delay, .. } => *motor_delay,
            ControlMode::SerialRelay { .. } => Duration::ZERO,
        }
    }
}

fn level(active_level: u8, active: bool) -> u8 {
    if active == (active_level == 1) { 1 } else { 0 }
}

fn optional(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn millis(config: &ConfigView, key: &str) -> Result<Duration> {
    let value = config.get_int64(key, 0, false)?;
    if value < 0 {
        return Err(Error::Config(format!(
            "{}: {key} may not be negative: {value}",
            config.name()
        )));
    }
    Ok(Duration::from_millis(value.unsigned_abs()))
}

fn binary(config: &ConfigView, key: &str) -> Result<u8> {
    match config.get_int(key, 1, false)? {
        0 => Ok(0),
        1 => Ok(1),
        other => Err(Error::Config(format!(
            "{}: {key} must be either 0 or 1: {other}",
            config.name()
        ))),
    }
}

fn sensor(config: &ConfigView, key: &str) -> Result<Option<SensorConfig>> {
    let active = binary(config, &format!("{key}Value"))?;
    Ok(optional(config.get_string(key, "", false)?).map(|port| SensorConfig { port, active }))
}

fn position_after(config: &ConfigView, key: &str) -> Result<Option<u16>> {
    let value = config.get_int64(key, -1, false)?;
    if value < 0 {
        return Ok(None);
    }
    u16::try_from(value).map(Some).map_err(|_| Error::InvalidSetting {
        key: format!("{}.{key}", config.name()),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const H_BRIDGE: &[(&str, &str)] = &[
        ("ControlMode", "H-Bridge"),
        ("MotorA", "MotorA"),
        ("MotorB", "MotorB"),
        ("OpeningTime", "20000"),
    ];

    fn view(extra: &[(&str, &str)]) -> ConfigView {
        ConfigView::from_pairs(
            "Window",
            H_BRIDGE
                .iter()
                .chain(extra.iter())
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn test_h_bridge_defaults() {
        let config = WindowConfig::from_config(&view(&[])).unwrap();
        assert_eq!(config.mode.name(), "H-Bridge");
        assert_eq!(config.enable_port(), None);
        assert_eq!(config.closing_time, Duration::from_secs(20));
        assert_eq!(config.reset_to, ResetTo::Off);
        assert_eq!(config.position_after_close, None);
        assert_eq!(config.motor_line(true), 1);
        assert_eq!(config.enable_line(false), 0);
    }

    #[test]
    fn test_serial_relay_requires_both_ports() {
        let config = ConfigView::from_pairs(
            "Window",
            [("ControlMode", "SerialRelay"), ("Direction", "Dir"), ("OpeningTime", "5")],
        );
        assert!(WindowConfig::from_config(&config).is_err());
    }

    #[test]
    fn test_inverted_levels() {
        let config =
            WindowConfig::from_config(&view(&[("MotorActive", "0"), ("EnableActive", "0")])).unwrap();
        assert_eq!(config.motor_line(true), 0);
        assert_eq!(config.motor_line(false), 1);
        assert_eq!(config.enable_line(true), 0);
    }

    #[rstest]
    #[case(&[("ControlMode", "Stepper")])]
    #[case(&[("EnableDelay", "-1")])]
    #[case(&[("MotorDelay", "500"), ("EnableDelay", "100")])]
    #[case(&[("Sensor", "Reed")])]
    #[case(&[("SensorClosedValue", "2")])]
    #[case(&[("SensorOpenValue", "2")])]
    #[case(&[("MotorActive", "3")])]
    #[case(&[("OpeningTime", "0")])]
    #[case(&[("ClosingTime", "-5")])]
    #[case(&[("ForceOpen", "Rain"), ("ForceClose", "Wind")])]
    #[case(&[("ResetTo", "Auto")])]
    fn test_invalid_settings(#[case] extra: &[(&str, &str)]) {
        // later pairs override the base settings
        assert!(WindowConfig::from_config(&view(extra)).is_err());
    }

    #[test]
    fn test_optional_ports_and_positions() {
        let config = WindowConfig::from_config(&view(&[
            ("SensorClosed", "Reed"),
            ("SensorClosedValue", "0"),
            ("Enable", "Power"),
            ("EnableDelay", "300"),
            ("MotorDelay", "200"),
            ("StatusPort", "Status"),
            ("ResetTo", "Closed"),
            ("PositionAfterClose", "3"),
        ]))
        .unwrap();
        assert_eq!(
            config.sensor_closed,
            Some(SensorConfig {
                port: "Reed".to_string(),
                active: 0
            })
        );
        assert!(config.sensor_open.is_none());
        assert_eq!(config.enable_port(), Some("Power"));
        assert_eq!(config.motor_delay(), Duration::from_millis(200));
        assert_eq!(config.status_port.as_deref(), Some("Status"));
        assert_eq!(config.reset_to, ResetTo::Closed);
        assert_eq!(config.position_after_close, Some(3));
        assert_eq!(config.position_after_open, None);
    }
}
