//! Digital port domain: a mode and a line that is either Low (0) or High (1).

use openhat_core::constants::{DIGITAL_PULLDOWN_ALWAYS, DIGITAL_PULLUP_ALWAYS};
use openhat_core::{DigitalMode, DirCaps, Error, Result};
use serde::{Deserialize, Serialize};

/// Committed value of a digital port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalState {
    pub mode: DigitalMode,
    pub line: u8,
}

impl DigitalState {
    /// Create the state for a port with the given capabilities.
    #[must_use]
    pub fn new(dir_caps: DirCaps, flags: u32) -> Self {
        Self {
            mode: default_mode(dir_caps, flags),
            line: 0,
        }
    }
}

/// The mode a port falls back to when its direction capability changes.
#[must_use]
pub fn default_mode(dir_caps: DirCaps, flags: u32) -> DigitalMode {
    match dir_caps {
        DirCaps::Output => DigitalMode::Output,
        DirCaps::Input | DirCaps::Bidi => input_mode(flags),
    }
}

fn input_mode(flags: u32) -> DigitalMode {
    if flags & DIGITAL_PULLUP_ALWAYS == DIGITAL_PULLUP_ALWAYS {
        DigitalMode::InputPullup
    } else if flags & DIGITAL_PULLDOWN_ALWAYS == DIGITAL_PULLDOWN_ALWAYS {
        DigitalMode::InputPulldown
    } else {
        DigitalMode::InputFloating
    }
}

/// Map a requested mode onto the mode the port actually supports.
///
/// A plain `Input` request resolves to the pullup or pulldown variant when
/// the port is wired that way.
///
/// # Errors
/// Returns `Error::Domain` if the port cannot operate in the requested mode.
pub fn resolve_mode(
    port: &str,
    dir_caps: DirCaps,
    flags: u32,
    requested: DigitalMode,
) -> Result<DigitalMode> {
    if dir_caps == DirCaps::Output {
        return match requested {
            DigitalMode::Output => Ok(DigitalMode::Output),
            _ => Err(Error::domain(
                port,
                "Cannot set output only digital port mode to input",
            )),
        };
    }
    match requested {
        DigitalMode::InputFloating => Ok(input_mode(flags)),
        DigitalMode::InputPullup if flags & DIGITAL_PULLUP_ALWAYS != DIGITAL_PULLUP_ALWAYS => {
            Err(Error::domain(
                port,
                "Digital port mode not supported; use mode 'Input with pullup'",
            ))
        }
        DigitalMode::InputPulldown if flags & DIGITAL_PULLDOWN_ALWAYS != DIGITAL_PULLDOWN_ALWAYS => {
            Err(Error::domain(
                port,
                "Digital port mode not supported; use mode 'Input with pulldown'",
            ))
        }
        DigitalMode::Output if dir_caps == DirCaps::Input => Err(Error::domain(
            port,
            "Cannot set input only digital port mode to 'Output'",
        )),
        mode => Ok(mode),
    }
}

/// # Errors
/// Returns `Error::Domain` for lines other than 0 and 1.
pub fn validate_line(port: &str, line: u8) -> Result<()> {
    if line > 1 {
        return Err(Error::domain(
            port,
            format!("Digital port line value not supported: {line}"),
        ));
    }
    Ok(())
}

/// Configuration text of a line.
#[must_use]
pub fn line_text(line: u8) -> &'static str {
    if line == 0 { "Low" } else { "High" }
}

/// # Errors
/// Returns `Error::Config` for anything but `Low` and `High`.
pub fn parse_line(text: &str) -> Result<u8> {
    match text {
        "Low" => Ok(0),
        "High" => Ok(1),
        _ => Err(Error::Config(format!(
            "Unknown Line specified; expected 'Low' or 'High': {text}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DirCaps::Output, 0, DigitalMode::Output)]
    #[case(DirCaps::Input, 0, DigitalMode::InputFloating)]
    #[case(DirCaps::Bidi, DIGITAL_PULLUP_ALWAYS, DigitalMode::InputPullup)]
    #[case(DirCaps::Bidi, DIGITAL_PULLDOWN_ALWAYS, DigitalMode::InputPulldown)]
    fn test_default_mode(#[case] caps: DirCaps, #[case] flags: u32, #[case] expected: DigitalMode) {
        assert_eq!(default_mode(caps, flags), expected);
    }

    #[test]
    fn test_input_maps_to_wired_pullup() {
        let mode = resolve_mode("D", DirCaps::Bidi, DIGITAL_PULLUP_ALWAYS, DigitalMode::InputFloating);
        assert_eq!(mode.unwrap(), DigitalMode::InputPullup);
    }

    #[test]
    fn test_pullup_requires_flag() {
        let err = resolve_mode("D", DirCaps::Bidi, 0, DigitalMode::InputPullup).unwrap_err();
        assert!(matches!(err, Error::Domain { .. }));
        assert!(resolve_mode("D", DirCaps::Bidi, 0, DigitalMode::InputPulldown).is_err());
    }

    #[test]
    fn test_direction_restrictions() {
        assert!(resolve_mode("D", DirCaps::Output, 0, DigitalMode::InputFloating).is_err());
        assert!(resolve_mode("D", DirCaps::Input, 0, DigitalMode::Output).is_err());
        assert_eq!(
            resolve_mode("D", DirCaps::Bidi, 0, DigitalMode::Output).unwrap(),
            DigitalMode::Output
        );
    }

    #[test]
    fn test_line_validation_and_text() {
        assert!(validate_line("D", 1).is_ok());
        assert!(validate_line("D", 2).is_err());
        assert_eq!(parse_line(line_text(1)).unwrap(), 1);
        assert_eq!(parse_line("Low").unwrap(), 0);
        assert!(parse_line("high").is_err());
    }
}
