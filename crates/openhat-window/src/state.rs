//! States of the window motor state machine.
//!
//! # States
//!
//! - `Unknown`: first tick, after switching off or after a reset
//! - `UnknownWaiting`: initialized, waiting for a target
//! - `Closed` / `Open`: resting in an end position
//! - `WaitingAfterEnable`: motor power on, waiting before it may move
//! - `WaitingBeforeDisableOpen/Closed/Error`: end reached, waiting before
//!   power is removed
//! - `WaitingBeforeEnableOpening/Closing`: direction relay switching with
//!   power removed (serial relay only)
//! - `WaitingAfterDisable`: power removed during initialization (serial
//!   relay only)
//! - `Closing` / `Opening`: motor running
//! - `Error`: sensor or motor failure; left only through a reset port or a
//!   new position
//!
//! # Status Mapping
//!
//! A status port mirrors the states a user cares about:
//! `Unknown`=0, `Closed`=1, `Open`=2, `Closing`=3, `Opening`=4, `Error`=5.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Transitions kept per window for diagnostics.
pub(crate) const MAX_HISTORY_SIZE: usize = 32;

/// Select positions of a window port.
pub const POSITION_OFF: u16 = 0;
pub const POSITION_CLOSED: u16 = 1;
pub const POSITION_OPEN: u16 = 2;
pub const POSITION_AUTO: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Unknown,
    UnknownWaiting,
    Closed,
    Open,
    WaitingAfterEnable,
    WaitingBeforeDisableOpen,
    WaitingBeforeDisableClosed,
    WaitingBeforeDisableError,
    WaitingBeforeEnableOpening,
    WaitingBeforeEnableClosing,
    WaitingAfterDisable,
    Closing,
    Opening,
    Error,
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowState::Unknown => "UNKNOWN",
            WindowState::UnknownWaiting => "UNKNOWN_WAITING",
            WindowState::Closed => "CLOSED",
            WindowState::Open => "OPEN",
            WindowState::WaitingAfterEnable => "WAITING_AFTER_ENABLE",
            WindowState::WaitingBeforeDisableOpen => "WAITING_BEFORE_DISABLE_OPEN",
            WindowState::WaitingBeforeDisableClosed => "WAITING_BEFORE_DISABLE_CLOSED",
            WindowState::WaitingBeforeDisableError => "WAITING_BEFORE_DISABLE_ERROR",
            WindowState::WaitingBeforeEnableOpening => "WAITING_BEFORE_ENABLE_OPENING",
            WindowState::WaitingBeforeEnableClosing => "WAITING_BEFORE_ENABLE_CLOSING",
            WindowState::WaitingAfterDisable => "WAITING_AFTER_DISABLE",
            WindowState::Closing => "CLOSING",
            WindowState::Opening => "OPENING",
            WindowState::Error => "ERR",
        };
        f.write_str(name)
    }
}

impl WindowState {
    /// Position of the status port for this state, if it is mirrored.
    #[must_use]
    pub fn status_position(&self) -> Option<u16> {
        match self {
            WindowState::Unknown => Some(0),
            WindowState::Closed => Some(1),
            WindowState::Open => Some(2),
            WindowState::Closing => Some(3),
            WindowState::Opening => Some(4),
            WindowState::Error => Some(5),
            _ => None,
        }
    }

    /// States in which the window rests and the controller is notified.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            WindowState::Unknown | WindowState::Closed | WindowState::Open | WindowState::Error
        )
    }

    /// States that wipe the target.
    #[must_use]
    pub fn clears_target(&self) -> bool {
        matches!(self, WindowState::Unknown | WindowState::Error)
    }
}

/// Human readable name of a select position.
#[must_use]
pub fn position_name(position: u16) -> &'static str {
    match position {
        POSITION_OFF => "OFF",
        POSITION_CLOSED => "CLOSED",
        POSITION_OPEN => "OPEN",
        _ => "AUTOMATIC",
    }
}

/// A recorded change of the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: WindowState,
    pub to: WindowState,
    pub at: Instant,
}

/// Bounded record of the most recent transitions.
#[derive(Debug, Default)]
pub struct TransitionHistory {
    entries: VecDeque<StateTransition>,
}

impl TransitionHistory {
    pub(crate) fn push(&mut self, transition: StateTransition) {
        if self.entries.len() >= MAX_HISTORY_SIZE {
            self.entries.pop_front();
        }
        self.entries.push_back(transition);
    }

    /// States entered, oldest first.
    pub fn states(&self) -> Vec<WindowState> {
        self.entries.iter().map(|t| t.to).collect()
    }

    pub fn last(&self) -> Option<&StateTransition> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(WindowState::Unknown, Some(0))]
    #[case(WindowState::Closed, Some(1))]
    #[case(WindowState::Open, Some(2))]
    #[case(WindowState::Closing, Some(3))]
    #[case(WindowState::Opening, Some(4))]
    #[case(WindowState::Error, Some(5))]
    #[case(WindowState::UnknownWaiting, None)]
    #[case(WindowState::WaitingAfterEnable, None)]
    fn test_status_mapping(#[case] state: WindowState, #[case] expected: Option<u16>) {
        assert_eq!(state.status_position(), expected);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(WindowState::Error.to_string(), "ERR");
        assert_eq!(
            WindowState::WaitingBeforeEnableClosing.to_string(),
            "WAITING_BEFORE_ENABLE_CLOSING"
        );
        assert_eq!(position_name(POSITION_AUTO), "AUTOMATIC");
        assert_eq!(position_name(7), "AUTOMATIC");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = TransitionHistory::default();
        let now = Instant::now();
        for _ in 0..MAX_HISTORY_SIZE + 5 {
            history.push(StateTransition {
                from: WindowState::Open,
                to: WindowState::Closing,
                at: now,
            });
        }
        assert_eq!(history.len(), MAX_HISTORY_SIZE);
        assert_eq!(history.last().unwrap().to, WindowState::Closing);
    }
}
