//! Rate limiting for repeated error messages.
//!
//! A message that repeats on every tick would flood the log at the target
//! frame rate. [`ErrorLog`] counts consecutive repeats of the same message
//! and only lets occurrences 1, 2, 4, 8, ... through, prefixed with the
//! repeat count.

use tracing::error;

#[derive(Debug, Default)]
pub struct ErrorLog {
    last_message: Option<String>,
    count: u32,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an occurrence of `message`. Returns the line to log, or `None`
    /// if this occurrence is suppressed.
    pub fn record(&mut self, message: &str) -> Option<String> {
        if self.last_message.as_deref() == Some(message) {
            self.count = self.count.saturating_add(1);
        } else {
            self.last_message = Some(message.to_string());
            self.count = 1;
        }
        if !self.count.is_power_of_two() {
            return None;
        }
        Some(if self.count > 1 {
            format!("({}) {}", self.count, message)
        } else {
            message.to_string()
        })
    }

    /// Count an occurrence and log it at error level unless suppressed.
    pub fn log(&mut self, message: &str) {
        if let Some(line) = self.record(message) {
            error!("{}", line);
        }
    }

    /// Consecutive occurrences of the current message.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }
}
