//! Select port domain: a position into an immutable, ordered label list.

use openhat_core::constants::MAX_SELECT_LABELS;
use openhat_core::{ConfigView, Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectState {
    labels: Vec<String>,
    pub position: u16,
}

impl SelectState {
    /// # Errors
    /// Returns `Error::Config` for an empty label list or one with more
    /// than 65535 entries.
    pub fn new(port: &str, labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::Config(format!(
                "The select port {port} requires at least one label"
            )));
        }
        if labels.len() > MAX_SELECT_LABELS {
            return Err(Error::Config(format!(
                "{port}: Too many select port items: {}",
                labels.len()
            )));
        }
        Ok(Self {
            labels,
            position: 0,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Highest valid position.
    #[must_use]
    pub fn max_position(&self) -> u16 {
        // bounded by MAX_SELECT_LABELS
        (self.labels.len() - 1) as u16
    }

    /// # Errors
    /// Returns `Error::Domain` if the position is past the last label.
    pub fn validate(&self, port: &str, position: i64) -> Result<u16> {
        if position < 0 || position > i64::from(self.max_position()) {
            return Err(Error::domain(
                port,
                format!(
                    "Position must not exceed the number of items: {}",
                    self.max_position()
                ),
            ));
        }
        Ok(position as u16)
    }

    /// # Errors
    /// Same as [`validate`](Self::validate).
    pub fn label(&self, port: &str, position: u16) -> Result<&str> {
        let position = self.validate(port, i64::from(position))?;
        Ok(&self.labels[usize::from(position)])
    }
}

/// Read the ordered labels from a `Labels` section of `label = order` entries.
///
/// Entries are sorted by their order number; negative numbers disable a
/// label. Labels with the same number keep their key order.
///
/// # Errors
/// Returns a configuration error if an order is not numeric or no label is
/// active.
pub fn labels_from_config(port: &str, config: &ConfigView) -> Result<Vec<String>> {
    config.add_used_key("Labels");
    let section = config.section("Labels");
    let mut ordered: Vec<(i32, String)> = Vec::new();
    for key in section.keys() {
        let order = section.get_int(&key, 0, false)?;
        if order < 0 {
            continue;
        }
        ordered.push((order, key));
    }
    ordered.sort_by_key(|(order, _)| *order);
    if ordered.is_empty() {
        return Err(Error::MissingConfig(format!(
            "The select port {port} requires at least one label in its config section: {port}.Labels"
        )));
    }
    Ok(ordered.into_iter().map(|(_, label)| label).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Item{i}")).collect()
    }

    #[test]
    fn test_empty_labels_rejected() {
        assert!(SelectState::new("S", Vec::new()).is_err());
    }

    #[test]
    fn test_position_bounds_message() {
        let state = SelectState::new("S", labels(3)).unwrap();
        let err = state.validate("S", 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "S: Position must not exceed the number of items: 2"
        );
        assert_eq!(state.label("S", 2).unwrap(), "Item2");
    }

    #[test]
    fn test_labels_sorted_by_order() {
        let config = ConfigView::from_pairs(
            "Mode",
            [
                ("Labels.Heat", "2"),
                ("Labels.Off", "0"),
                ("Labels.Cool", "1"),
                ("Labels.Disabled", "-1"),
            ],
        );
        let labels = labels_from_config("Mode", &config).unwrap();
        assert_eq!(labels, vec!["Off", "Cool", "Heat"]);
        assert!(config.unused_keys().is_empty());
    }

    #[test]
    fn test_labels_required() {
        let config = ConfigView::from_pairs("Mode", [("Labels.Off", "-1")]);
        assert!(labels_from_config("Mode", &config).is_err());
    }

    proptest! {
        #[test]
        fn test_valid_positions(count in 1usize..50, position in -5i64..60) {
            let state = SelectState::new("S", labels(count)).unwrap();
            let valid = position >= 0 && (position as usize) < count;
            prop_assert_eq!(state.validate("S", position).is_ok(), valid);
        }
    }
}
