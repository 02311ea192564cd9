//! Flat key/value configuration views.
//!
//! The configuration loader is an external collaborator: it resolves the
//! layered configuration files and hands every node a flat map of
//! `key -> string`. A [`ConfigView`] wraps such a map and offers typed
//! getters with defaults and a `required` flag, section views for dotted keys
//! (`Labels.Off = 0`) and an overlay used to give persisted port state
//! priority over the configured state.
//!
//! Every key that is read is recorded, so that settings nobody consumed can
//! be reported once a node has been set up.
//!
//! # Example
//!
//! ```
//! use openhat_core::ConfigView;
//!
//! let config = ConfigView::from_pairs("Relay1", [("Type", "DigitalPort"), ("Line", "High")]);
//!
//! assert_eq!(config.get_string("Line", "Low", false).unwrap(), "High");
//! assert_eq!(config.get_int("OrderID", -1, false).unwrap(), -1);
//! assert_eq!(config.unused_keys(), vec!["Type".to_string()]);
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::warn;

use crate::{Error, Result};

/// A named view onto a flat configuration map.
///
/// Clones and section views share the same used-key record.
#[derive(Debug, Clone)]
pub struct ConfigView {
    name: String,
    prefix: String,
    values: Rc<BTreeMap<String, String>>,
    overlay: Rc<BTreeMap<String, String>>,
    used: Rc<RefCell<BTreeSet<String>>>,
}

impl ConfigView {
    /// Create a view over a complete node map.
    pub fn new(name: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            values: Rc::new(values),
            overlay: Rc::new(BTreeMap::new()),
            used: Rc::new(RefCell::new(BTreeSet::new())),
        }
    }

    /// Create a view from key/value pairs.
    pub fn from_pairs<I, K, V>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(name, values)
    }

    /// Name of the node this view belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return a view whose lookups consult `overlay` before the configured
    /// values.
    ///
    /// Keys of `overlay` are relative to this view. Used keys are still
    /// recorded on the shared record.
    pub fn with_overlay(&self, overlay: BTreeMap<String, String>) -> Self {
        let mut merged = (*self.overlay).clone();
        for (key, value) in overlay {
            merged.insert(self.full_key(&key), value);
        }
        Self {
            overlay: Rc::new(merged),
            ..self.clone()
        }
    }

    /// Return a view of all keys below `<section>.`.
    pub fn section(&self, section: &str) -> Self {
        Self {
            name: format!("{}.{}", self.name, section),
            prefix: format!("{}{}.", self.prefix, section),
            ..self.clone()
        }
    }

    /// Returns `true` if the key is present. Does not mark the key as used.
    pub fn has(&self, key: &str) -> bool {
        let full = self.full_key(key);
        self.overlay.contains_key(&full) || self.values.contains_key(&full)
    }

    /// Mark a key as consumed without reading it.
    pub fn add_used_key(&self, key: &str) {
        self.used.borrow_mut().insert(self.full_key(key));
    }

    /// Direct child keys of this view, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .keys()
            .chain(self.overlay.keys())
            .filter_map(|k| k.strip_prefix(self.prefix.as_str()))
            .map(|k| k.split('.').next().unwrap_or(k).to_string())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Read a string setting.
    ///
    /// An empty value counts as missing.
    ///
    /// # Errors
    /// Returns `Error::MissingConfig` if `required` is set and the key is
    /// missing or empty.
    pub fn get_string(&self, key: &str, default: &str, required: bool) -> Result<String> {
        match self.lookup(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ if required => Err(Error::MissingConfig(format!("{}.{}", self.name, key))),
            _ => Ok(default.to_string()),
        }
    }

    /// Read a 32 bit integer setting.
    ///
    /// # Errors
    /// Returns `Error::InvalidSetting` if the value is not an integer and
    /// `Error::MissingConfig` if a required key is missing.
    pub fn get_int(&self, key: &str, default: i32, required: bool) -> Result<i32> {
        self.get_parsed(key, default, required)
    }

    /// Read a 64 bit integer setting.
    ///
    /// # Errors
    /// Same as [`get_int`](Self::get_int).
    pub fn get_int64(&self, key: &str, default: i64, required: bool) -> Result<i64> {
        self.get_parsed(key, default, required)
    }

    /// Read a boolean setting.
    ///
    /// Accepts `true/false`, `yes/no`, `on/off` and `1/0`, case-insensitive.
    ///
    /// # Errors
    /// Returns `Error::InvalidSetting` for any other value.
    pub fn get_bool(&self, key: &str, default: bool, required: bool) -> Result<bool> {
        match self.lookup(key) {
            Some(value) if !value.is_empty() => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(Error::invalid_setting(self.qualified(key), value)),
            },
            _ if required => Err(Error::MissingConfig(self.qualified(key))),
            _ => Ok(default),
        }
    }

    /// Keys of this view that were never read.
    pub fn unused_keys(&self) -> Vec<String> {
        let used = self.used.borrow();
        self.values
            .keys()
            .filter(|k| k.starts_with(self.prefix.as_str()) && !used.contains(*k))
            .filter_map(|k| k.strip_prefix(self.prefix.as_str()))
            .map(str::to_string)
            .collect()
    }

    /// Log a warning for every unused key.
    pub fn warn_unused(&self) {
        for key in self.unused_keys() {
            warn!("{}: Unused configuration key: {}", self.name, key);
        }
    }

    fn get_parsed<T>(&self, key: &str, default: T, required: bool) -> Result<T>
    where
        T: std::str::FromStr,
    {
        match self.lookup(key) {
            Some(value) if !value.trim().is_empty() => value
                .trim()
                .parse()
                .map_err(|_| Error::invalid_setting(self.qualified(key), value)),
            _ if required => Err(Error::MissingConfig(self.qualified(key))),
            _ => Ok(default),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let full = self.full_key(key);
        self.used.borrow_mut().insert(full.clone());
        self.overlay
            .get(&full)
            .or_else(|| self.values.get(&full))
            .cloned()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn qualified(&self, key: &str) -> String {
        format!("{}.{}", self.name, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn window_config() -> ConfigView {
        ConfigView::from_pairs(
            "Window1",
            [
                ("ControlMode", "H-Bridge"),
                ("OpeningTime", "1000"),
                ("EnableDelay", ""),
                ("Labels.Off", "0"),
                ("Labels.Closed", "1"),
                ("Hidden", "yes"),
            ],
        )
    }

    #[test]
    fn test_required_string_missing() {
        let config = window_config();
        let err = config.get_string("MotorA", "", true).unwrap_err();
        assert!(matches!(err, Error::MissingConfig(ref key) if key == "Window1.MotorA"));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let config = window_config();
        assert_eq!(config.get_int("EnableDelay", 0, false).unwrap(), 0);
        assert!(config.get_int("EnableDelay", 0, true).is_err());
    }

    #[test]
    fn test_invalid_integer() {
        let config = ConfigView::from_pairs("P", [("OpeningTime", "fast")]);
        let err = config.get_int("OpeningTime", 0, false).unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { .. }));
    }

    #[rstest]
    #[case("true", true)]
    #[case("Yes", true)]
    #[case("on", true)]
    #[case("0", false)]
    #[case("FALSE", false)]
    fn test_bool_values(#[case] text: &str, #[case] expected: bool) {
        let config = ConfigView::from_pairs("P", [("Readonly", text)]);
        assert_eq!(config.get_bool("Readonly", !expected, false).unwrap(), expected);
    }

    #[test]
    fn test_section_keys_and_used_tracking() {
        let config = window_config();
        let labels = config.section("Labels");
        assert_eq!(labels.keys(), vec!["Closed".to_string(), "Off".to_string()]);
        assert_eq!(labels.get_int("Off", -1, true).unwrap(), 0);

        config.get_string("ControlMode", "", true).unwrap();
        let unused = config.unused_keys();
        assert!(unused.contains(&"Labels.Closed".to_string()));
        assert!(!unused.contains(&"Labels.Off".to_string()));
        assert!(!unused.contains(&"ControlMode".to_string()));
    }

    #[test]
    fn test_overlay_takes_priority_and_marks_base_key() {
        let config = ConfigView::from_pairs("Relay1", [("Line", "Low"), ("Mode", "Output")]);
        let mut persisted = BTreeMap::new();
        persisted.insert("Line".to_string(), "High".to_string());

        let state = config.with_overlay(persisted);
        assert_eq!(state.get_string("Line", "", false).unwrap(), "High");
        assert_eq!(state.get_string("Mode", "", false).unwrap(), "Output");
        assert!(config.unused_keys().is_empty());
    }

    #[test]
    fn test_top_level_keys() {
        let config = window_config();
        let keys = config.keys();
        assert!(keys.contains(&"Labels".to_string()));
        assert!(keys.contains(&"ControlMode".to_string()));
    }
}
