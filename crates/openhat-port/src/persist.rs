//! Persistent port state.
//!
//! Persistent ports write their state to a key/value store whenever it
//! changes, under keys of the form `<port id>.<field>`:
//!
//! | kind    | keys                          |
//! |---------|-------------------------------|
//! | digital | `Mode`, `Line`                |
//! | analog  | `Mode`, `Resolution`, `Value` |
//! | select  | `Position`                    |
//! | dial    | `Position`                    |
//!
//! The stored values are read back once during configuration, where they
//! take priority over the configured state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use openhat_core::constants::{
    KEY_LAST_CHANGE, KEY_LINE, KEY_MODE, KEY_POSITION, KEY_RESOLUTION, KEY_VALUE, persist_key,
};
use openhat_core::{Error, Result};
use tracing::{debug, info};

use crate::digital::line_text;
use crate::port::{Port, PortKind};

/// Backend of the persistent state.
pub trait PersistenceStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String);

    /// Write pending changes to the backing medium.
    fn save(&mut self) -> Result<()>;
}

/// The persisted fields of a port, or `None` for kinds that keep no state.
#[must_use]
pub fn persisted_fields(port: &Port) -> Option<Vec<(&'static str, String)>> {
    match port.kind() {
        PortKind::Digital(d) => Some(vec![
            (KEY_MODE, d.mode.to_string()),
            (KEY_LINE, line_text(d.line).to_string()),
        ]),
        PortKind::Analog(a) => Some(vec![
            (KEY_MODE, a.mode.to_string()),
            (KEY_RESOLUTION, a.resolution.to_string()),
            (KEY_VALUE, a.value.to_string()),
        ]),
        PortKind::Select(s) => Some(vec![(KEY_POSITION, s.position.to_string())]),
        PortKind::Dial(d) => Some(vec![(KEY_POSITION, d.position.to_string())]),
        PortKind::Custom(_) | PortKind::Streaming(_) => None,
    }
}

/// Write the state of `port` into `store`.
///
/// Returns `false` if the port kind keeps no persistent state.
///
/// # Errors
/// Fails with the port's value error; a port without a valid value is not
/// written.
pub fn write_port(store: &mut dyn PersistenceStore, port: &Port) -> Result<bool> {
    port.check_error()?;
    let Some(fields) = persisted_fields(port) else {
        debug!(
            "Unable to persist port state for: {}; unsupported port type: {}",
            port.id(),
            port.port_type()
        );
        return Ok(false);
    };
    for (field, value) in fields {
        port.log_debug(format_args!("Writing port state: {field} = {value}"));
        store.set(&persist_key(port.id(), field), value);
    }
    Ok(true)
}

/// Read the stored state of a port, keyed by field name.
#[must_use]
pub fn load_state(store: &dyn PersistenceStore, port_id: &str) -> BTreeMap<String, String> {
    [KEY_MODE, KEY_LINE, KEY_RESOLUTION, KEY_VALUE, KEY_POSITION]
        .into_iter()
        .filter_map(|field| {
            store
                .get(&persist_key(port_id, field))
                .map(|value| (field.to_string(), value))
        })
        .collect()
}

/// Record the time of the last save.
pub fn stamp_last_change(store: &mut dyn PersistenceStore) {
    store.set(
        KEY_LAST_CHANGE,
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
    );
}

/// In-memory store, for tests and for running without a state file.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

impl PersistenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        self.saves += 1;
        Ok(())
    }
}

/// Store backed by a TOML file holding one string entry per key.
///
/// ```toml
/// LastChange = "2026-10-19 08:15:02.114"
/// "Window.Position" = "2"
/// ```
#[derive(Debug)]
pub struct TomlFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl TomlFileStore {
    /// Open the file at `path`, creating an empty store if it does not exist.
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read or is not a table of
    /// strings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            info!("Loading persistent state from {}", path.display());
            toml::from_str(&fs::read_to_string(&path)?).map_err(|e| {
                Error::Persistence(format!("Unable to parse {}: {e}", path.display()))
            })?
        } else {
            info!(
                "Persistent state file {} does not exist; starting empty",
                path.display()
            );
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceStore for TomlFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        let content = toml::to_string(&self.entries)
            .map_err(|e| Error::Persistence(format!("Unable to encode state: {e}")))?;
        fs::write(&self.path, content).map_err(|e| {
            Error::Persistence(format!("Unable to write {}: {e}", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openhat_core::{ChangeSource, DirCaps, ValueError};

    #[test]
    fn test_digital_fields() {
        let mut port = Port::digital("Relay1", DirCaps::Output, 0);
        port.set_line(1, ChangeSource::User).unwrap();
        let mut store = MemoryStore::new();
        assert!(write_port(&mut store, &port).unwrap());
        assert_eq!(store.get("Relay1.Mode").as_deref(), Some("Output"));
        assert_eq!(store.get("Relay1.Line").as_deref(), Some("High"));
        assert_eq!(store.get("Relay1.Position"), None);
    }

    #[test]
    fn test_analog_fields() {
        let mut port = Port::analog("Dimmer", DirCaps::Output);
        port.set_analog_value(1000, ChangeSource::User).unwrap();
        let mut store = MemoryStore::new();
        write_port(&mut store, &port).unwrap();
        let state = load_state(&store, "Dimmer");
        assert_eq!(state["Mode"], "Output");
        assert_eq!(state["Resolution"], "12");
        assert_eq!(state["Value"], "1000");
    }

    #[test]
    fn test_port_in_error_not_written() {
        let mut port = Port::dial("Dial1", 0, 10, 1).unwrap();
        port.set_error(ValueError::NotAvailable);
        let mut store = MemoryStore::new();
        assert!(write_port(&mut store, &port).is_err());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_custom_port_not_persisted() {
        let port = Port::custom("Text", "guid");
        let mut store = MemoryStore::new();
        assert!(!write_port(&mut store, &port).unwrap());
    }

    #[test]
    fn test_toml_file_reopens_saved_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "# state\n\"Window.Position\" = \"2\"\n").unwrap();

        let mut store = TomlFileStore::open(&path).unwrap();
        assert_eq!(store.get("Window.Position").as_deref(), Some("2"));
        store.set("Relay1.Line", "High".to_string());
        store.set("Label.Text", "a \"quoted\" = value\n".to_string());
        stamp_last_change(&mut store);
        store.save().unwrap();

        let reopened = TomlFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("Relay1.Line").as_deref(), Some("High"));
        assert_eq!(
            reopened.get("Label.Text").as_deref(),
            Some("a \"quoted\" = value\n")
        );
        assert!(reopened.get(KEY_LAST_CHANGE).is_some());
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::open(dir.path().join("absent.toml")).unwrap();
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "Window.Position = 2\n").unwrap();
        assert!(matches!(
            TomlFileStore::open(&path),
            Err(Error::Persistence(_))
        ));
    }
}
