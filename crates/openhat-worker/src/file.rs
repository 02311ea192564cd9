//! Switches whose device is a state file.
//!
//! Each port maps to one file holding the device's current payload, the way
//! a sysfs GPIO `value` file or a bridge daemon's state file does. Writes
//! replace the file content and report the new payload back to the port;
//! reads and queries return the trimmed content.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use openhat_core::{ConfigView, Error, Result};
use openhat_port::{PortConfigurator, PortHandle, PortValue};
use tracing::debug;

use crate::queue::ActionQueue;
use crate::switch::{BufferedSwitch, SwitchSettings};
use crate::worker::ActionHandler;

pub const NODE_FILE_SWITCH: &str = "FileSwitch";

/// Handler serving every file switch of the daemon.
#[derive(Debug, Default)]
pub struct FileDevice {
    files: HashMap<String, PathBuf>,
}

impl FileDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, port_id: impl Into<String>, path: impl Into<PathBuf>) {
        self.files.insert(port_id.into(), path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn path(&self, port: &PortHandle) -> Result<&Path> {
        self.files
            .get(port.id())
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::action_failed("FILE", format!("No file for port {}", port.id())))
    }
}

impl ActionHandler for FileDevice {
    fn read(&mut self, port: &PortHandle) -> Result<Option<PortValue>> {
        let content = fs::read_to_string(self.path(port)?)?;
        Ok(Some(PortValue::Text(content.trim().to_string())))
    }

    fn write(&mut self, port: &PortHandle, payload: &str) -> Result<()> {
        let path = self.path(port)?;
        debug!("{}: Writing '{}' to {}", port.id(), payload, path.display());
        fs::write(path, format!("{payload}\n"))?;
        port.buffer_value(PortValue::Text(payload.to_string()));
        Ok(())
    }
}

/// Register a digital port backed by the file named by `File`.
///
/// The payload mapping and timing come from [`SwitchSettings::from_config`].
/// Changes are queued on `queue`, which the worker running `device` serves.
///
/// # Errors
/// Fails on invalid settings or a missing `File` setting.
pub fn configure_file_switch(
    configurator: &PortConfigurator<'_>,
    device: &mut FileDevice,
    queue: &ActionQueue,
    id: &str,
    config: &ConfigView,
) -> Result<PortHandle> {
    let path = config.get_string("File", "", true)?;
    let settings = SwitchSettings::from_config(config)?;
    let port = configurator.digital_port(id, 0, config)?;
    let switch = Arc::new(Mutex::new(BufferedSwitch::new(settings, queue.clone())));
    let handle = configurator
        .runtime()
        .add_port_with_behavior(port, switch)?;
    device.add(id, path);
    Ok(handle)
}
