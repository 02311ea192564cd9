//! Building ports and groups from node configuration.
//!
//! Every node section of the configuration file becomes one port or group.
//! The keys shared by all port kinds are read by
//! [`PortConfigurator::configure_port`]; the kind specific state keys are
//! read through a view that consults the persistent store first, so that a
//! persistent port comes back with the state it had at shutdown.

use std::str::FromStr;

use openhat_core::constants::{
    ANALOG_ALL_RESOLUTIONS, DEFAULT_DIAL_MAX, DEFAULT_DIAL_MIN, KEY_LINE, KEY_MODE, KEY_POSITION,
    KEY_RESOLUTION, KEY_VALUE,
};
use openhat_core::{
    AnalogMode, ChangeSource, ConfigView, DigitalMode, DirCaps, Error, LogVerbosity, RefreshMode,
    Result, ValueError,
};
use tracing::{debug, info};

use crate::digital::parse_line;
use crate::group::PortGroup;
use crate::persist;
use crate::port::Port;
use crate::runtime::Runtime;
use crate::select::labels_from_config;

/// Node types handled by [`PortConfigurator::configure_node`].
pub const NODE_DIGITAL: &str = "DigitalPort";
pub const NODE_ANALOG: &str = "AnalogPort";
pub const NODE_SELECT: &str = "SelectPort";
pub const NODE_DIAL: &str = "DialPort";
pub const NODE_CUSTOM: &str = "CustomPort";
pub const NODE_GROUP: &str = "Group";

pub struct PortConfigurator<'a> {
    rt: &'a Runtime,
    allow_hidden: bool,
}

impl<'a> PortConfigurator<'a> {
    pub fn new(rt: &'a Runtime, allow_hidden: bool) -> Self {
        Self { rt, allow_hidden }
    }

    pub fn runtime(&self) -> &'a Runtime {
        self.rt
    }

    /// Build and register the node `id` of type `node_type`.
    ///
    /// Returns `false` for node types this crate does not know, leaving them
    /// to other plugins.
    ///
    /// # Errors
    /// Fails on invalid settings and duplicate ids.
    pub fn configure_node(&self, id: &str, node_type: &str, config: &ConfigView) -> Result<bool> {
        let port = match node_type {
            NODE_DIGITAL => self.digital_port(id, 0, config)?,
            NODE_ANALOG => self.analog_port(id, ANALOG_ALL_RESOLUTIONS, config)?,
            NODE_SELECT => self.select_port(id, config)?,
            NODE_DIAL => self.dial_port(id, config)?,
            NODE_CUSTOM => self.custom_port(id, config)?,
            NODE_GROUP => {
                self.rt.add_group(self.group(id, config)?)?;
                return Ok(true);
            }
            _ => return Ok(false),
        };
        self.rt.add_port(port)?;
        Ok(true)
    }

    /// Read the keys every port understands.
    ///
    /// # Errors
    /// Fails on malformed values and on a periodic refresh without a valid
    /// `RefreshTime`.
    pub fn configure_port(&self, port: &mut Port, config: &ConfigView) -> Result<()> {
        if self.allow_hidden {
            port.set_hidden(config.get_bool("Hidden", port.is_hidden(), false)?);
        }
        port.set_readonly(config.get_bool("Readonly", port.is_readonly(), false)?);
        port.set_persistent(config.get_bool("Persistent", port.is_persistent(), false)?);
        port.set_label(config.get_string("Label", port.id(), false)?);

        if config.has("DirCaps") {
            let caps = parse_setting::<DirCaps>(config, "DirCaps")?;
            port.set_dir_caps(caps);
        }

        if config.has("RefreshMode") {
            port.set_refresh_mode(parse_setting::<RefreshMode>(config, "RefreshMode")?);
        }
        if port.refresh_mode() == RefreshMode::Periodic {
            let interval = config.get_int64("RefreshTime", 0, true)?;
            if interval < 0 {
                return Err(Error::invalid_setting(
                    format!("{}.RefreshTime", config.name()),
                    interval.to_string(),
                ));
            }
            port.set_periodic_refresh_ms(interval as u64);
        }

        {
            let meta = port.metadata_mut();
            meta.unit = config.get_string("Unit", &meta.unit, false)?;
            meta.icon = config.get_string("Icon", &meta.icon, false)?;
            meta.group = config.get_string("Group", &meta.group, false)?;
            meta.tags = config
                .get_string("Tags", "", false)?
                .split_whitespace()
                .map(str::to_string)
                .collect();
            meta.order_id = config.get_int("OrderID", meta.order_id, false)?;
        }

        port.set_on_change(
            &config.get_string("OnChangeInt", "", false)?,
            &config.get_string("OnChangeUser", "", false)?,
        );

        if config.has("LogVerbosity") {
            port.set_log_verbosity(Some(parse_setting::<LogVerbosity>(config, "LogVerbosity")?));
        }
        debug!("{}: Port configured ({})", port.id(), port.port_type());
        Ok(())
    }

    /// View of the state keys, with persisted state taking priority.
    fn state_view(&self, port: &Port, config: &ConfigView) -> ConfigView {
        if !port.is_persistent() {
            return config.clone();
        }
        let stored = self
            .rt
            .with_store(|store| persist::load_state(store, port.id()))
            .unwrap_or_default();
        if !stored.is_empty() {
            info!("{}: Restoring persisted state", port.id());
        }
        config.with_overlay(stored)
    }

    /// # Errors
    /// Fails on invalid settings or a mode the port cannot operate in.
    pub fn digital_port(&self, id: &str, flags: u32, config: &ConfigView) -> Result<Port> {
        let mut port = Port::digital(id, DirCaps::default(), flags);
        self.configure_port(&mut port, config)?;
        let state = self.state_view(&port, config);

        let current = port.digital_state()?.mode;
        let mode: DigitalMode = state
            .get_string(KEY_MODE, &current.to_string(), false)?
            .parse()?;
        port.set_digital_mode(mode, ChangeSource::Internal)?;

        if port.digital_state()?.mode == DigitalMode::Output {
            let line = parse_line(&state.get_string(KEY_LINE, "Low", false)?)?;
            port.set_line(line, ChangeSource::Internal)?;
        }
        Ok(port)
    }

    /// # Errors
    /// Fails on invalid settings or unsupported resolutions.
    pub fn analog_port(&self, id: &str, flags: u32, config: &ConfigView) -> Result<Port> {
        let mut port = Port::analog_with_flags(id, DirCaps::default(), flags);
        self.configure_port(&mut port, config)?;
        let state = self.state_view(&port, config);

        let analog = *port.analog_state()?;
        let mode: AnalogMode = state
            .get_string(KEY_MODE, &analog.mode.to_string(), false)?
            .parse()?;
        port.set_analog_mode(mode, ChangeSource::Internal)?;

        let resolution = state.get_int(KEY_RESOLUTION, i32::from(analog.resolution), false)?;
        let resolution = u8::try_from(resolution).map_err(|_| {
            Error::invalid_setting(format!("{id}.{KEY_RESOLUTION}"), resolution.to_string())
        })?;
        port.set_resolution(resolution, ChangeSource::Internal)?;

        if state.has(KEY_VALUE) {
            port.set_analog_value(state.get_int(KEY_VALUE, 0, false)?, ChangeSource::Internal)?;
        }
        Ok(port)
    }

    /// # Errors
    /// Fails without labels or with a configured position past the last
    /// label.
    pub fn select_port(&self, id: &str, config: &ConfigView) -> Result<Port> {
        let labels = labels_from_config(id, config)?;
        let mut port = Port::select(id, labels)?;
        self.configure_port(&mut port, config)?;
        let state = self.state_view(&port, config);

        let position = state.get_int64(KEY_POSITION, 0, false)?;
        port.set_select_position(position, ChangeSource::Internal)
            .map_err(|err| Error::Config(err.to_string()))?;
        Ok(port)
    }

    /// A stored position outside the configured range does not fail; the
    /// port starts out with `NotAvailable` instead.
    ///
    /// # Errors
    /// Fails on an invalid range or step.
    pub fn dial_port(&self, id: &str, config: &ConfigView) -> Result<Port> {
        let min = config.get_int64("Minimum", DEFAULT_DIAL_MIN, false)?;
        let max = config.get_int64("Maximum", DEFAULT_DIAL_MAX, false)?;
        let step = config.get_int64("Step", 1, false)?;
        let step = u64::try_from(step).map_err(|_| {
            Error::Config(format!(
                "{id}: Wrong dial port setting: Step may not be negative or zero: {step}"
            ))
        })?;
        let mut port = Port::dial(id, min, max, step)?;
        self.configure_port(&mut port, config)?;
        let state = self.state_view(&port, config);

        let position = state.get_int64(KEY_POSITION, min, false)?;
        if let Err(err) = port.set_dial_position(position, ChangeSource::Internal) {
            port.log_warning(format_args!("Configured position is invalid: {err}"));
            port.set_error(ValueError::NotAvailable);
        }
        Ok(port)
    }

    /// # Errors
    /// Fails on invalid common settings.
    pub fn custom_port(&self, id: &str, config: &ConfigView) -> Result<Port> {
        let type_guid = config.get_string("TypeGUID", "", false)?;
        let mut port = Port::custom(id, type_guid);
        self.configure_port(&mut port, config)?;
        if config.has(KEY_VALUE) {
            port.set_custom_value(config.get_string(KEY_VALUE, "", false)?, ChangeSource::Internal)?;
        }
        Ok(port)
    }

    /// # Errors
    /// Fails on an empty `Parent`.
    pub fn group(&self, id: &str, config: &ConfigView) -> Result<PortGroup> {
        let mut group = PortGroup::new(id);
        group.set_label(config.get_string("Label", id, false)?);
        if config.has("Parent") {
            group.set_parent(&config.get_string("Parent", "", false)?)?;
        }
        group.set_icon(config.get_string("Icon", "", false)?);
        Ok(group)
    }
}

fn parse_setting<T>(config: &ConfigView, key: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    config.get_string(key, "", true)?.parse()
}
