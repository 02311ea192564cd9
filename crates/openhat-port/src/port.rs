//! The port model.
//!
//! A [`Port`] combines the attributes every port shares (identity, flags,
//! error, refresh policy, change propagation lists, metadata) with a closed
//! [`PortKind`] that holds the type specific value.
//!
//! The setters in this module only mutate local state and report whether the
//! committed value changed. Persistence and change propagation need the
//! [`Runtime`](crate::Runtime) and are layered on top by
//! [`PortHandle`](crate::PortHandle).
//!
//! # Change protocol
//!
//! Every value setter follows the same order:
//!
//! 1. validate the requested value; a domain error leaves the port untouched
//! 2. compare against the committed value
//! 3. a present value error is cleared and forces a change
//! 4. on change, mark a refresh (Auto mode only) and update the value and
//!    its numeric view

use std::fmt;
use std::time::{Duration, Instant};

use openhat_core::constants::{ANALOG_ALL_RESOLUTIONS, MIN_REFRESH_INTERVAL_MS};
use openhat_core::{
    AnalogMode, AnalogReference, ChangeSource, DigitalMode, DirCaps, Error, LogVerbosity,
    RefreshMode, Result, ValueError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analog::{self, AnalogState};
use crate::custom::CustomState;
use crate::dial::DialState;
use crate::digital::{self, DigitalState};
use crate::handle::WeakPortHandle;
use crate::select::SelectState;
use crate::streaming::StreamingState;
use crate::value::{PortState, PortValue};

/// Type tag of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    Digital,
    Analog,
    Select,
    Dial,
    Custom,
    Streaming,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortType::Digital => write!(f, "digital"),
            PortType::Analog => write!(f, "analog"),
            PortType::Select => write!(f, "select"),
            PortType::Dial => write!(f, "dial"),
            PortType::Custom => write!(f, "custom"),
            PortType::Streaming => write!(f, "streaming"),
        }
    }
}

/// Type specific value of a port.
#[derive(Debug, Clone, PartialEq)]
pub enum PortKind {
    Digital(DigitalState),
    Analog(AnalogState),
    Select(SelectState),
    Dial(DialState),
    Custom(CustomState),
    Streaming(StreamingState),
}

impl PortKind {
    #[must_use]
    pub fn port_type(&self) -> PortType {
        match self {
            PortKind::Digital(_) => PortType::Digital,
            PortKind::Analog(_) => PortType::Analog,
            PortKind::Select(_) => PortType::Select,
            PortKind::Dial(_) => PortType::Dial,
            PortKind::Custom(_) => PortType::Custom,
            PortKind::Streaming(_) => PortType::Streaming,
        }
    }
}

/// Presentation attributes passed to the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortMetadata {
    pub unit: String,
    pub icon: String,
    pub group: String,
    pub color_scheme: String,
    pub type_guid: String,
    pub tags: Vec<String>,
    pub order_id: i32,
    pub history: String,
    pub inaccurate: bool,
}

impl Default for PortMetadata {
    fn default() -> Self {
        Self {
            unit: String::new(),
            icon: String::new(),
            group: String::new(),
            color_scheme: String::new(),
            type_guid: String::new(),
            tags: Vec::new(),
            order_id: -1,
            history: String::new(),
            inaccurate: false,
        }
    }
}

impl PortMetadata {
    /// `key=value;` list of the non-empty presentation attributes.
    #[must_use]
    pub fn extended_info(&self) -> String {
        [
            ("typeGUID", &self.type_guid),
            ("group", &self.group),
            ("unit", &self.unit),
            ("colorScheme", &self.color_scheme),
            ("icon", &self.icon),
        ]
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={};", escape_key_value(value)))
        .collect()
    }
}

/// Escape a value for use in a `key=value;` list.
#[must_use]
pub fn escape_key_value(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '=' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A device result waiting for the scheduler thread to commit it.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferedUpdate {
    Value(PortValue),
    Error(ValueError),
}

#[derive(Debug)]
pub struct Port {
    id: String,
    label: String,
    dir_caps: DirCaps,
    flags: u32,
    hidden: bool,
    readonly: bool,
    persistent: bool,
    error: ValueError,
    refresh_mode: RefreshMode,
    refresh_required: bool,
    periodic_refresh_ms: u64,
    last_refresh: Option<Instant>,
    value_as_double: f64,
    on_change_int: Vec<String>,
    on_change_user: Vec<String>,
    pub(crate) on_change_int_ports: Vec<WeakPortHandle>,
    pub(crate) on_change_user_ports: Vec<WeakPortHandle>,
    metadata: PortMetadata,
    log_verbosity: Option<LogVerbosity>,
    pending: Option<BufferedUpdate>,
    last_update: Option<Instant>,
    kind: PortKind,
}

impl Port {
    fn with_kind(id: impl Into<String>, dir_caps: DirCaps, flags: u32, kind: PortKind) -> Self {
        let id = id.into();
        let value_as_double = match &kind {
            PortKind::Custom(_) | PortKind::Streaming(_) => f64::NAN,
            _ => 0.0,
        };
        Self {
            label: id.clone(),
            id,
            dir_caps,
            flags,
            hidden: false,
            readonly: false,
            persistent: false,
            error: ValueError::Ok,
            refresh_mode: RefreshMode::NotSet,
            refresh_required: false,
            periodic_refresh_ms: 0,
            last_refresh: None,
            value_as_double,
            on_change_int: Vec::new(),
            on_change_user: Vec::new(),
            on_change_int_ports: Vec::new(),
            on_change_user_ports: Vec::new(),
            metadata: PortMetadata::default(),
            log_verbosity: None,
            pending: None,
            last_update: None,
            kind,
        }
    }

    /// A digital port; the direction capability selects the initial mode.
    pub fn digital(id: impl Into<String>, dir_caps: DirCaps, flags: u32) -> Self {
        Self::with_kind(
            id,
            dir_caps,
            flags,
            PortKind::Digital(DigitalState::new(dir_caps, flags)),
        )
    }

    /// An analog port supporting every resolution.
    pub fn analog(id: impl Into<String>, dir_caps: DirCaps) -> Self {
        Self::analog_with_flags(id, dir_caps, ANALOG_ALL_RESOLUTIONS)
    }

    pub fn analog_with_flags(id: impl Into<String>, dir_caps: DirCaps, flags: u32) -> Self {
        let mut state = AnalogState::default();
        if dir_caps == DirCaps::Output {
            state.mode = AnalogMode::Output;
        }
        Self::with_kind(id, dir_caps, flags, PortKind::Analog(state))
    }

    /// # Errors
    /// Fails for an empty or oversized label list.
    pub fn select(id: impl Into<String>, labels: Vec<String>) -> Result<Self> {
        let id = id.into();
        let state = SelectState::new(&id, labels)?;
        Ok(Self::with_kind(id, DirCaps::Output, 0, PortKind::Select(state)))
    }

    /// # Errors
    /// Fails unless `min < max` and `step >= 1`.
    pub fn dial(id: impl Into<String>, min: i64, max: i64, step: u64) -> Result<Self> {
        let id = id.into();
        let state = DialState::new(&id, min, max, step)?;
        let mut port = Self::with_kind(id, DirCaps::Output, 0, PortKind::Dial(state));
        port.value_as_double = min as f64;
        Ok(port)
    }

    pub fn custom(id: impl Into<String>, type_guid: impl Into<String>) -> Self {
        let state = CustomState::new(type_guid);
        let type_guid = state.type_guid.clone();
        let mut port = Self::with_kind(id, DirCaps::Bidi, 0, PortKind::Custom(state));
        port.metadata.type_guid = type_guid;
        port
    }

    pub fn streaming(id: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            DirCaps::Bidi,
            0,
            PortKind::Streaming(StreamingState::default()),
        )
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    #[must_use]
    pub fn port_type(&self) -> PortType {
        self.kind.port_type()
    }

    pub fn kind(&self) -> &PortKind {
        &self.kind
    }

    #[must_use]
    pub fn dir_caps(&self) -> DirCaps {
        self.dir_caps
    }

    /// Change the direction capability. Digital ports fall back to the
    /// matching default mode.
    pub fn set_dir_caps(&mut self, dir_caps: DirCaps) {
        self.dir_caps = dir_caps;
        let flags = self.flags;
        if let PortKind::Digital(state) = &mut self.kind {
            state.mode = digital::default_mode(dir_caps, flags);
        }
    }

    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    #[must_use]
    pub fn refresh_mode(&self) -> RefreshMode {
        self.refresh_mode
    }

    pub fn set_refresh_mode(&mut self, mode: RefreshMode) {
        self.refresh_mode = mode;
    }

    #[must_use]
    pub fn periodic_refresh_ms(&self) -> u64 {
        self.periodic_refresh_ms
    }

    pub fn set_periodic_refresh_ms(&mut self, interval: u64) {
        self.periodic_refresh_ms = interval;
    }

    #[must_use]
    pub fn is_refresh_required(&self) -> bool {
        self.refresh_required
    }

    /// Request a refresh notification. Honors the refresh mode.
    pub fn mark_refresh(&mut self) {
        self.refresh_required |= self.refresh_mode == RefreshMode::Auto;
    }

    pub fn metadata(&self) -> &PortMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut PortMetadata {
        &mut self.metadata
    }

    /// `key=value;` presentation info sent with the port description.
    #[must_use]
    pub fn extended_info(&self) -> String {
        self.metadata.extended_info()
    }

    /// Additional state attributes; empty while a value error is set.
    #[must_use]
    pub fn extended_state(&self) -> String {
        if self.error != ValueError::Ok {
            return String::new();
        }
        let mut parts = Vec::new();
        if !self.metadata.history.is_empty() {
            parts.push(format!("history={}", escape_key_value(&self.metadata.history)));
        }
        if self.metadata.inaccurate {
            parts.push("inaccurate=true".to_string());
        }
        parts.join(";")
    }

    pub fn log_verbosity(&self) -> Option<LogVerbosity> {
        self.log_verbosity
    }

    pub fn set_log_verbosity(&mut self, verbosity: Option<LogVerbosity>) {
        self.log_verbosity = verbosity;
    }

    /// Space separated ids of the digital ports driven High on internal and
    /// user changes respectively.
    pub fn set_on_change(&mut self, internal: &str, user: &str) {
        self.on_change_int = split_ids(internal);
        self.on_change_user = split_ids(user);
    }

    pub fn on_change_ids(&self, source: ChangeSource) -> &[String] {
        match source {
            ChangeSource::Internal => &self.on_change_int,
            ChangeSource::User => &self.on_change_user,
        }
    }

    /// Ports to drive High after a change from `source`.
    pub(crate) fn cascade_targets(&self, source: ChangeSource) -> Vec<WeakPortHandle> {
        let targets = match source {
            ChangeSource::Internal => &self.on_change_int_ports,
            ChangeSource::User => &self.on_change_user_ports,
        };
        if !targets.is_empty() {
            self.log_debug(format_args!(
                "State change detected; iterating through port change list for {source} change"
            ));
        }
        targets.clone()
    }

    // ------------------------------------------------------------------
    // Logging
    // ------------------------------------------------------------------

    fn logs_at(&self, level: LogVerbosity) -> bool {
        self.log_verbosity.is_none_or(|v| v >= level)
    }

    pub fn log_debug(&self, message: fmt::Arguments<'_>) {
        if self.logs_at(LogVerbosity::Debug) {
            debug!("{}: {}", self.id, message);
        }
    }

    pub fn log_verbose(&self, message: fmt::Arguments<'_>) {
        if self.logs_at(LogVerbosity::Verbose) {
            info!("{}: {}", self.id, message);
        }
    }

    pub fn log_warning(&self, message: fmt::Arguments<'_>) {
        if self.logs_at(LogVerbosity::Normal) {
            warn!("{}: {}", self.id, message);
        }
    }

    // ------------------------------------------------------------------
    // Error and state
    // ------------------------------------------------------------------

    #[must_use]
    pub fn error(&self) -> ValueError {
        self.error
    }

    /// Set the sticky value error. Returns `true` if it changed.
    pub fn set_error(&mut self, error: ValueError) -> bool {
        let changed = self.error != error;
        if changed {
            self.mark_refresh();
            self.log_debug(format_args!("Error changed to {error}"));
        }
        if error != ValueError::Ok {
            self.value_as_double = f64::NAN;
        }
        self.error = error;
        changed
    }

    /// # Errors
    /// Returns `ValueExpired` or `ValueUnavailable` while an error is set.
    pub fn check_error(&self) -> Result<()> {
        match Error::from_value_error(&self.id, self.error) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error != ValueError::Ok
    }

    /// The committed state.
    ///
    /// # Errors
    /// Fails with the matching value error while the port has an error.
    pub fn state(&self) -> Result<PortState> {
        if !matches!(self.kind, PortKind::Streaming(_)) {
            self.check_error()?;
        }
        Ok(match &self.kind {
            PortKind::Digital(d) => PortState::Digital {
                mode: d.mode,
                line: d.line,
            },
            PortKind::Analog(a) => PortState::Analog {
                mode: a.mode,
                resolution: a.resolution,
                reference: a.reference,
                value: a.value,
                relative: a.relative(),
            },
            PortKind::Select(s) => PortState::Select {
                position: s.position,
                label: s.labels()[usize::from(s.position)].clone(),
            },
            PortKind::Dial(d) => PortState::Dial {
                position: d.position,
                min: d.min,
                max: d.max,
                step: d.step,
            },
            PortKind::Custom(c) => PortState::Custom {
                type_guid: c.type_guid.clone(),
                value: c.value.clone(),
            },
            PortKind::Streaming(stream) => PortState::Streaming {
                available: stream.available(),
            },
        })
    }

    /// Numeric view of the value.
    ///
    /// Digital ports yield the line, analog ports the relative value, select
    /// and dial ports the position. Custom values must parse as a number.
    ///
    /// # Errors
    /// Fails with the value error while one is set, or if the port has no
    /// numeric value.
    pub fn numeric_value(&self) -> Result<f64> {
        self.check_error()?;
        match &self.kind {
            PortKind::Custom(c) => c.value.trim().parse().map_err(|_| {
                Error::port_failure(&self.id, format!("Value is not numeric: {}", c.value))
            }),
            PortKind::Streaming(_) => Err(Error::port_failure(
                &self.id,
                "A streaming port has no value",
            )),
            _ => Ok(self.value_as_double),
        }
    }

    /// Numeric view kept in sync with the value; NaN while an error is set.
    #[must_use]
    pub fn value_as_double(&self) -> f64 {
        self.value_as_double
    }

    fn take_change(&mut self, changed: bool) -> bool {
        let changed = changed || self.error != ValueError::Ok;
        if changed {
            self.error = ValueError::Ok;
            self.mark_refresh();
        }
        changed
    }

    // ------------------------------------------------------------------
    // Digital
    // ------------------------------------------------------------------

    pub fn digital_state(&self) -> Result<&DigitalState> {
        match &self.kind {
            PortKind::Digital(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "digital")),
        }
    }

    fn digital_mut(&mut self) -> Result<&mut DigitalState> {
        match &mut self.kind {
            PortKind::Digital(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "digital")),
        }
    }

    /// Committed line, failing while the port has an error.
    pub fn line(&self) -> Result<u8> {
        self.check_error()?;
        Ok(self.digital_state()?.line)
    }

    /// # Errors
    /// Fails for lines other than 0/1 or on a non-digital port.
    pub fn set_line(&mut self, line: u8, source: ChangeSource) -> Result<bool> {
        digital::validate_line(&self.id, line)?;
        let current = self.digital_state()?.line;
        if !self.take_change(line != current) {
            return Ok(false);
        }
        self.digital_mut()?.line = line;
        self.value_as_double = f64::from(line);
        self.log_debug(format_args!("Line changed to {line} by {source}"));
        Ok(true)
    }

    /// # Errors
    /// Fails if the port cannot operate in the requested mode.
    pub fn set_digital_mode(&mut self, mode: DigitalMode, source: ChangeSource) -> Result<bool> {
        self.digital_state()?;
        let resolved = digital::resolve_mode(&self.id, self.dir_caps, self.flags, mode)?;
        let state = self.digital_mut()?;
        if state.mode == resolved {
            return Ok(false);
        }
        state.mode = resolved;
        self.mark_refresh();
        self.log_debug(format_args!("Mode changed to {resolved} by {source}"));
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Analog
    // ------------------------------------------------------------------

    pub fn analog_state(&self) -> Result<&AnalogState> {
        match &self.kind {
            PortKind::Analog(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "analog")),
        }
    }

    fn analog_mut(&mut self) -> Result<&mut AnalogState> {
        match &mut self.kind {
            PortKind::Analog(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "analog")),
        }
    }

    /// Set the absolute value, clamped into the current resolution's range.
    pub fn set_analog_value(&mut self, value: i32, source: ChangeSource) -> Result<bool> {
        let state = self.analog_state()?;
        let value = state.clamp(value);
        let changed = value != state.value;
        if !self.take_change(changed) {
            return Ok(false);
        }
        let state = self.analog_mut()?;
        state.value = value;
        let relative = state.relative();
        self.value_as_double = relative;
        self.log_debug(format_args!("Value changed to {value} by {source}"));
        Ok(true)
    }

    /// Set the value relative to the full range, `0.0..=1.0`.
    pub fn set_relative_value(&mut self, relative: f64, source: ChangeSource) -> Result<bool> {
        let value = self.analog_state()?.absolute_for(relative);
        self.set_analog_value(value, source)
    }

    /// Relative value, failing while the port has an error.
    pub fn relative_value(&self) -> Result<f64> {
        self.check_error()?;
        Ok(self.analog_state()?.relative())
    }

    pub fn set_analog_mode(&mut self, mode: AnalogMode, source: ChangeSource) -> Result<bool> {
        let state = self.analog_mut()?;
        if state.mode == mode {
            return Ok(false);
        }
        state.mode = mode;
        self.mark_refresh();
        self.log_debug(format_args!("Mode changed to {mode} by {source}"));
        Ok(true)
    }

    /// Change the resolution. Outside input mode the value is clamped into
    /// the new range.
    ///
    /// # Errors
    /// Fails for resolutions outside 8..=12 or not enabled by the flags.
    pub fn set_resolution(&mut self, resolution: u8, source: ChangeSource) -> Result<bool> {
        self.analog_state()?;
        analog::validate_resolution(&self.id, self.flags, resolution)?;
        let state = self.analog_mut()?;
        let mut changed = false;
        if state.resolution != resolution {
            state.resolution = resolution;
            changed = true;
        }
        if state.mode != AnalogMode::Input {
            let clamped = state.clamp(state.value);
            if clamped != state.value {
                state.value = clamped;
                changed = true;
            }
        }
        if changed {
            if self.error == ValueError::Ok {
                self.value_as_double = self.analog_state()?.relative();
            }
            self.mark_refresh();
            self.log_debug(format_args!("Resolution changed to {resolution} by {source}"));
        }
        Ok(changed)
    }

    pub fn set_reference(&mut self, reference: AnalogReference, source: ChangeSource) -> Result<bool> {
        let state = self.analog_mut()?;
        if state.reference == reference {
            return Ok(false);
        }
        state.reference = reference;
        self.mark_refresh();
        self.log_debug(format_args!("Reference changed to {reference} by {source}"));
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Select
    // ------------------------------------------------------------------

    pub fn select_state(&self) -> Result<&SelectState> {
        match &self.kind {
            PortKind::Select(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "select")),
        }
    }

    /// # Errors
    /// Fails if the position is past the last label.
    pub fn set_select_position(&mut self, position: i64, source: ChangeSource) -> Result<bool> {
        let state = self.select_state()?;
        let position = state.validate(&self.id, position)?;
        let changed = position != state.position;
        if !self.take_change(changed) {
            return Ok(false);
        }
        if let PortKind::Select(state) = &mut self.kind {
            state.position = position;
        }
        self.value_as_double = f64::from(position);
        self.log_debug(format_args!("Position changed to {position} by {source}"));
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Dial
    // ------------------------------------------------------------------

    pub fn dial_state(&self) -> Result<&DialState> {
        match &self.kind {
            PortKind::Dial(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "dial")),
        }
    }

    fn dial_mut(&mut self) -> Result<&mut DialState> {
        match &mut self.kind {
            PortKind::Dial(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "dial")),
        }
    }

    /// Set the position, aligned down to the step grid.
    ///
    /// # Errors
    /// Fails if the position is outside `min..=max`.
    pub fn set_dial_position(&mut self, position: i64, source: ChangeSource) -> Result<bool> {
        let state = self.dial_state()?;
        let aligned = state.validate(&self.id, position)?;
        let changed = aligned != state.position;
        if !self.take_change(changed) {
            return Ok(false);
        }
        self.store_dial_position(aligned)?;
        self.log_debug(format_args!("Position changed to {aligned} by {source}"));
        Ok(true)
    }

    fn store_dial_position(&mut self, position: i64) -> Result<()> {
        self.dial_mut()?.position = position;
        if self.error == ValueError::Ok {
            self.value_as_double = position as f64;
        }
        Ok(())
    }

    /// Move the position back onto the grid after a range change.
    fn normalize_dial(&mut self) -> Result<bool> {
        let state = self.dial_state()?;
        let normalized = state.normalize(state.position);
        if normalized == state.position {
            return Ok(false);
        }
        self.store_dial_position(normalized)?;
        self.mark_refresh();
        Ok(true)
    }

    /// Returns `true` if the position moved.
    ///
    /// # Errors
    /// Fails if the range cannot be shifted; the dial is left unchanged.
    pub fn set_dial_min(&mut self, min: i64) -> Result<bool> {
        let mut dial = *self.dial_state()?;
        dial.shift_min(&self.id, min)?;
        *self.dial_mut()? = dial;
        self.normalize_dial()
    }

    /// Returns `true` if the position moved.
    ///
    /// # Errors
    /// Fails if the range cannot be shifted; the dial is left unchanged.
    pub fn set_dial_max(&mut self, max: i64) -> Result<bool> {
        let mut dial = *self.dial_state()?;
        dial.shift_max(&self.id, max)?;
        *self.dial_mut()? = dial;
        self.normalize_dial()
    }

    /// # Errors
    /// Fails for a zero step.
    pub fn set_dial_step(&mut self, step: u64) -> Result<bool> {
        if step < 1 {
            return Err(Error::domain(&self.id, "Step may not be zero"));
        }
        self.dial_mut()?.step = step;
        self.normalize_dial()
    }

    // ------------------------------------------------------------------
    // Custom
    // ------------------------------------------------------------------

    pub fn custom_state(&self) -> Result<&CustomState> {
        match &self.kind {
            PortKind::Custom(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "custom")),
        }
    }

    pub fn set_custom_value(&mut self, value: impl Into<String>, source: ChangeSource) -> Result<bool> {
        let value = value.into();
        let changed = value != self.custom_state()?.value;
        if !self.take_change(changed) {
            return Ok(false);
        }
        self.log_debug(format_args!("Value changed to {value} by {source}"));
        self.value_as_double = value.trim().parse().unwrap_or(f64::NAN);
        if let PortKind::Custom(state) = &mut self.kind {
            state.value = value;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    pub fn stream_mut(&mut self) -> Result<&mut StreamingState> {
        match &mut self.kind {
            PortKind::Streaming(state) => Ok(state),
            _ => Err(Error::wrong_kind(&self.id, "streaming")),
        }
    }

    // ------------------------------------------------------------------
    // Generic value path
    // ------------------------------------------------------------------

    /// Set a value of whatever kind this port is.
    ///
    /// # Errors
    /// Fails if the value does not address this port's kind or is outside
    /// its domain.
    pub fn set_value(&mut self, value: PortValue, source: ChangeSource) -> Result<bool> {
        match (value, self.port_type()) {
            (PortValue::Line(line), PortType::Digital) => self.set_line(line, source),
            (PortValue::Analog(value), PortType::Analog) => self.set_analog_value(value, source),
            (PortValue::Relative(value), PortType::Analog) => self.set_relative_value(value, source),
            (PortValue::Position(position), PortType::Select) => {
                self.set_select_position(position, source)
            }
            (PortValue::Position(position), PortType::Dial) => {
                self.set_dial_position(position, source)
            }
            (PortValue::Text(text), PortType::Custom) => self.set_custom_value(text, source),
            (value, port_type) => Err(Error::domain(
                &self.id,
                format!("Cannot set {value} on a {port_type} port"),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Worker buffer
    // ------------------------------------------------------------------

    /// Store a device result to be committed by the next `do_work`.
    pub fn buffer_value(&mut self, value: PortValue) {
        self.pending = Some(BufferedUpdate::Value(value));
        self.last_update = Some(Instant::now());
    }

    /// Store a device error to be committed by the next `do_work`.
    pub fn buffer_error(&mut self, error: ValueError) {
        self.pending = Some(BufferedUpdate::Error(error));
    }

    pub fn take_pending(&mut self) -> Option<BufferedUpdate> {
        self.pending.take()
    }

    /// Time the last device value was buffered.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Advance the refresh bookkeeping.
    ///
    /// Returns `true` if a refresh notification should be emitted now.
    /// Pending refreshes are throttled to one per second; hidden ports never
    /// emit but still consume the pending flag.
    pub fn poll_refresh(&mut self, now: Instant) -> bool {
        let mut emit = false;
        if self.refresh_required
            && self.since_refresh(now) > Duration::from_millis(MIN_REFRESH_INTERVAL_MS)
        {
            if !self.hidden {
                self.last_refresh = Some(now);
                emit = true;
            }
            self.refresh_required = false;
        }
        if self.refresh_mode == RefreshMode::Periodic
            && self.periodic_refresh_ms > 0
            && self.since_refresh(now) > Duration::from_millis(self.periodic_refresh_ms)
        {
            self.refresh_required = true;
            self.last_refresh = Some(now);
        }
        emit
    }

    fn since_refresh(&self, now: Instant) -> Duration {
        self.last_refresh
            .map_or(Duration::MAX, |last| now.saturating_duration_since(last))
    }

    /// Resolve the refresh mode default.
    pub(crate) fn prepare_refresh_mode(&mut self) {
        if self.refresh_mode == RefreshMode::NotSet {
            self.refresh_mode = RefreshMode::Auto;
        }
    }
}

fn split_ids(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_string).collect()
}
