//! A motorized window or shutter driven through sensor feedback and timed
//! transitions.
//!
//! The window is a select port with the positions Off, Closed, Open and
//! Automatic. [`WindowPort`] attaches to it as a [`PortBehavior`] and runs
//! one step of its state machine per scheduler tick:
//!
//! 1. a contradiction of the end sensors puts the window into `Error`
//! 2. the state machine of the configured [`ControlMode`] advances
//! 3. force, reset and automatic ports, and a newly set position, decide
//!    the target for the next tick
//!
//! Outputs are ordinary digital ports found at prepare time. Timers are
//! driven by the tick time, so the machine can be stepped deterministically.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use openhat_core::{ChangeSource, ConfigView, Error, Result};
use openhat_port::{Port, PortBehavior, PortConfigurator, PortHandle, PortType, PortValue, Runtime};
use serde::Serialize;
use tracing::trace;

use crate::config::{ControlMode, ResetTo, WindowConfig};
use crate::state::{
    POSITION_AUTO, POSITION_CLOSED, POSITION_OFF, POSITION_OPEN, StateTransition, TransitionHistory,
    WindowState, position_name,
};

/// Node type of a window in the configuration file.
pub const NODE_WINDOW: &str = "Window";

/// Labels a window's select port needs: Off, Closed, Open, Automatic.
const MIN_WINDOW_LABELS: usize = 4;

/// Build a window node: its select port and the attached state machine.
///
/// # Errors
/// Fails on invalid port or window settings and on duplicate ids.
pub fn configure_window(
    configurator: &PortConfigurator<'_>,
    id: &str,
    config: &ConfigView,
) -> Result<Arc<Mutex<WindowPort>>> {
    let port = configurator.select_port(id, config)?;
    check_labels(&port)?;
    let window = Arc::new(Mutex::new(WindowPort::new(WindowConfig::from_config(config)?)));
    configurator
        .runtime()
        .add_port_with_behavior(port, window.clone())?;
    Ok(window)
}

fn check_labels(port: &Port) -> Result<()> {
    let labels = port.select_state()?.labels().len();
    if labels < MIN_WINDOW_LABELS {
        return Err(Error::Config(format!(
            "{}: A window port requires {MIN_WINDOW_LABELS} labels (off, closed, open, automatic): found {labels}",
            port.id()
        )));
    }
    Ok(())
}

/// Snapshot of a window for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowStatus {
    pub current: WindowState,
    pub target: WindowState,
    pub motor_on: bool,
    pub motor_enabled: bool,
}

/// Everything a single step needs from the outside.
#[derive(Clone, Copy)]
struct Tick<'a> {
    rt: &'a Runtime,
    port: &'a PortHandle,
    now: Instant,
}

impl Tick<'_> {
    fn debug(&self, message: fmt::Arguments<'_>) {
        self.port.lock().log_debug(message);
    }

    fn verbose(&self, message: fmt::Arguments<'_>) {
        self.port.lock().log_verbose(message);
    }

    fn warning(&self, message: fmt::Arguments<'_>) {
        self.port.lock().log_warning(message);
    }

    fn set_line(&self, target: &PortHandle, line: u8) -> Result<()> {
        self.rt.set_line_internal(target, line, ChangeSource::Internal)?;
        Ok(())
    }

    fn position(&self) -> Result<u16> {
        position_of(self.port)
    }

    fn since(&self, timer: Instant) -> Duration {
        self.now.saturating_duration_since(timer)
    }
}

fn position_of(port: &PortHandle) -> Result<u16> {
    Ok(port.lock().select_state()?.position)
}

enum Drive {
    HBridge {
        motor_a: PortHandle,
        motor_b: PortHandle,
    },
    SerialRelay {
        direction: PortHandle,
    },
}

struct Sensor {
    port: PortHandle,
    active: u8,
}

impl Sensor {
    fn is_active(&self) -> Result<bool> {
        Ok(self.port.line()? == self.active)
    }
}

/// Ports referenced by the configuration, resolved at prepare time.
#[derive(Default)]
struct Wiring {
    drive: Option<Drive>,
    enable: Option<PortHandle>,
    sensor_closed: Option<Sensor>,
    sensor_open: Option<Sensor>,
    status: Option<PortHandle>,
    auto_open: Vec<PortHandle>,
    auto_close: Vec<PortHandle>,
    force_open: Vec<PortHandle>,
    force_close: Vec<PortHandle>,
    error_ports: Vec<PortHandle>,
    reset_ports: Vec<PortHandle>,
}

/// First port of the list whose line is High.
fn first_high(ports: &[PortHandle]) -> Result<Option<&PortHandle>> {
    for port in ports {
        if port.line()? == 1 {
            return Ok(Some(port));
        }
    }
    Ok(None)
}

pub struct WindowPort {
    config: WindowConfig,
    wiring: Wiring,
    current: WindowState,
    target: WindowState,
    delay_timer: Instant,
    open_timer: Instant,
    /// Set when the position was just changed; cleared after the next
    /// override evaluation.
    position_newly_set: bool,
    motor_enabled: bool,
    motor_on: bool,
    history: TransitionHistory,
}

impl WindowPort {
    pub fn new(config: WindowConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            wiring: Wiring::default(),
            current: WindowState::Unknown,
            target: WindowState::Unknown,
            delay_timer: now,
            open_timer: now,
            position_newly_set: false,
            motor_enabled: false,
            motor_on: false,
            history: TransitionHistory::default(),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    #[must_use]
    pub fn current_state(&self) -> WindowState {
        self.current
    }

    #[must_use]
    pub fn target_state(&self) -> WindowState {
        self.target
    }

    pub fn history(&self) -> &TransitionHistory {
        &self.history
    }

    #[must_use]
    pub fn status(&self) -> WindowStatus {
        WindowStatus {
            current: self.current,
            target: self.target,
            motor_on: self.motor_on,
            motor_enabled: self.motor_enabled,
        }
    }

    fn is_serial_relay(&self) -> bool {
        matches!(self.config.mode, ControlMode::SerialRelay { .. })
    }

    // ------------------------------------------------------------------
    // Position
    // ------------------------------------------------------------------

    fn apply_position(
        &mut self,
        rt: &Runtime,
        port: &PortHandle,
        position: u16,
        source: ChangeSource,
    ) -> Result<bool> {
        // recovery from error is always possible
        if self.current != WindowState::Error && position_of(port)? == position {
            return Ok(false);
        }
        // selecting the state the window is in keeps the automatic mode
        let position = match (position, self.current) {
            (POSITION_CLOSED, WindowState::Closed) if self.config.position_after_close.is_some() => {
                POSITION_AUTO
            }
            (POSITION_OPEN, WindowState::Open) if self.config.position_after_open.is_some() => {
                POSITION_AUTO
            }
            _ => position,
        };
        port.set_select_position(rt, i64::from(position), source)?;
        self.position_newly_set = true;
        port.lock().log_verbose(format_args!(
            "Setting position to {} ({}); current state is: {}{}",
            position,
            position_name(position),
            self.current,
            self.motor_text()
        ));
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Sensors and outputs
    // ------------------------------------------------------------------

    fn is_sensor_closed(&self) -> Result<bool> {
        self.wiring
            .sensor_closed
            .as_ref()
            .map_or(Ok(false), Sensor::is_active)
    }

    fn is_sensor_open(&self) -> Result<bool> {
        self.wiring
            .sensor_open
            .as_ref()
            .map_or(Ok(false), Sensor::is_active)
    }

    fn enable_motor(&mut self, t: Tick<'_>) -> Result<()> {
        let Some(enable) = &self.wiring.enable else {
            return Ok(());
        };
        t.debug(format_args!("Enabling motor"));
        t.set_line(enable, self.config.enable_line(true))?;
        self.motor_enabled = true;
        Ok(())
    }

    fn disable_motor(&mut self, t: Tick<'_>) -> Result<()> {
        let Some(enable) = &self.wiring.enable else {
            return Ok(());
        };
        t.debug(format_args!("Disabling motor"));
        t.set_line(enable, self.config.enable_line(false))?;
        // release the direction relay as well
        if let Some(Drive::SerialRelay { direction }) = &self.wiring.drive {
            t.set_line(direction, self.config.motor_line(false))?;
            self.motor_on = false;
        }
        self.motor_enabled = false;
        Ok(())
    }

    fn set_motor_opening(&mut self, t: Tick<'_>) -> Result<()> {
        t.debug(format_args!("Setting motor to 'opening'"));
        self.drive(t, true)
    }

    fn set_motor_closing(&mut self, t: Tick<'_>) -> Result<()> {
        t.debug(format_args!("Setting motor to 'closing'"));
        self.drive(t, false)
    }

    fn drive(&mut self, t: Tick<'_>, opening: bool) -> Result<()> {
        match &self.wiring.drive {
            Some(Drive::HBridge { motor_a, motor_b }) => {
                t.set_line(motor_a, self.config.motor_line(opening))?;
                t.set_line(motor_b, self.config.motor_line(!opening))?;
            }
            Some(Drive::SerialRelay { direction }) => {
                t.set_line(direction, self.config.motor_line(opening))?;
            }
            None => return Err(Error::port_failure(t.port.id(), "The window port is not prepared")),
        }
        self.motor_on = true;
        Ok(())
    }

    fn set_motor_off(&mut self, t: Tick<'_>) -> Result<()> {
        let Some(Drive::HBridge { motor_a, motor_b }) = &self.wiring.drive else {
            return Err(Error::port_failure(
                t.port.id(),
                "Cannot set motor off in Serial Relay Mode",
            ));
        };
        t.debug(format_args!("Stopping motor"));
        t.set_line(motor_a, self.config.motor_line(false))?;
        t.set_line(motor_b, self.config.motor_line(false))?;
        self.motor_on = false;
        Ok(())
    }

    /// Bring the motor to a safe halt in either mode.
    fn stop_motor(&mut self, t: Tick<'_>) -> Result<()> {
        if !self.is_serial_relay() {
            self.set_motor_off(t)?;
        }
        self.disable_motor(t)
    }

    fn motor_text(&self) -> String {
        match self.config.mode {
            ControlMode::HBridge { .. } if self.motor_on => " (Motor is on)".to_string(),
            ControlMode::HBridge { .. } => format!(
                " (Motor is off and {})",
                if self.motor_enabled { "enabled" } else { "disabled" }
            ),
            ControlMode::SerialRelay { .. } => format!(
                " (Motor is {})",
                if self.motor_enabled { "enabled" } else { "disabled" }
            ),
        }
    }

    // ------------------------------------------------------------------
    // State bookkeeping
    // ------------------------------------------------------------------

    fn set_current_state(&mut self, t: Tick<'_>, state: WindowState) -> Result<()> {
        if self.current == state {
            return Ok(());
        }
        t.verbose(format_args!(
            "Changing current state to: {}{}",
            state,
            self.motor_text()
        ));
        let error_edge = self.current == WindowState::Error || state == WindowState::Error;
        self.history.push(StateTransition {
            from: self.current,
            to: state,
            at: t.now,
        });
        self.current = state;

        if error_edge {
            let entering = state == WindowState::Error;
            for port in &self.wiring.error_ports {
                t.debug(format_args!(
                    "Notifying error port: {}: {} error state",
                    port.id(),
                    if entering { "Entering" } else { "Leaving" }
                ));
                t.set_line(port, u8::from(entering))?;
            }
        }

        if state.clears_target() {
            self.set_target_state(t, WindowState::Unknown);
        }

        if state.is_settled() {
            if self.target != WindowState::Unknown && t.position()? != POSITION_OFF {
                let rearm = match state {
                    WindowState::Closed => self.config.position_after_close,
                    WindowState::Open => self.config.position_after_open,
                    _ => None,
                };
                if let Some(position) = rearm {
                    self.apply_position(t.rt, t.port, position, ChangeSource::Internal)?;
                }
            }
            t.port.lock().mark_refresh();
        }

        if let (Some(status), Some(position)) = (&self.wiring.status, state.status_position()) {
            t.debug(format_args!(
                "Notifying status port: {}: new position = {}",
                status.id(),
                position
            ));
            t.rt.set_value_internal(
                status,
                PortValue::Position(i64::from(position)),
                ChangeSource::Internal,
            )?;
        }
        Ok(())
    }

    fn set_target_state(&mut self, t: Tick<'_>, state: WindowState) {
        if self.target != state {
            t.verbose(format_args!("Changing target state to: {state}"));
            self.target = state;
        }
    }

    /// Move to the end position the sensors report. Returns `false` if
    /// neither sensor is active.
    fn settle_from_sensors(&mut self, t: Tick<'_>) -> Result<bool> {
        if self.is_sensor_closed()? {
            t.verbose(format_args!("Closed sensor signal detected"));
            self.set_current_state(t, WindowState::Closed)?;
            Ok(true)
        } else if self.is_sensor_open()? {
            t.verbose(format_args!("Open sensor signal detected"));
            self.set_current_state(t, WindowState::Open)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn target_from_position(&mut self, t: Tick<'_>) -> Result<()> {
        match t.position()? {
            POSITION_OPEN => self.set_target_state(t, WindowState::Open),
            POSITION_CLOSED => self.set_target_state(t, WindowState::Closed),
            _ => {}
        }
        Ok(())
    }

    /// Both end sensors active at once is a hardware fault.
    fn check_sensor_contradiction(&mut self, t: Tick<'_>) -> Result<bool> {
        if self.current == WindowState::Error || !(self.is_sensor_closed()? && self.is_sensor_open()?) {
            return Ok(false);
        }
        t.warning(format_args!(
            "Closed sensor signal and open sensor signal detected at the same time"
        ));
        self.stop_motor(t)?;
        self.set_current_state(t, WindowState::Error)?;
        Ok(true)
    }

    /// An end sensor contradicting the resting state the step started in
    /// is a fault.
    fn check_resting_sensor(&mut self, t: Tick<'_>, resting: WindowState) -> Result<()> {
        let (contradicted, sensor) = if resting == WindowState::Open {
            (self.is_sensor_closed()?, "Closed")
        } else {
            (self.is_sensor_open()?, "Open")
        };
        if contradicted {
            t.warning(format_args!(
                "Warning: {sensor} sensor signal received while assuming state {resting}"
            ));
            self.set_current_state(t, WindowState::Error)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // H-Bridge state machine
    // ------------------------------------------------------------------

    fn start_hbridge(&mut self, t: Tick<'_>, target: WindowState) -> Result<()> {
        if self.target != target {
            return Ok(());
        }
        if !self.config.enable_delay.is_zero() {
            self.delay_timer = t.now;
            self.enable_motor(t)?;
            return self.set_current_state(t, WindowState::WaitingAfterEnable);
        }
        self.run_motor(t, target)
    }

    fn run_motor(&mut self, t: Tick<'_>, target: WindowState) -> Result<()> {
        self.open_timer = t.now;
        if target == WindowState::Open {
            self.set_motor_opening(t)?;
            self.set_current_state(t, WindowState::Opening)
        } else {
            self.set_motor_closing(t)?;
            self.set_current_state(t, WindowState::Closing)
        }
    }

    /// Enter an end state, through the power-down wait if an enable delay
    /// is configured.
    fn finish_hbridge(&mut self, t: Tick<'_>, waiting: WindowState, end: WindowState) -> Result<()> {
        if self.config.enable_delay.is_zero() {
            self.set_motor_off(t)?;
            self.set_current_state(t, end)
        } else {
            self.delay_timer = t.now;
            self.set_current_state(t, waiting)
        }
    }

    fn step_hbridge(&mut self, t: Tick<'_>) -> Result<()> {
        let enable_delay = self.config.enable_delay;
        match self.current {
            WindowState::Unknown => {
                self.set_motor_off(t)?;
                self.disable_motor(t)?;
                if !self.settle_from_sensors(t)? {
                    self.set_current_state(t, WindowState::UnknownWaiting)?;
                }
                self.target_from_position(t)?;
            }
            WindowState::UnknownWaiting => {
                if !self.settle_from_sensors(t)? {
                    self.start_hbridge(t, WindowState::Open)?;
                    self.start_hbridge(t, WindowState::Closed)?;
                }
            }
            WindowState::Open => {
                self.start_hbridge(t, WindowState::Closed)?;
                self.check_resting_sensor(t, WindowState::Open)?;
            }
            WindowState::Closed => {
                self.start_hbridge(t, WindowState::Open)?;
                self.check_resting_sensor(t, WindowState::Closed)?;
            }
            WindowState::WaitingAfterEnable => {
                if t.since(self.delay_timer) >= enable_delay {
                    match self.target {
                        WindowState::Open | WindowState::Closed => self.run_motor(t, self.target)?,
                        _ => self.set_current_state(t, WindowState::UnknownWaiting)?,
                    }
                }
            }
            WindowState::WaitingBeforeDisableOpen | WindowState::WaitingBeforeDisableClosed => {
                let (reverse, end) = if self.current == WindowState::WaitingBeforeDisableOpen {
                    (WindowState::Closed, WindowState::Open)
                } else {
                    (WindowState::Open, WindowState::Closed)
                };
                if self.target == reverse {
                    self.run_motor(t, reverse)?;
                } else {
                    if self.motor_on && t.since(self.delay_timer) >= self.config.motor_delay() {
                        self.set_motor_off(t)?;
                    }
                    if t.since(self.delay_timer) >= enable_delay {
                        self.disable_motor(t)?;
                        self.set_current_state(t, end)?;
                    }
                }
            }
            WindowState::WaitingBeforeDisableError => {
                if t.since(self.delay_timer) >= enable_delay {
                    self.disable_motor(t)?;
                    self.set_current_state(t, WindowState::Error)?;
                }
            }
            WindowState::Opening => {
                if self.target == WindowState::Closed {
                    self.run_motor(t, WindowState::Closed)?;
                } else if self.is_sensor_open()? {
                    t.verbose(format_args!("Open sensor signal detected"));
                    self.finish_hbridge(t, WindowState::WaitingBeforeDisableOpen, WindowState::Open)?;
                } else if t.since(self.open_timer) >= self.config.opening_time {
                    self.set_motor_off(t)?;
                    if self.wiring.sensor_open.is_some() {
                        t.warning(format_args!("Warning: Open sensor signal not detected while opening"));
                        self.finish_hbridge(t, WindowState::WaitingBeforeDisableError, WindowState::Error)?;
                    } else {
                        self.finish_hbridge(t, WindowState::WaitingBeforeDisableOpen, WindowState::Open)?;
                    }
                }
            }
            WindowState::Closing => {
                if self.target == WindowState::Open {
                    self.run_motor(t, WindowState::Open)?;
                } else if self.is_sensor_closed()? {
                    t.verbose(format_args!("Closed sensor signal detected"));
                    self.finish_hbridge(t, WindowState::WaitingBeforeDisableClosed, WindowState::Closed)?;
                } else if t.since(self.open_timer) >= self.config.closing_time {
                    self.set_motor_off(t)?;
                    if self.wiring.sensor_closed.is_some() {
                        t.warning(format_args!("Warning: Closed sensor signal not detected while closing"));
                        self.finish_hbridge(t, WindowState::WaitingBeforeDisableError, WindowState::Error)?;
                    } else {
                        self.finish_hbridge(t, WindowState::WaitingBeforeDisableClosed, WindowState::Closed)?;
                    }
                }
            }
            WindowState::Error
            | WindowState::WaitingAfterDisable
            | WindowState::WaitingBeforeEnableOpening
            | WindowState::WaitingBeforeEnableClosing => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Serial relay state machine
    // ------------------------------------------------------------------

    /// Power down and switch the direction relay before moving.
    fn prepare_relay(&mut self, t: Tick<'_>, target: WindowState) -> Result<()> {
        self.delay_timer = t.now;
        let waiting = if target == WindowState::Open {
            WindowState::WaitingBeforeEnableOpening
        } else {
            WindowState::WaitingBeforeEnableClosing
        };
        self.set_current_state(t, waiting)
    }

    fn step_serial_relay(&mut self, t: Tick<'_>) -> Result<()> {
        let enable_delay = self.config.enable_delay;
        match self.current {
            WindowState::Unknown => {
                self.delay_timer = t.now;
                self.disable_motor(t)?;
                self.set_current_state(t, WindowState::WaitingAfterDisable)?;
                self.target_from_position(t)?;
            }
            WindowState::WaitingAfterDisable => {
                if t.since(self.delay_timer) >= enable_delay {
                    self.set_current_state(t, WindowState::UnknownWaiting)?;
                }
            }
            WindowState::UnknownWaiting => {
                if !self.settle_from_sensors(t)? {
                    if let target @ (WindowState::Open | WindowState::Closed) = self.target {
                        self.prepare_relay(t, target)?;
                    }
                }
            }
            resting @ (WindowState::Open | WindowState::Closed) => {
                let reverse = if resting == WindowState::Open {
                    WindowState::Closed
                } else {
                    WindowState::Open
                };
                if self.target == reverse {
                    self.disable_motor(t)?;
                    self.prepare_relay(t, reverse)?;
                }
                self.check_resting_sensor(t, resting)?;
            }
            WindowState::WaitingBeforeEnableOpening | WindowState::WaitingBeforeEnableClosing => {
                let (moving, reverse) = if self.current == WindowState::WaitingBeforeEnableOpening {
                    (WindowState::Open, WindowState::Closed)
                } else {
                    (WindowState::Closed, WindowState::Open)
                };
                if self.target == reverse {
                    self.prepare_relay(t, reverse)?;
                } else if t.since(self.delay_timer) >= enable_delay {
                    self.open_timer = t.now;
                    // direction first, then power
                    if moving == WindowState::Open {
                        self.set_motor_opening(t)?;
                        self.enable_motor(t)?;
                        self.set_current_state(t, WindowState::Opening)?;
                    } else {
                        self.set_motor_closing(t)?;
                        self.enable_motor(t)?;
                        self.set_current_state(t, WindowState::Closing)?;
                    }
                }
            }
            WindowState::Opening | WindowState::Closing => {
                let opening = self.current == WindowState::Opening;
                let (reverse, end, travel) = if opening {
                    (WindowState::Closed, WindowState::Open, self.config.opening_time)
                } else {
                    (WindowState::Open, WindowState::Closed, self.config.closing_time)
                };
                let reached = if opening {
                    self.is_sensor_open()?
                } else {
                    self.is_sensor_closed()?
                };
                let has_sensor = if opening {
                    self.wiring.sensor_open.is_some()
                } else {
                    self.wiring.sensor_closed.is_some()
                };
                let name = if opening { "Open" } else { "Closed" };
                if self.target == reverse {
                    self.disable_motor(t)?;
                    self.prepare_relay(t, reverse)?;
                } else if reached {
                    t.verbose(format_args!("{name} sensor signal detected"));
                    self.disable_motor(t)?;
                    self.set_current_state(t, end)?;
                } else if t.since(self.open_timer) >= travel {
                    self.disable_motor(t)?;
                    if has_sensor {
                        t.warning(format_args!(
                            "Warning: {name} sensor signal not detected while {}",
                            if opening { "opening" } else { "closing" }
                        ));
                        self.set_current_state(t, WindowState::Error)?;
                    } else {
                        self.set_current_state(t, end)?;
                    }
                }
            }
            WindowState::Error
            | WindowState::WaitingAfterEnable
            | WindowState::WaitingBeforeDisableOpen
            | WindowState::WaitingBeforeDisableClosed
            | WindowState::WaitingBeforeDisableError => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Overrides
    // ------------------------------------------------------------------

    fn apply_overrides(&mut self, t: Tick<'_>) -> Result<()> {
        let id = t.port.id();
        let mut force_open = false;
        let mut force_close = false;

        if self.current != WindowState::Error {
            if let Some(port) = first_high(&self.wiring.force_open)? {
                trace!("{}: ForceOpen detected from port: {}", id, port.id());
                force_open = true;
            }
            if let Some(port) = first_high(&self.wiring.force_close)? {
                trace!("{}: ForceClose detected from port: {}", id, port.id());
                force_close = true;
            }
        } else if let Some(port) = first_high(&self.wiring.reset_ports)? {
            trace!("{}: Reset detected from port: {}", id, port.id());
            self.set_current_state(t, WindowState::Unknown)?;
            match self.config.reset_to {
                ResetTo::Closed => force_close = true,
                ResetTo::Open => force_open = true,
                ResetTo::Off => {
                    self.apply_position(t.rt, t.port, POSITION_OFF, ChangeSource::Internal)?;
                }
            }
        }

        if force_open {
            self.set_target_state(t, WindowState::Open);
            return Ok(());
        }
        if force_close {
            self.set_target_state(t, WindowState::Closed);
            return Ok(());
        }

        let position = t.position()?;
        let mut target = None;
        if self.current != WindowState::Error && position >= POSITION_AUTO {
            if let Some(port) = first_high(&self.wiring.auto_close)? {
                if self.target != WindowState::Closed {
                    trace!("{}: AutoClose detected from port: {}", id, port.id());
                }
                target = Some(WindowState::Closed);
            } else if let Some(port) = first_high(&self.wiring.auto_open)? {
                if self.target != WindowState::Open {
                    trace!("{}: AutoOpen detected from port: {}", id, port.id());
                }
                target = Some(WindowState::Open);
            }
        } else if self.position_newly_set {
            // only a fresh position counts, so recovering from an error
            // needs an explicit choice
            match position {
                POSITION_OFF => self.set_current_state(t, WindowState::Unknown)?,
                POSITION_CLOSED => target = Some(WindowState::Closed),
                POSITION_OPEN => target = Some(WindowState::Open),
                _ => {}
            }
        }
        self.position_newly_set = false;

        if let Some(target) = target {
            self.set_target_state(t, target);
            if self.current == WindowState::Error {
                self.set_current_state(t, WindowState::UnknownWaiting)?;
            }
        }
        Ok(())
    }
}

impl PortBehavior for WindowPort {
    fn prepare(&mut self, rt: &Runtime, port: &PortHandle) -> Result<()> {
        port.lock().log_debug(format_args!("Preparing WindowPort"));
        check_labels(&port.lock())?;
        let id = port.id();
        let digital = |parameter: &str, name: &str| {
            rt.find_port_of_type(id, parameter, name, PortType::Digital)
        };

        let mut wiring = Wiring::default();
        if let Some(sensor) = &self.config.sensor_closed {
            wiring.sensor_closed = Some(Sensor {
                port: digital("SensorClosed", &sensor.port)?,
                active: sensor.active,
            });
        }
        if let Some(sensor) = &self.config.sensor_open {
            wiring.sensor_open = Some(Sensor {
                port: digital("SensorOpen", &sensor.port)?,
                active: sensor.active,
            });
        }
        match &self.config.mode {
            ControlMode::HBridge {
                motor_a,
                motor_b,
                enable,
                ..
            } => {
                wiring.drive = Some(Drive::HBridge {
                    motor_a: digital("MotorA", motor_a)?,
                    motor_b: digital("MotorB", motor_b)?,
                });
                wiring.enable = enable.as_deref().map(|e| digital("Enable", e)).transpose()?;
            }
            ControlMode::SerialRelay { direction, enable } => {
                wiring.drive = Some(Drive::SerialRelay {
                    direction: digital("Direction", direction)?,
                });
                wiring.enable = Some(digital("Enable", enable)?);
            }
        }
        // without an enable line the motor is always powered
        self.motor_enabled = wiring.enable.is_none();

        if let Some(status) = &self.config.status_port {
            wiring.status = Some(rt.find_port_of_type(id, "StatusPort", status, PortType::Select)?);
        }
        wiring.auto_open = rt.find_digital_ports(id, "AutoOpen", &self.config.auto_open)?;
        wiring.auto_close = rt.find_digital_ports(id, "AutoClose", &self.config.auto_close)?;
        wiring.force_open = rt.find_digital_ports(id, "ForceOpen", &self.config.force_open)?;
        wiring.force_close = rt.find_digital_ports(id, "ForceClose", &self.config.force_close)?;
        wiring.error_ports = rt.find_digital_ports(id, "ErrorPorts", &self.config.error_ports)?;
        wiring.reset_ports = rt.find_digital_ports(id, "ResetPorts", &self.config.reset_ports)?;
        self.wiring = wiring;
        Ok(())
    }

    fn do_work(&mut self, rt: &Runtime, port: &PortHandle, now: Instant) -> Result<()> {
        port.do_work(rt, now)?;
        let t = Tick { rt, port, now };
        if !self.check_sensor_contradiction(t)? {
            if self.is_serial_relay() {
                self.step_serial_relay(t)?;
            } else {
                self.step_hbridge(t)?;
            }
        }
        self.apply_overrides(t)
    }

    fn set_state(
        &mut self,
        rt: &Runtime,
        port: &PortHandle,
        value: PortValue,
        source: ChangeSource,
    ) -> Result<bool> {
        let PortValue::Position(position) = value else {
            return Err(Error::domain(
                port.id(),
                format!("Cannot set {value} on a window port"),
            ));
        };
        let position = port.lock().select_state()?.validate(port.id(), position)?;
        self.apply_position(rt, port, position, source)
    }

    fn check_state(&self, port: &Port) -> Result<()> {
        if self.current == WindowState::Error && !self.position_newly_set {
            return Err(Error::port_failure(
                port.id(),
                "Sensor or motor failure or misconfiguration",
            ));
        }
        Ok(())
    }
}
