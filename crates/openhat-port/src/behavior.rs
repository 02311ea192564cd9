//! Plugin specific port behavior.
//!
//! Ports are plain data. Anything a plugin adds on top (a state machine, a
//! device poll, a guarded setter) implements [`PortBehavior`] and is attached
//! to the port's slot in the [`Runtime`] registry. The runtime routes the
//! port's per-tick work and the controller's `set_state`/`get_state` calls
//! through the behavior.
//!
//! A behavior must not call [`Runtime::set_state`] or
//! [`Runtime::get_state`] for its own port; it already holds its own lock.
//! Use the [`PortHandle`] it is given instead. Other ports are driven with
//! [`Runtime::set_line_internal`], which reaches their behaviors too.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use openhat_core::{ChangeSource, Result};

use crate::handle::PortHandle;
use crate::port::Port;
use crate::runtime::Runtime;
use crate::value::PortValue;

pub trait PortBehavior: Send {
    /// Called once after all ports are registered and the base port is
    /// prepared. Resolve references to other ports here.
    fn prepare(&mut self, _rt: &Runtime, _port: &PortHandle) -> Result<()> {
        Ok(())
    }

    /// Per-tick work. Implementations should call `port.do_work` to keep the
    /// base refresh logic running.
    fn do_work(&mut self, rt: &Runtime, port: &PortHandle, now: Instant) -> Result<()> {
        port.do_work(rt, now)
    }

    /// A value arriving from the controller.
    fn set_state(
        &mut self,
        rt: &Runtime,
        port: &PortHandle,
        value: PortValue,
        source: ChangeSource,
    ) -> Result<bool> {
        port.set_value(rt, value, source)
    }

    /// Extra condition checked before the state is reported.
    fn check_state(&self, _port: &Port) -> Result<()> {
        Ok(())
    }

    /// Called once during shutdown, before the final persistence flush.
    fn shutdown(&mut self, _rt: &Runtime, _port: &PortHandle) -> Result<()> {
        Ok(())
    }
}

/// Shared behavior reference kept in the registry.
pub type BehaviorHandle = Arc<Mutex<dyn PortBehavior>>;
