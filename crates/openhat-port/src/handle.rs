//! Shared, lockable references to ports.
//!
//! A [`PortHandle`] is how the scheduler, worker threads and behaviors reach
//! a port. The port's mutex serializes every read and write. The setters here
//! wrap the local setters of [`Port`] with the parts of the change protocol
//! that need the [`Runtime`]:
//!
//! ```text
//!   lock port ─► set ─► persist (if persistent) ─► collect cascade targets
//!       │
//!   unlock ───────────► cascade set_line_internal(1) on every target
//! ```
//!
//! Cascades run after the lock is released and go through the target's
//! behavior, if it has one. A target that is already High reports no change
//! and stops the cascade, so cyclic lists terminate.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use openhat_core::{
    AnalogMode, AnalogReference, ChangeSource, DigitalMode, Result, ValueError,
};

use crate::port::{BufferedUpdate, Port, PortType};
use crate::runtime::Runtime;
use crate::value::{PortState, PortValue};

/// What a setter changes, which decides persistence and cascading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commit {
    /// The value: persisted and cascaded when it changed.
    Value,
    /// A setting such as the mode: persisted on every call, never cascaded.
    Setting,
}

#[derive(Clone)]
pub struct PortHandle {
    id: Arc<str>,
    port_type: PortType,
    inner: Arc<Mutex<Port>>,
}

impl fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortHandle")
            .field("id", &self.id)
            .field("port_type", &self.port_type)
            .finish()
    }
}

impl PortHandle {
    pub fn new(port: Port) -> Self {
        Self {
            id: Arc::from(port.id()),
            port_type: port.port_type(),
            inner: Arc::new(Mutex::new(port)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    /// Lock the port. A poisoned lock is recovered; port state is always
    /// consistent between statements.
    pub fn lock(&self) -> MutexGuard<'_, Port> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn downgrade(&self) -> WeakPortHandle {
        WeakPortHandle {
            id: Arc::clone(&self.id),
            port_type: self.port_type,
            inner: Arc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &PortHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn apply<F>(&self, rt: &Runtime, source: ChangeSource, commit: Commit, set: F) -> Result<bool>
    where
        F: FnOnce(&mut Port) -> Result<bool>,
    {
        let (changed, targets) = {
            let mut port = self.lock();
            let changed = set(&mut *port)?;
            if port.is_persistent() && (changed || commit == Commit::Setting) {
                rt.persist(&port);
            }
            let targets = if changed && commit == Commit::Value {
                port.cascade_targets(source)
            } else {
                Vec::new()
            };
            (changed, targets)
        };
        for target in targets.iter().filter_map(WeakPortHandle::upgrade) {
            rt.set_line_internal(&target, 1, source)?;
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    pub fn set_line(&self, rt: &Runtime, line: u8, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Value, |p| p.set_line(line, source))
    }

    pub fn set_digital_mode(&self, rt: &Runtime, mode: DigitalMode, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Setting, |p| p.set_digital_mode(mode, source))
    }

    pub fn set_analog_value(&self, rt: &Runtime, value: i32, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Value, |p| p.set_analog_value(value, source))
    }

    pub fn set_relative_value(&self, rt: &Runtime, value: f64, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Value, |p| p.set_relative_value(value, source))
    }

    pub fn set_analog_mode(&self, rt: &Runtime, mode: AnalogMode, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Setting, |p| p.set_analog_mode(mode, source))
    }

    pub fn set_resolution(&self, rt: &Runtime, resolution: u8, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Setting, |p| p.set_resolution(resolution, source))
    }

    pub fn set_reference(
        &self,
        rt: &Runtime,
        reference: AnalogReference,
        source: ChangeSource,
    ) -> Result<bool> {
        self.apply(rt, source, Commit::Setting, |p| p.set_reference(reference, source))
    }

    pub fn set_select_position(&self, rt: &Runtime, position: i64, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Value, |p| p.set_select_position(position, source))
    }

    pub fn set_dial_position(&self, rt: &Runtime, position: i64, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Value, |p| p.set_dial_position(position, source))
    }

    pub fn set_custom_value(&self, rt: &Runtime, value: &str, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Value, |p| p.set_custom_value(value, source))
    }

    /// Set a value of whatever kind the port is.
    pub fn set_value(&self, rt: &Runtime, value: PortValue, source: ChangeSource) -> Result<bool> {
        self.apply(rt, source, Commit::Value, |p| p.set_value(value, source))
    }

    /// Set the sticky value error. Returns `true` if it changed.
    pub fn set_error(&self, error: ValueError) -> bool {
        self.lock().set_error(error)
    }

    // ------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------

    /// # Errors
    /// Fails with the port's value error while one is set.
    pub fn state(&self) -> Result<PortState> {
        self.lock().state()
    }

    pub fn line(&self) -> Result<u8> {
        self.lock().line()
    }

    pub fn numeric_value(&self) -> Result<f64> {
        self.lock().numeric_value()
    }

    #[must_use]
    pub fn error(&self) -> ValueError {
        self.lock().error()
    }

    // ------------------------------------------------------------------
    // Worker side
    // ------------------------------------------------------------------

    /// Store a device result for the next scheduler tick.
    pub fn buffer_value(&self, value: PortValue) {
        self.lock().buffer_value(value);
    }

    /// Store a device error for the next scheduler tick.
    pub fn buffer_error(&self, error: ValueError) {
        self.lock().buffer_error(error);
    }

    // ------------------------------------------------------------------
    // Scheduler side
    // ------------------------------------------------------------------

    /// The base per-tick work of a port.
    ///
    /// Commits a buffered device result through the normal set path, then
    /// queues a refresh notification with the runtime when one is due.
    ///
    /// # Errors
    /// Fails if the buffered value is outside the port's domain.
    pub fn do_work(&self, rt: &Runtime, now: Instant) -> Result<()> {
        let pending = self.lock().take_pending();
        match pending {
            Some(BufferedUpdate::Value(value)) => {
                self.set_value(rt, value, ChangeSource::Internal)?;
            }
            Some(BufferedUpdate::Error(error)) => {
                self.set_error(error);
            }
            None => {}
        }
        if self.lock().poll_refresh(now) {
            rt.queue_refresh(self.id());
        }
        Ok(())
    }
}

/// Non-owning reference to a port, used for change propagation lists.
#[derive(Clone)]
pub struct WeakPortHandle {
    id: Arc<str>,
    port_type: PortType,
    inner: Weak<Mutex<Port>>,
}

impl WeakPortHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn upgrade(&self) -> Option<PortHandle> {
        Some(PortHandle {
            id: Arc::clone(&self.id),
            port_type: self.port_type,
            inner: self.inner.upgrade()?,
        })
    }
}

impl fmt::Debug for WeakPortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakPortHandle({})", self.id)
    }
}
