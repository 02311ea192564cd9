//! The runtime context shared by the scheduler, workers and the controller.
//!
//! # Architecture
//!
//! ```text
//!                 ┌───────────────────────────────┐
//!  controller ───►│ Runtime                       │
//!  set/get_state  │  registry: [PortSlot ...]     │──► RefreshSink
//!                 │    handle  (Arc<Mutex<Port>>) │    (batched ids)
//!  scheduler ────►│    behavior (optional)        │
//!  do_work_all    │  persistence store            │
//!                 │  resource locks               │
//!  workers ──────►│  shutdown flag                │
//!  buffer_value   └───────────────────────────────┘
//! ```
//!
//! Lock order is behavior, then port, then store or refresh batch. Worker
//! threads only ever take port locks.
//!
//! Internal sets ([`Runtime::set_line_internal`]) go through the target's
//! behavior like controller sets do. A behavior may drive other ports with
//! behaviors, which nests their locks. When a cascade leads back to a port
//! whose behavior the thread already holds, the value is committed to the
//! port directly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use openhat_core::{ChangeSource, Error, Result};
use tracing::{debug, info, warn};

use crate::behavior::{BehaviorHandle, PortBehavior};
use crate::group::PortGroup;
use crate::handle::PortHandle;
use crate::persist::{self, PersistenceStore};
use crate::port::{Port, PortType};
use crate::resources::ResourceLocks;
use crate::value::{PortSnapshot, PortState, PortValue};

thread_local! {
    /// Ids of the ports whose behavior this thread holds.
    static HELD_BEHAVIORS: RefCell<Vec<Arc<str>>> = const { RefCell::new(Vec::new()) };
}

/// Receiver of refresh notifications, usually the controller transport.
pub trait RefreshSink: Send + Sync {
    /// The listed ports changed and should be re-read.
    fn refresh(&self, port_ids: &[String]);

    /// Every port should be re-read.
    fn refresh_all(&self);
}

#[derive(Clone)]
struct PortSlot {
    handle: PortHandle,
    behavior: Option<BehaviorHandle>,
}

#[derive(Default)]
struct Registry {
    slots: Vec<PortSlot>,
    index: HashMap<String, usize>,
}

#[derive(Default)]
pub struct Runtime {
    registry: RwLock<Registry>,
    groups: Mutex<Vec<PortGroup>>,
    resources: ResourceLocks,
    shutdown: AtomicBool,
    store: Mutex<Option<Box<dyn PersistenceStore>>>,
    sink: RwLock<Option<Arc<dyn RefreshSink>>>,
    pending_refresh: Mutex<Vec<String>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `store` for persistent ports.
    pub fn set_store(&self, store: Box<dyn PersistenceStore>) {
        *self.store.lock().unwrap_or_else(PoisonError::into_inner) = Some(store);
    }

    /// Run `f` against the persistence store, if one is configured.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut dyn PersistenceStore) -> R) -> Option<R> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.as_deref_mut().map(|store| f(store))
    }

    pub fn set_refresh_sink(&self, sink: Arc<dyn RefreshSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub fn resources(&self) -> &ResourceLocks {
        &self.resources
    }

    /// Claim an exclusive resource for a node.
    pub fn lock_resource(&self, resource: &str, owner: &str) -> Result<()> {
        self.resources.lock(resource, owner)
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
        }
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a port.
    ///
    /// # Errors
    /// Returns `Error::DuplicateId` if the id is taken.
    pub fn add_port(&self, port: Port) -> Result<PortHandle> {
        self.insert(PortHandle::new(port), None)
    }

    /// Register a port together with its behavior.
    pub fn add_port_with_behavior(&self, port: Port, behavior: BehaviorHandle) -> Result<PortHandle> {
        self.insert(PortHandle::new(port), Some(behavior))
    }

    fn insert(&self, handle: PortHandle, behavior: Option<BehaviorHandle>) -> Result<PortHandle> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.index.contains_key(handle.id()) {
            return Err(Error::DuplicateId(handle.id().to_string()));
        }
        debug!("Adding port: {} ({})", handle.id(), handle.port_type());
        let position = registry.slots.len();
        registry.index.insert(handle.id().to_string(), position);
        registry.slots.push(PortSlot {
            handle: handle.clone(),
            behavior,
        });
        Ok(handle)
    }

    pub fn find_port(&self, id: &str) -> Option<PortHandle> {
        self.slot(id).map(|slot| slot.handle)
    }

    /// # Errors
    /// Returns `Error::PortNotFound` for unknown ids.
    pub fn port(&self, id: &str) -> Result<PortHandle> {
        self.find_port(id)
            .ok_or_else(|| Error::PortNotFound(id.to_string()))
    }

    /// Look up a port referenced by a configuration parameter and check its
    /// type.
    ///
    /// # Errors
    /// Fails if the port is unknown or of another type.
    pub fn find_port_of_type(
        &self,
        origin: &str,
        parameter: &str,
        id: &str,
        expected: PortType,
    ) -> Result<PortHandle> {
        let handle = self.find_port(id).ok_or_else(|| {
            Error::PortNotFound(format!("{origin}: Parameter {parameter}: {id}"))
        })?;
        if handle.port_type() != expected {
            return Err(Error::WrongPortReference {
                origin: origin.to_string(),
                parameter: parameter.to_string(),
                port: id.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(handle)
    }

    /// Resolve a space separated list of digital port ids.
    pub fn find_digital_ports(&self, origin: &str, parameter: &str, ids: &str) -> Result<Vec<PortHandle>> {
        ids.split_whitespace()
            .map(|id| self.find_port_of_type(origin, parameter, id, PortType::Digital))
            .collect()
    }

    /// All ports in registration order.
    pub fn ports(&self) -> Vec<PortHandle> {
        self.slots().into_iter().map(|slot| slot.handle).collect()
    }

    fn slots(&self) -> Vec<PortSlot> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .clone()
    }

    fn slot(&self, id: &str) -> Option<PortSlot> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .index
            .get(id)
            .map(|&position| registry.slots[position].clone())
    }

    /// The behavior registered for exactly this handle.
    fn behavior_of(&self, handle: &PortHandle) -> Option<BehaviorHandle> {
        self.slot(handle.id())
            .filter(|slot| slot.handle.ptr_eq(handle))
            .and_then(|slot| slot.behavior)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// # Errors
    /// Returns `Error::DuplicateId` if a group with this id exists.
    pub fn add_group(&self, group: PortGroup) -> Result<()> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        if groups.iter().any(|g| g.id() == group.id()) {
            return Err(Error::DuplicateId(group.id().to_string()));
        }
        debug!("Adding group: {}", group.id());
        groups.push(group);
        Ok(())
    }

    pub fn groups(&self) -> Vec<PortGroup> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Prepare every port once, after configuration.
    ///
    /// Resolves the refresh mode default and the change propagation lists,
    /// then lets behaviors resolve their own references.
    ///
    /// # Errors
    /// Fails on the first unresolvable reference.
    pub fn prepare(&self) -> Result<()> {
        for slot in self.slots() {
            let (id, internal, user) = {
                let mut port = slot.handle.lock();
                port.prepare_refresh_mode();
                (
                    port.id().to_string(),
                    port.on_change_ids(ChangeSource::Internal).join(" "),
                    port.on_change_ids(ChangeSource::User).join(" "),
                )
            };
            let internal = self.find_digital_ports(&id, "OnChangeInt", &internal)?;
            let user = self.find_digital_ports(&id, "OnChangeUser", &user)?;
            {
                let mut port = slot.handle.lock();
                port.on_change_int_ports = internal.iter().map(PortHandle::downgrade).collect();
                port.on_change_user_ports = user.iter().map(PortHandle::downgrade).collect();
            }
            if let Some(behavior) = &slot.behavior {
                with_behavior(&slot.handle, behavior, |b| b.prepare(self, &slot.handle))?;
            }
        }
        Ok(())
    }

    /// Run the per-tick work of every port.
    ///
    /// A failing port does not keep the others from running.
    ///
    /// # Errors
    /// Returns the first error raised by a port.
    pub fn do_work_all(&self, now: Instant) -> Result<()> {
        let mut first_error = None;
        for slot in self.slots() {
            let result = match &slot.behavior {
                Some(behavior) => {
                    with_behavior(&slot.handle, behavior, |b| b.do_work(self, &slot.handle, now))
                }
                None => slot.handle.do_work(self, now),
            };
            if let Err(err) = result {
                if first_error.is_some() {
                    debug!("{}: {}", slot.handle.id(), err);
                } else {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Queue a refresh notification for the next dispatch.
    pub fn queue_refresh(&self, port_id: &str) {
        let mut pending = self
            .pending_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !pending.iter().any(|id| id == port_id) {
            pending.push(port_id.to_string());
        }
    }

    /// Ids queued for the next dispatch.
    pub fn pending_refreshes(&self) -> Vec<String> {
        self.pending_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send the queued refreshes as one notification. Returns the number of
    /// ports notified.
    pub fn dispatch_refreshes(&self) -> usize {
        let ids = std::mem::take(
            &mut *self
                .pending_refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if ids.is_empty() {
            return 0;
        }
        if let Some(sink) = self.sink.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            sink.refresh(&ids);
        }
        ids.len()
    }

    /// Ask the controller to re-read every port.
    pub fn refresh_all(&self) {
        if let Some(sink) = self.sink.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            sink.refresh_all();
        }
    }

    /// Shut down behaviors and write every persistent port.
    ///
    /// Sets the shutdown flag first, so behaviors and workers see it.
    pub fn shutdown_flush(&self) {
        self.request_shutdown();
        let slots = self.slots();
        for slot in &slots {
            if let Some(behavior) = &slot.behavior {
                if let Err(err) = with_behavior(&slot.handle, behavior, |b| b.shutdown(self, &slot.handle)) {
                    warn!("{}: Error during shutdown: {}", slot.handle.id(), err);
                }
            }
        }
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store.as_deref_mut() else {
            return;
        };
        for slot in &slots {
            let port = slot.handle.lock();
            if port.is_persistent() {
                if let Err(err) = persist::write_port(store, &port) {
                    port.log_warning(format_args!("Unable to persist port state: {err}"));
                }
            }
        }
        persist::stamp_last_change(store);
        if let Err(err) = store.save() {
            warn!("Unable to save persistent state: {}", err);
        }
    }

    /// Persist the state of a port. Failures are logged, not returned.
    ///
    /// The store is saved immediately unless a shutdown is in progress; the
    /// shutdown flush saves once at the end.
    pub fn persist(&self, port: &Port) {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store.as_deref_mut() else {
            port.log_warning(format_args!(
                "Unable to persist state: No persistent store configured; use 'PersistentConfig' in the General section"
            ));
            return;
        };
        match persist::write_port(store, port) {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                port.log_warning(format_args!("Unable to persist port state: {err}"));
                return;
            }
        }
        if !self.is_shutdown_requested() {
            persist::stamp_last_change(store);
            if let Err(err) = store.save() {
                warn!("Unable to save persistent state: {}", err);
            }
        }
    }

    // ------------------------------------------------------------------
    // Controller API
    // ------------------------------------------------------------------

    /// Apply a value from the controller or a plugin.
    ///
    /// # Errors
    /// Fails for unknown ports, readonly ports (user changes only) and
    /// values outside the port's domain.
    pub fn set_state(&self, id: &str, value: PortValue, source: ChangeSource) -> Result<bool> {
        let slot = self.slot(id).ok_or_else(|| Error::PortNotFound(id.to_string()))?;
        if source == ChangeSource::User && slot.handle.lock().is_readonly() {
            return Err(Error::ReadOnly(id.to_string()));
        }
        match &slot.behavior {
            Some(behavior) => {
                with_behavior(&slot.handle, behavior, |b| b.set_state(self, &slot.handle, value, source))
            }
            None => slot.handle.set_value(self, value, source),
        }
    }

    /// Set the line of a digital port from inside the runtime: cascades,
    /// plugin outputs and state machines.
    ///
    /// Unlike [`PortHandle::set_line`] this goes through the port's behavior,
    /// so a port backed by a remote device sends the change to the device.
    /// No readonly check is made.
    ///
    /// # Errors
    /// Fails if the line is out of range or the behavior rejects it.
    pub fn set_line_internal(&self, handle: &PortHandle, line: u8, source: ChangeSource) -> Result<bool> {
        self.set_value_internal(handle, PortValue::Line(line), source)
    }

    /// [`Runtime::set_line_internal`] for a value of any kind.
    pub fn set_value_internal(&self, handle: &PortHandle, value: PortValue, source: ChangeSource) -> Result<bool> {
        match self.behavior_of(handle) {
            Some(behavior) if !is_held(handle.id()) => {
                with_behavior(handle, &behavior, |b| b.set_state(self, handle, value, source))
            }
            _ => handle.set_value(self, value, source),
        }
    }

    /// The committed state of a port.
    ///
    /// # Errors
    /// Fails for unknown ports and while the port reports an error.
    pub fn get_state(&self, id: &str) -> Result<PortState> {
        let slot = self.slot(id).ok_or_else(|| Error::PortNotFound(id.to_string()))?;
        read_state(&slot)
    }

    /// Controller view of every port, value errors included.
    pub fn snapshots(&self) -> Vec<PortSnapshot> {
        self.slots()
            .iter()
            .map(|slot| {
                let (label, extended_state) = {
                    let port = slot.handle.lock();
                    (port.label().to_string(), port.extended_state())
                };
                let (state, error) = match read_state(slot) {
                    Ok(state) => (Some(state), None),
                    Err(err) => (None, Some(err.to_string())),
                };
                PortSnapshot {
                    id: slot.handle.id().to_string(),
                    label,
                    port_type: slot.handle.port_type(),
                    state,
                    error,
                    extended_state,
                }
            })
            .collect()
    }
}

fn read_state(slot: &PortSlot) -> Result<PortState> {
    match &slot.behavior {
        Some(behavior) => {
            let behavior = lock_behavior(behavior);
            let port = slot.handle.lock();
            behavior.check_state(&port)?;
            port.state()
        }
        None => slot.handle.state(),
    }
}

fn lock_behavior(behavior: &BehaviorHandle) -> MutexGuard<'_, dyn PortBehavior + 'static> {
    behavior.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a behavior as held by the current thread until dropped.
struct HeldBehavior;

impl HeldBehavior {
    fn enter(id: &str) -> Self {
        HELD_BEHAVIORS.with(|held| held.borrow_mut().push(Arc::from(id)));
        Self
    }
}

impl Drop for HeldBehavior {
    fn drop(&mut self) {
        HELD_BEHAVIORS.with(|held| {
            held.borrow_mut().pop();
        });
    }
}

fn is_held(id: &str) -> bool {
    HELD_BEHAVIORS.with(|held| held.borrow().iter().any(|held_id| &**held_id == id))
}

fn with_behavior<R>(
    port: &PortHandle,
    behavior: &BehaviorHandle,
    f: impl FnOnce(&mut dyn PortBehavior) -> R,
) -> R {
    let mut guard = lock_behavior(behavior);
    let _held = HeldBehavior::enter(port.id());
    f(&mut *guard)
}
