//! Port model and runtime for the OpenHAT automation server.
//!
//! A port is a typed, observable value exposed to the controller: a digital
//! line, an analog level, a select list, a dial, a custom string or a byte
//! stream. Every port carries a sticky value error, a refresh policy and
//! optional persistence and change propagation.
//!
//! # Overview
//!
//! - [`Port`] holds the state of one port and the local setters that
//!   validate and commit changes.
//! - [`PortHandle`] is the shared, lockable reference used by the scheduler,
//!   worker threads and behaviors. Its setters add persistence and
//!   change propagation.
//! - [`Runtime`] owns the registry, the persistent store, the refresh batch
//!   and the shutdown flag, and serves the controller API.
//! - [`PortBehavior`] lets plugins attach logic (a state machine, a device
//!   poll) to a port.
//! - [`PortConfigurator`] builds ports from node configuration.
//!
//! # Example
//!
//! ```
//! use openhat_core::{ChangeSource, DirCaps};
//! use openhat_port::{Port, PortValue, Runtime};
//!
//! let rt = Runtime::new();
//! let mut button = Port::digital("Button", DirCaps::Input, 0);
//! button.set_on_change("Lamp", "");
//! rt.add_port(button).unwrap();
//! let lamp = rt.add_port(Port::digital("Lamp", DirCaps::Output, 0)).unwrap();
//! rt.prepare().unwrap();
//!
//! rt.set_state("Button", PortValue::Line(1), ChangeSource::Internal).unwrap();
//! assert_eq!(lamp.line().unwrap(), 1);
//! ```

pub mod analog;
pub mod behavior;
pub mod configure;
pub mod custom;
pub mod dial;
pub mod digital;
pub mod group;
pub mod handle;
pub mod persist;
pub mod port;
pub mod resolver;
pub mod resources;
pub mod runtime;
pub mod select;
pub mod streaming;
pub mod value;

pub use behavior::{BehaviorHandle, PortBehavior};
pub use configure::PortConfigurator;
pub use group::PortGroup;
pub use handle::{PortHandle, WeakPortHandle};
pub use persist::{MemoryStore, PersistenceStore, TomlFileStore};
pub use port::{Port, PortKind, PortMetadata, PortType};
pub use resolver::ValueResolver;
pub use resources::ResourceLocks;
pub use runtime::{RefreshSink, Runtime};
pub use value::{PortSnapshot, PortState, PortValue};
