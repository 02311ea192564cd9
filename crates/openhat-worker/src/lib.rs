//! Producer/consumer plumbing for I/O bound OpenHAT plugins.
//!
//! A plugin owns one [`ActionQueue`] and one [`Worker`] thread. The
//! scheduler thread and transport callbacks produce [`ActionRequest`]s; the
//! worker consumes them, performs the blocking I/O through the plugin's
//! [`ActionHandler`] and leaves results in the target port's buffer. The
//! scheduler commits buffered results on its next tick.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use openhat_core::{DirCaps, Result};
//! use openhat_port::{Port, PortHandle, PortValue, Runtime};
//! use openhat_worker::{ActionHandler, ActionQueue, ActionRequest, Worker};
//!
//! struct Loopback;
//!
//! impl ActionHandler for Loopback {
//!     fn read(&mut self, _port: &PortHandle) -> Result<Option<PortValue>> {
//!         Ok(Some(PortValue::Line(1)))
//!     }
//!
//!     fn write(&mut self, _port: &PortHandle, _payload: &str) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let rt = Arc::new(Runtime::new());
//! let port = rt.add_port(Port::digital("Input", DirCaps::Input, 0))?;
//! let queue = ActionQueue::new();
//! let worker = Worker::new("Loopback", Loopback, queue.clone(), Arc::clone(&rt)).spawn()?;
//!
//! queue.enqueue(ActionRequest::read(&port));
//! // ... scheduler ticks commit the buffered value ...
//! rt.request_shutdown();
//! worker.join().expect("worker panicked");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod action;
pub mod file;
pub mod queue;
pub mod switch;
pub mod worker;

pub use action::ActionRequest;
pub use file::{FileDevice, NODE_FILE_SWITCH, configure_file_switch};
pub use queue::ActionQueue;
pub use switch::{BufferedSwitch, SwitchSettings};
pub use worker::{ActionHandler, Worker};
