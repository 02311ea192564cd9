//! Motorized window control for OpenHAT.
//!
//! A window node is a select port (Off, Closed, Open, Automatic) whose
//! behavior drives a motor through digital output ports and watches
//! optional end position sensors. Two wiring schemes are supported:
//!
//! - **H-Bridge**: motor lines A and B choose the direction, an optional
//!   enable line powers the bridge
//! - **Serial relay**: a direction relay and a power relay; the power is
//!   always removed before the direction changes
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use std::time::{Duration, Instant};
//! use openhat_core::{ChangeSource, DirCaps};
//! use openhat_port::{Port, PortValue, Runtime};
//! use openhat_window::{WindowConfig, WindowPort, WindowState};
//!
//! let rt = Runtime::new();
//! rt.add_port(Port::digital("MotorA", DirCaps::Output, 0))?;
//! rt.add_port(Port::digital("MotorB", DirCaps::Output, 0))?;
//! let labels = ["Off", "Closed", "Open", "Auto"].map(String::from).to_vec();
//! let window = Arc::new(Mutex::new(WindowPort::new(WindowConfig::h_bridge(
//!     "MotorA",
//!     "MotorB",
//!     Duration::from_secs(1),
//! ))));
//! rt.add_port_with_behavior(Port::select("Window", labels)?, window.clone())?;
//! rt.prepare()?;
//!
//! rt.set_state("Window", PortValue::Position(2), ChangeSource::User)?;
//! let start = Instant::now();
//! for ms in [0, 50, 1100] {
//!     rt.do_work_all(start + Duration::from_millis(ms))?;
//! }
//! assert_eq!(window.lock().unwrap().current_state(), WindowState::Open);
//! # Ok::<(), openhat_core::Error>(())
//! ```

pub mod config;
pub mod state;
pub mod window;

pub use config::{ControlMode, ResetTo, SensorConfig, WindowConfig};
pub use state::{StateTransition, TransitionHistory, WindowState};
pub use window::{NODE_WINDOW, WindowPort, WindowStatus, configure_window};
