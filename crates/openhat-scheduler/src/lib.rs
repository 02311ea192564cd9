//! The OpenHAT poll loop.
//!
//! [`Scheduler`] ticks every registered port at a fixed target rate,
//! batches refresh notifications, keeps frame statistics and writes the
//! optional heartbeat file. Repeated failures are thinned out by
//! [`ErrorLog`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//! use openhat_port::Runtime;
//! use openhat_scheduler::{Scheduler, SchedulerConfig};
//!
//! let rt = Arc::new(Runtime::new());
//! rt.prepare()?;
//! let mut scheduler = Scheduler::new(Arc::clone(&rt), &SchedulerConfig::default());
//! scheduler.run_until(Some(Instant::now() + Duration::from_millis(120)));
//! assert!(scheduler.frame() > 0);
//! # Ok::<(), openhat_core::Error>(())
//! ```

pub mod error_log;
pub mod scheduler;
pub mod stats;

pub use error_log::ErrorLog;
pub use scheduler::{Scheduler, SchedulerConfig, TickStatus};
pub use stats::{FrameStats, Heartbeat, StatsReport};
