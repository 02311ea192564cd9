//! Shared building blocks of the OpenHAT port runtime.
//!
//! This crate holds everything the other runtime crates agree on: the error
//! type, the small enums that describe port state (change source, refresh
//! mode, value error, direction capabilities), runtime constants and the
//! [`ConfigView`] used to read node settings.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::ConfigView;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
