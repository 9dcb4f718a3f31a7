//! # Core Runtime Module
//!
//! Runtime plumbing shared by the loop engine and its host binaries:
//! - Logging and tracing initialisation
//! - The runtime error type
//!
//! The loop engine itself only emits `tracing` events; hosts call
//! [`logging::init_logging`] once to decide where those events go.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
