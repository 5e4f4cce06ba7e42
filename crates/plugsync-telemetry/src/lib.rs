//! Plugsync Telemetry - Logging and tracing setup.
//!
//! This crate provides:
//! - [`LogConfig`] and [`setup_logging`] for installing the global subscriber
//! - [`OperationContext`] for correlating the log lines of one operation

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod context;
pub mod error;
pub mod logging;

pub use context::OperationContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_logging};
