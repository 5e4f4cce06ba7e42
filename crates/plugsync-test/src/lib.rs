//! Plugsync Test - Shared test utilities.
//!
//! Mocks for every collaborator trait and fixtures for records, on-disk
//! plugins and plugin archives.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! plugsync-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use plugsync_test::{MockProvider, test_meta};
//!
//! let provider = MockProvider::new("catalog").with_meta(test_meta("p", "1.0.0"), ttl);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
