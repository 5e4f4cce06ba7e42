//! Plugsync Meta - Plugin metadata resolution.
//!
//! This crate provides:
//! - The [`MetaProvider`] trait and its [`MetaResult`]
//! - [`ProviderManager`], an ordered provider chain with a TTL cache and a
//!   background sweeper
//! - Concrete providers: [`LocalProvider`] (node registry), [`CoreProvider`]
//!   (bundled plugins), [`CatalogProvider`] (public catalog API) and
//!   [`CloudProvider`] (cloud stack inventory)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugsync_meta::{CatalogProvider, MetaProvider, ProviderManager};
//!
//! # async fn example() -> Result<(), plugsync_meta::ProviderError> {
//! let catalog = CatalogProvider::new("https://grafana.com/api/plugins")?;
//! let manager = ProviderManager::new(vec![Arc::new(catalog)])?;
//! let result = manager.get_meta("grafana-clock-panel", "2.1.0").await?;
//! println!("children: {:?}", result.meta.children);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
mod http;
pub mod manager;
pub mod provider;
pub mod providers;

pub use error::{ProviderError, ProviderResult};
pub use manager::{DEFAULT_SWEEP_INTERVAL, ProviderManager};
pub use provider::{MetaProvider, MetaResult};
pub use providers::{CatalogProvider, CloudProvider, CoreProvider, LocalProvider};
