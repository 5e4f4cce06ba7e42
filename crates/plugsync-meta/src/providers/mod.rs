//! Concrete metadata providers.

mod bundled;
mod catalog;
mod cloud;
mod local;

pub use self::bundled::{CoreProvider, DEFAULT_CORE_TTL};
pub use self::catalog::{CatalogProvider, DEFAULT_CATALOG_TTL};
pub use self::cloud::{CloudProvider, DEFAULT_CLOUD_TTL};
pub use self::local::{DEFAULT_LOCAL_TTL, LocalProvider};
