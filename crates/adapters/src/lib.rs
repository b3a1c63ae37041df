use std::sync::Arc;

use quarry_core::driver::DriverRegistry;

pub mod clipboard;
pub mod export;
pub mod mysql;

/// Registry holding every driver built into this crate.
#[must_use]
pub fn default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(mysql::MysqlDriver));
    registry
}
