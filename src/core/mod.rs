/// Layered configuration: TOML file, environment, overrides
pub mod config;

/// The `error` module provides the crate error type
pub mod error;

/// Plugin capability traits shared by the router and the plugins
pub mod traits;
