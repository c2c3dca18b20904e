//! # courier-config
//!
//! Configuration for the Courier agent. Reads `courier.toml`, then applies
//! environment variable overrides. Loaded once at startup; there is no hot-reload.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::CourierConfig;
pub use schema::{ConfigWarning, DeliveryMode, OracleProvider, WarningSeverity};
