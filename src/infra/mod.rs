//! Infrastructure - configuration, metrics, and the household store
//!
//! - `config` - Service configuration (TOML loading, defaults)
//! - `metrics` - Lock-free pipeline counters
//! - `store` - JSON household document on disk

pub mod config;
pub mod metrics;
pub mod store;

pub use config::{Config, SensorMode};
pub use metrics::Metrics;
pub use store::HouseholdStore;
