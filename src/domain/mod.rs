//! Domain models - household document and pipeline value types
//!
//! - `household` - tracked items, system switch and push credentials
//! - `types` - trigger, exit and presence outcomes, frames and RSSI samples

pub mod household;
pub mod types;

pub use household::{HouseholdConfig, Item};
pub use types::{ExitOutcome, PresenceVerdict, SensingModality, TriggerSource};
