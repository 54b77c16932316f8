//! Services - departure detection and reminder logic
//!
//! - `trigger_gate` - waits for the PIR or a manual trigger
//! - `background` - per-pixel background model
//! - `exit_confirmer` - camera confirmation of a departure
//! - `tag_probe` / `proximity_probe` - item presence checks
//! - `router` - picks the probe for each item
//! - `notifier` - throttled reminder push
//! - `monitor` - the loop tying it all together

pub mod background;
pub mod exit_confirmer;
pub mod monitor;
pub mod notifier;
pub mod proximity_probe;
pub mod router;
pub mod tag_probe;
pub mod trigger_gate;

pub use monitor::{CycleOutcome, MonitorLoop};
pub use notifier::{NotificationThrottle, NotifyOutcome};
pub use trigger_gate::{ManualTrigger, TriggerGate};
