//! Routes each active item to the probe matching its identifier

use crate::domain::household::Item;
use crate::domain::types::{PresenceVerdict, SensingModality};
use crate::services::proximity_probe::ProximityPresenceProbe;
use crate::services::tag_probe::TagPresenceProbe;
use std::time::Duration;
use tracing::debug;

/// Probe budgets, copied from config at startup
#[derive(Debug, Clone)]
pub struct ProbeBudget {
    pub tag_attempts: u32,
    pub tag_spacing: Duration,
    pub scan_duration: Duration,
}

impl Default for ProbeBudget {
    fn default() -> Self {
        Self {
            tag_attempts: 30,
            tag_spacing: Duration::from_millis(100),
            scan_duration: Duration::from_secs(3),
        }
    }
}

pub struct ItemPresenceRouter {
    tag: TagPresenceProbe,
    proximity: ProximityPresenceProbe,
    budget: ProbeBudget,
}

impl ItemPresenceRouter {
    pub fn new(
        tag: TagPresenceProbe,
        proximity: ProximityPresenceProbe,
        budget: ProbeBudget,
    ) -> Self {
        Self { tag, proximity, budget }
    }

    pub async fn check(&mut self, item: &Item) -> PresenceVerdict {
        let modality = item.modality();
        debug!(item = %item.name, modality = ?modality, "item_probe_start");

        let present = match modality {
            SensingModality::Tag => {
                self.tag.check_presence(self.budget.tag_attempts, self.budget.tag_spacing).await
            }
            SensingModality::Proximity(identifier) => {
                self.proximity.scan_and_judge(&identifier, self.budget.scan_duration).await
            }
        };
        PresenceVerdict::from_present(present)
    }
}
