//! Departure trigger - waits for the PIR or a manual request

use crate::domain::types::TriggerSource;
use crate::io::motion::MotionInput;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Single-slot manual trigger shared with the config API.
///
/// Any number of `request()` calls before the next `take()` collapse into
/// one wakeup.
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger {
    flag: Arc<AtomicBool>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume the request if one is pending
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct TriggerGate {
    motion: Arc<dyn MotionInput>,
    manual: ManualTrigger,
    poll_interval: Duration,
}

impl TriggerGate {
    pub fn new(
        motion: Arc<dyn MotionInput>,
        manual: ManualTrigger,
        poll_interval: Duration,
    ) -> Self {
        Self { motion, manual, poll_interval }
    }

    /// Block until a departure signal arrives. Read errors are logged and
    /// polling continues.
    pub async fn wait_for_trigger(&self) -> TriggerSource {
        let mut polls: u64 = 0;
        loop {
            if self.manual.take() {
                info!(polls = %polls, "trigger_manual");
                return TriggerSource::Manual;
            }

            match self.motion.read_active().await {
                Ok(true) => {
                    info!(polls = %polls, "trigger_motion");
                    return TriggerSource::Motion;
                }
                Ok(false) => {
                    tracing::trace!("trigger_poll_idle");
                }
                Err(e) => {
                    warn!(error = %e, "trigger_motion_read_failed");
                }
            }

            polls += 1;
            if polls % 120 == 0 {
                debug!(polls = %polls, "trigger_still_waiting");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
