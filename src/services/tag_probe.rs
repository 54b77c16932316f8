//! Tag presence probe
//!
//! The reader only sees tags within a few centimetres, so any read means the
//! tagged item is still lying next to the reader.

use crate::io::tag_reader::TagReader;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct TagPresenceProbe {
    reader: Box<dyn TagReader>,
}

impl TagPresenceProbe {
    pub fn new(reader: Box<dyn TagReader>) -> Self {
        Self { reader }
    }

    /// `true` (still present) on the first successful read within `attempts`
    pub async fn check_presence(&mut self, attempts: u32, spacing: Duration) -> bool {
        for attempt in 1..=attempts {
            match self.reader.try_read().await {
                Ok(Some(tag)) => {
                    info!(attempt = %attempt, tag = %tag, "tag_present");
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(attempt = %attempt, error = %e, "tag_read_failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(spacing).await;
            }
        }
        debug!(attempts = %attempts, "tag_absent");
        false
    }
}
