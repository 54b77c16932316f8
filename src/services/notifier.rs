//! Throttled "items forgotten" notification
//!
//! The minimum interval bounds how often the push endpoint is called, not how
//! often a message is delivered: the timestamp moves on every attempt.

use crate::domain::household::HouseholdConfig;
use crate::io::push::PushSender;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Failed,
    Throttled,
    MissingCredentials,
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Sent => "sent",
            NotifyOutcome::Failed => "failed",
            NotifyOutcome::Throttled => "throttled",
            NotifyOutcome::MissingCredentials => "missing_credentials",
        }
    }
}

/// Reminder text for the items still at home
pub fn forgotten_message(names: &[String]) -> String {
    format!(
        "Forgotten items reminder: you just left home, but these items are still near the door: {}",
        names.join(", ")
    )
}

pub struct NotificationThrottle {
    sender: Arc<dyn PushSender>,
    min_interval: Duration,
    last_attempt: Option<Instant>,
}

impl NotificationThrottle {
    pub fn new(sender: Arc<dyn PushSender>, min_interval: Duration) -> Self {
        Self { sender, min_interval, last_attempt: None }
    }

    /// Send `message` with the credentials from `household`. Never fails;
    /// the outcome is returned for logging and metrics.
    pub async fn notify(&mut self, household: &HouseholdConfig, message: &str) -> NotifyOutcome {
        if let Some(last) = self.last_attempt {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                info!(
                    elapsed_ms = %elapsed.as_millis(),
                    min_interval_ms = %self.min_interval.as_millis(),
                    "notify_throttled"
                );
                return NotifyOutcome::Throttled;
            }
        }

        if !household.has_credentials() {
            info!("notify_skipped_missing_credentials");
            return NotifyOutcome::MissingCredentials;
        }

        self.last_attempt = Some(Instant::now());
        match self
            .sender
            .push(&household.notifier_token, &household.notifier_recipient, message)
            .await
        {
            Ok(()) => {
                info!(chars = %message.chars().count(), "notify_sent");
                NotifyOutcome::Sent
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "notify_failed");
                NotifyOutcome::Failed
            }
        }
    }
}
