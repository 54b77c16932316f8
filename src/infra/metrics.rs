//! Lock-free pipeline counters and periodic reporting
//!
//! Relaxed ordering throughout. These counters feed logs and /metrics only
//! and must not drive control flow.

use crate::domain::types::{ExitOutcome, PresenceVerdict, TriggerSource};
use crate::services::notifier::NotifyOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    cycles_total: AtomicU64,
    triggers_manual: AtomicU64,
    triggers_motion: AtomicU64,
    exits_confirmed: AtomicU64,
    exits_not_confirmed: AtomicU64,
    camera_errors: AtomicU64,
    items_checked: AtomicU64,
    items_still_present: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    notifications_throttled: AtomicU64,
    notifications_skipped: AtomicU64,
    cycle_faults: AtomicU64,
    /// Last exit confirmation latency in milliseconds
    last_confirm_ms: AtomicU64,
    started_at: Instant,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub triggers_manual: u64,
    pub triggers_motion: u64,
    pub exits_confirmed: u64,
    pub exits_not_confirmed: u64,
    pub camera_errors: u64,
    pub items_checked: u64,
    pub items_still_present: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub notifications_throttled: u64,
    pub notifications_skipped: u64,
    pub cycle_faults: u64,
    pub last_confirm_ms: u64,
    pub uptime_secs: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles = %self.cycles_total,
            triggers_manual = %self.triggers_manual,
            triggers_motion = %self.triggers_motion,
            exits_confirmed = %self.exits_confirmed,
            exits_not_confirmed = %self.exits_not_confirmed,
            camera_errors = %self.camera_errors,
            items_checked = %self.items_checked,
            items_still_present = %self.items_still_present,
            notifications_sent = %self.notifications_sent,
            notifications_failed = %self.notifications_failed,
            notifications_throttled = %self.notifications_throttled,
            cycle_faults = %self.cycle_faults,
            uptime_secs = %self.uptime_secs,
            "metrics"
        );
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            triggers_manual: AtomicU64::new(0),
            triggers_motion: AtomicU64::new(0),
            exits_confirmed: AtomicU64::new(0),
            exits_not_confirmed: AtomicU64::new(0),
            camera_errors: AtomicU64::new(0),
            items_checked: AtomicU64::new(0),
            items_still_present: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            notifications_throttled: AtomicU64::new(0),
            notifications_skipped: AtomicU64::new(0),
            cycle_faults: AtomicU64::new(0),
            last_confirm_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_cycle(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_trigger(&self, source: TriggerSource) {
        match source {
            TriggerSource::Manual => self.triggers_manual.fetch_add(1, Ordering::Relaxed),
            TriggerSource::Motion => self.triggers_motion.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_exit(&self, outcome: ExitOutcome, elapsed_ms: u64) {
        self.last_confirm_ms.store(elapsed_ms, Ordering::Relaxed);
        match outcome {
            ExitOutcome::Exited => self.exits_confirmed.fetch_add(1, Ordering::Relaxed),
            ExitOutcome::NotExited => self.exits_not_confirmed.fetch_add(1, Ordering::Relaxed),
            ExitOutcome::SensorError => self.camera_errors.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_verdict(&self, verdict: PresenceVerdict) {
        self.items_checked.fetch_add(1, Ordering::Relaxed);
        if verdict.is_still_present() {
            self.items_still_present.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_notify(&self, outcome: NotifyOutcome) {
        let counter = match outcome {
            NotifyOutcome::Sent => &self.notifications_sent,
            NotifyOutcome::Failed => &self.notifications_failed,
            NotifyOutcome::Throttled => &self.notifications_throttled,
            NotifyOutcome::MissingCredentials => &self.notifications_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_fault(&self) {
        self.cycle_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            triggers_manual: self.triggers_manual.load(Ordering::Relaxed),
            triggers_motion: self.triggers_motion.load(Ordering::Relaxed),
            exits_confirmed: self.exits_confirmed.load(Ordering::Relaxed),
            exits_not_confirmed: self.exits_not_confirmed.load(Ordering::Relaxed),
            camera_errors: self.camera_errors.load(Ordering::Relaxed),
            items_checked: self.items_checked.load(Ordering::Relaxed),
            items_still_present: self.items_still_present.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            notifications_throttled: self.notifications_throttled.load(Ordering::Relaxed),
            notifications_skipped: self.notifications_skipped.load(Ordering::Relaxed),
            cycle_faults: self.cycle_faults.load(Ordering::Relaxed),
            last_confirm_ms: self.last_confirm_ms.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_cycle();
        metrics.record_trigger(TriggerSource::Manual);
        metrics.record_exit(ExitOutcome::Exited, 420);
        metrics.record_exit(ExitOutcome::SensorError, 1);
        metrics.record_verdict(PresenceVerdict::StillPresent);
        metrics.record_verdict(PresenceVerdict::Absent);
        metrics.record_notify(NotifyOutcome::Throttled);

        let summary = metrics.report();
        assert_eq!(summary.cycles_total, 1);
        assert_eq!(summary.triggers_manual, 1);
        assert_eq!(summary.triggers_motion, 0);
        assert_eq!(summary.exits_confirmed, 1);
        assert_eq!(summary.camera_errors, 1);
        assert_eq!(summary.items_checked, 2);
        assert_eq!(summary.items_still_present, 1);
        assert_eq!(summary.notifications_throttled, 1);
        assert_eq!(summary.last_confirm_ms, 1);
    }
}
