//! Departure monitor loop
//!
//! One cooperative loop drives every cycle sequentially:
//! - wait for the PIR or a manual trigger
//! - confirm with the camera that someone actually left
//! - probe each item active at the current time of day
//! - send one throttled reminder listing the items still at home
//!
//! A cycle that returns an error is logged and retried after a short backoff.

#[cfg(test)]
mod tests;

use crate::domain::household::HouseholdConfig;
use crate::domain::types::{ExitOutcome, TriggerSource};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::infra::store::HouseholdStore;
use crate::io::push::PushSender;
use crate::io::sensors::SensorSuite;
use crate::services::exit_confirmer::{ExitConfirmer, ExitConfirmerParams};
use crate::services::notifier::{forgotten_message, NotificationThrottle, NotifyOutcome};
use crate::services::proximity_probe::ProximityPresenceProbe;
use crate::services::router::{ItemPresenceRouter, ProbeBudget};
use crate::services::tag_probe::TagPresenceProbe;
use crate::services::trigger_gate::{ManualTrigger, TriggerGate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Sleeps between cycles
#[derive(Debug, Clone)]
pub struct MonitorTimings {
    pub exit_timeout: Duration,
    /// Pause before waiting for the next trigger after a rejected one
    pub rearm: Duration,
    pub cooldown: Duration,
    pub error_backoff: Duration,
    pub idle_poll: Duration,
}

impl Default for MonitorTimings {
    fn default() -> Self {
        Self {
            exit_timeout: Duration::from_secs(3),
            rearm: Duration::from_millis(500),
            cooldown: Duration::from_secs(10),
            error_backoff: Duration::from_secs(1),
            idle_poll: Duration::from_secs(2),
        }
    }
}

/// How a single cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// System switched off; nothing was touched
    Disabled,
    /// Trigger fired but the camera did not see anyone leave
    NotExited,
    /// Camera could not be opened or warmed up
    SensorError,
    /// Exit confirmed and the active items probed
    Completed {
        checked: usize,
        forgotten: Vec<String>,
        notify: Option<NotifyOutcome>,
    },
}

/// Local wall clock as `HH:MM`
pub fn local_time_of_day() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

pub struct MonitorLoop {
    store: Arc<HouseholdStore>,
    gate: TriggerGate,
    confirmer: ExitConfirmer,
    router: ItemPresenceRouter,
    throttle: NotificationThrottle,
    metrics: Arc<Metrics>,
    timings: MonitorTimings,
    time_of_day: fn() -> String,
}

impl MonitorLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<HouseholdStore>,
        gate: TriggerGate,
        confirmer: ExitConfirmer,
        router: ItemPresenceRouter,
        throttle: NotificationThrottle,
        metrics: Arc<Metrics>,
        timings: MonitorTimings,
    ) -> Self {
        Self {
            store,
            gate,
            confirmer,
            router,
            throttle,
            metrics,
            timings,
            time_of_day: local_time_of_day,
        }
    }

    /// Wire the pipeline from service config and a sensor suite
    pub fn from_config(
        config: &Config,
        store: Arc<HouseholdStore>,
        sensors: SensorSuite,
        manual: ManualTrigger,
        push: Arc<dyn PushSender>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let SensorSuite { motion, camera, tag_reader, scanner } = sensors;

        let gate = TriggerGate::new(motion, manual, config.trigger_poll_interval());
        let confirmer = ExitConfirmer::new(
            camera,
            ExitConfirmerParams {
                warmup_frames: config.warmup_frames(),
                pixel_threshold: config.motion_pixel_threshold(),
                min_run: config.motion_min_run(),
                band_fraction: config.band_fraction(),
            },
        );
        let router = ItemPresenceRouter::new(
            TagPresenceProbe::new(tag_reader),
            ProximityPresenceProbe::new(scanner),
            ProbeBudget {
                tag_attempts: config.tag_attempts(),
                tag_spacing: config.tag_spacing(),
                scan_duration: config.proximity_scan_duration(),
            },
        );
        let throttle = NotificationThrottle::new(push, config.notify_min_interval());
        let timings = MonitorTimings {
            exit_timeout: config.exit_timeout(),
            rearm: config.trigger_poll_interval(),
            cooldown: config.cooldown(),
            error_backoff: config.error_backoff(),
            idle_poll: config.idle_poll_interval(),
        };

        Self::new(store, gate, confirmer, router, throttle, metrics, timings)
    }

    /// Replace the wall clock used for the active-window filter
    pub fn with_time_of_day(mut self, time_of_day: fn() -> String) -> Self {
        self.time_of_day = time_of_day;
        self
    }

    /// Run cycles until the shutdown flag flips to `true`
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            exit_timeout_ms = %self.timings.exit_timeout.as_millis(),
            cooldown_secs = %self.timings.cooldown.as_secs(),
            "monitor_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle_id = Uuid::now_v7();
            let span = info_span!("cycle", cycle_id = %cycle_id);

            let result = tokio::select! {
                result = self.run_cycle().instrument(span) => result,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let pause = match result {
                Ok(CycleOutcome::Disabled) => {
                    debug!("system_disabled");
                    self.timings.idle_poll
                }
                // The PIR stays high for a while after motion
                Ok(CycleOutcome::NotExited) => self.timings.rearm,
                Ok(CycleOutcome::SensorError) => self.timings.error_backoff,
                Ok(CycleOutcome::Completed { checked, forgotten, notify }) => {
                    info!(
                        cycle_id = %cycle_id,
                        checked = %checked,
                        forgotten = %forgotten.len(),
                        notify = %notify.map(|n| n.as_str()).unwrap_or("none"),
                        "cycle_complete"
                    );
                    self.timings.cooldown
                }
                Err(e) => {
                    self.metrics.record_cycle_fault();
                    error!(cycle_id = %cycle_id, error = %format!("{e:#}"), "cycle_failed");
                    self.timings.error_backoff
                }
            };

            if !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("monitor_stopped");
    }

    /// One pass through the pipeline
    pub async fn run_cycle(&mut self) -> anyhow::Result<CycleOutcome> {
        // Serves the whole cycle; edits saved meanwhile apply to the next one
        let household = self.snapshot().await?;
        if !household.system_enabled {
            return Ok(CycleOutcome::Disabled);
        }

        self.metrics.record_cycle();
        let source: TriggerSource = self.gate.wait_for_trigger().await;
        self.metrics.record_trigger(source);

        let started = Instant::now();
        let exit = self.confirmer.confirm_exit(self.timings.exit_timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_exit(exit, elapsed_ms);
        info!(
            trigger = %source.as_str(),
            outcome = %exit.as_str(),
            elapsed_ms = %elapsed_ms,
            "exit_checked"
        );
        match exit {
            ExitOutcome::Exited => {}
            ExitOutcome::NotExited => return Ok(CycleOutcome::NotExited),
            ExitOutcome::SensorError => return Ok(CycleOutcome::SensorError),
        }

        let now = (self.time_of_day)();
        let active = household.active_items(&now);
        info!(now = %now, active = %active.len(), total = %household.items.len(), "items_filtered");

        let mut forgotten = Vec::new();
        for item in &active {
            let verdict = self.router.check(item).await;
            self.metrics.record_verdict(verdict);
            info!(item = %item.name, verdict = %verdict.as_str(), "item_checked");
            if verdict.is_still_present() {
                forgotten.push(item.name.clone());
            }
        }

        let notify = if forgotten.is_empty() {
            None
        } else {
            let outcome = self.throttle.notify(&household, &forgotten_message(&forgotten)).await;
            self.metrics.record_notify(outcome);
            Some(outcome)
        };

        Ok(CycleOutcome::Completed { checked: active.len(), forgotten, notify })
    }

    fn snapshot(&self) -> impl std::future::Future<Output = anyhow::Result<HouseholdConfig>> {
        let store = self.store.clone();
        async move { Ok(tokio::task::spawn_blocking(move || store.snapshot()).await?) }
    }
}
