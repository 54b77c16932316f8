//! Camera exit confirmation
//!
//! Warm-up frames train the background model; afterwards every frame is
//! cropped to the central horizontal band and judged. A departure is
//! confirmed after `min_run` consecutive frames above the pixel threshold.

use crate::domain::types::{ExitOutcome, MotionSample};
use crate::io::camera::FrameSource;
use crate::services::background::BackgroundModel;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExitConfirmerParams {
    pub warmup_frames: usize,
    pub pixel_threshold: usize,
    pub min_run: usize,
    pub band_fraction: f32,
}

impl Default for ExitConfirmerParams {
    fn default() -> Self {
        Self { warmup_frames: 10, pixel_threshold: 5000, min_run: 3, band_fraction: 0.5 }
    }
}

/// Consecutive-hit counter
#[derive(Debug)]
pub struct Debounce {
    min_run: usize,
    run: usize,
}

impl Debounce {
    pub fn new(min_run: usize) -> Self {
        Self { min_run: min_run.max(1), run: 0 }
    }

    /// Feed one sample; `true` once the run length is reached
    pub fn observe(&mut self, sample: MotionSample) -> bool {
        if sample.is_hit() {
            self.run += 1;
        } else {
            self.run = 0;
        }
        self.run >= self.min_run
    }

    pub fn run(&self) -> usize {
        self.run
    }
}

pub struct ExitConfirmer {
    camera: Box<dyn FrameSource>,
    params: ExitConfirmerParams,
}

impl ExitConfirmer {
    pub fn new(camera: Box<dyn FrameSource>, params: ExitConfirmerParams) -> Self {
        Self { camera, params }
    }

    /// Run one confirmation session. The camera is always released.
    pub async fn confirm_exit(&mut self, timeout: Duration) -> ExitOutcome {
        if let Err(e) = self.camera.open().await {
            warn!(error = %e, "camera_open_failed");
            return ExitOutcome::SensorError;
        }

        let outcome = self.analyze(timeout).await;
        self.camera.release().await;
        outcome
    }

    async fn analyze(&mut self, timeout: Duration) -> ExitOutcome {
        let mut model = BackgroundModel::new();

        // A camera that stops delivering must not hold the loop forever
        let warmup_deadline = Instant::now() + timeout;
        for i in 0..self.params.warmup_frames {
            match tokio::time::timeout_at(warmup_deadline, self.camera.next_frame()).await {
                Ok(Ok(frame)) => {
                    let band = frame.central_band(self.params.band_fraction);
                    model.apply(frame.rows(band));
                }
                Ok(Err(e)) => {
                    warn!(frame = %i, error = %e, "camera_warmup_read_failed");
                    return ExitOutcome::SensorError;
                }
                Err(_) => {
                    warn!(frame = %i, timeout_ms = %timeout.as_millis(), "camera_warmup_stalled");
                    return ExitOutcome::SensorError;
                }
            }
        }

        let deadline = Instant::now() + timeout;
        let mut debounce = Debounce::new(self.params.min_run);
        let mut judged = 0usize;

        loop {
            let frame = match tokio::time::timeout_at(deadline, self.camera.next_frame()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => {
                    warn!(judged = %judged, error = %e, "camera_read_failed");
                    return ExitOutcome::NotExited;
                }
                Err(_) => break,
            };

            let band = frame.central_band(self.params.band_fraction);
            let sample = MotionSample {
                foreground_pixels: model.apply(frame.rows(band)),
                threshold: self.params.pixel_threshold,
            };
            judged += 1;

            let confirmed = debounce.observe(sample);
            debug!(
                foreground = %sample.foreground_pixels,
                threshold = %sample.threshold,
                run = %debounce.run(),
                "motion_sample"
            );

            if confirmed {
                info!(judged = %judged, run = %debounce.run(), "exit_confirmed");
                return ExitOutcome::Exited;
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        info!(judged = %judged, timeout_ms = %timeout.as_millis(), "exit_not_confirmed");
        ExitOutcome::NotExited
    }
}
