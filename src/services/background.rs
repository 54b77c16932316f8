//! Adaptive background model for a fixed camera
//!
//! Each pixel keeps a running mean and variance of its intensity. A pixel is
//! foreground when it deviates from the mean by more than `K` standard
//! deviations and by more than a minimum intensity step.

/// Weight of the newest frame in the running statistics
const LEARNING_RATE: f32 = 0.05;
/// Deviation threshold in standard deviations, squared
const K_SQUARED: f32 = 2.5 * 2.5;
/// Minimum absolute intensity change counted as foreground
const MIN_STEP: f32 = 15.0;
const INITIAL_VARIANCE: f32 = 15.0 * 15.0;
const MIN_VARIANCE: f32 = 4.0;

#[derive(Debug, Default)]
pub struct BackgroundModel {
    mean: Vec<f32>,
    variance: Vec<f32>,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the model with `pixels` and return the foreground pixel count.
    /// A region of a different size restarts the model.
    pub fn apply(&mut self, pixels: &[u8]) -> usize {
        if self.mean.len() != pixels.len() {
            self.mean = pixels.iter().map(|&p| p as f32).collect();
            self.variance = vec![INITIAL_VARIANCE; pixels.len()];
            return 0;
        }

        let mut foreground = 0;
        let cells = pixels.iter().zip(self.mean.iter_mut()).zip(self.variance.iter_mut());
        for ((&p, mean), var) in cells {
            let d = p as f32 - *mean;
            let d2 = d * d;
            if d2 > K_SQUARED * *var && d.abs() > MIN_STEP {
                foreground += 1;
            }
            *mean += LEARNING_RATE * d;
            *var = (*var + LEARNING_RATE * (d2 - *var)).max(MIN_VARIANCE);
        }
        foreground
    }
}
