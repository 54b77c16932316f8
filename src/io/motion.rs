//! Motion (PIR) digital input
//!
//! Hardware mode reads the pin through the sysfs GPIO interface:
//! `<root>/gpio<N>/value` holds `0` or `1`. The pin is exported on first use.

use crate::io::error::SensorError;
use async_trait::async_trait;
use rand::Rng;
use std::path::PathBuf;
use tracing::{debug, info};

/// Binary motion signal
#[async_trait]
pub trait MotionInput: Send + Sync {
    /// `true` while the sensor reports motion
    async fn read_active(&self) -> Result<bool, SensorError>;
}

pub struct SysfsMotionInput {
    pin: u32,
    root: PathBuf,
}

impl SysfsMotionInput {
    pub fn new(root: &str, pin: u32) -> Self {
        Self { pin, root: PathBuf::from(root) }
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn value_path(&self) -> PathBuf {
        self.pin_dir().join("value")
    }

    /// Export the pin and set it as input if the kernel has not already
    pub async fn prepare(&self) -> Result<(), SensorError> {
        let device = self.pin_dir().display().to_string();
        if tokio::fs::metadata(self.pin_dir()).await.is_err() {
            tokio::fs::write(self.root.join("export"), self.pin.to_string())
                .await
                .map_err(|e| SensorError::open(&device, e))?;
            info!(pin = %self.pin, "gpio_exported");
        }
        tokio::fs::write(self.pin_dir().join("direction"), "in")
            .await
            .map_err(|e| SensorError::open(&device, e))?;
        Ok(())
    }
}

#[async_trait]
impl MotionInput for SysfsMotionInput {
    async fn read_active(&self) -> Result<bool, SensorError> {
        let path = self.value_path();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorError::read(path.display().to_string(), e))?;
        parse_gpio_value(raw.trim()).ok_or_else(|| SensorError::Parse {
            device: path.display().to_string(),
            detail: format!("gpio value {:?}", raw.trim()),
        })
    }
}

fn parse_gpio_value(raw: &str) -> Option<bool> {
    match raw {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Simulated PIR that fires at random with a fixed per-poll probability
pub struct SimMotionInput {
    probability: f64,
}

impl SimMotionInput {
    pub fn new(probability: f64) -> Self {
        Self { probability: probability.clamp(0.0, 1.0) }
    }
}

#[async_trait]
impl MotionInput for SimMotionInput {
    async fn read_active(&self) -> Result<bool, SensorError> {
        let active = rand::thread_rng().gen_bool(self.probability);
        if active {
            debug!("sim_motion_active");
        }
        Ok(active)
    }
}
