//! Sensor suite factory - picks simulated or hardware adapters from config

use crate::infra::config::{Config, SensorMode};
use crate::infra::store::HouseholdStore;
use crate::io::bluetooth::{BluetoothctlScanner, ProximityScanner, SimScanner};
use crate::io::camera::{FfmpegCamera, FrameSource, SimCamera};
use crate::io::motion::{MotionInput, SimMotionInput, SysfsMotionInput};
use crate::io::tag_reader::{SerialTagReader, SimTagReader, TagReader};
use std::sync::Arc;
use tracing::{info, warn};

/// One adapter per sensor contract
pub struct SensorSuite {
    pub motion: Arc<dyn MotionInput>,
    pub camera: Box<dyn FrameSource>,
    pub tag_reader: Box<dyn TagReader>,
    pub scanner: Arc<dyn ProximityScanner>,
}

impl SensorSuite {
    pub async fn from_config(config: &Config, store: Arc<HouseholdStore>) -> Self {
        let suite = match config.sensor_mode() {
            SensorMode::Simulation => Self::simulated(config, store),
            SensorMode::Hardware => Self::hardware(config).await,
        };
        info!(mode = %config.sensor_mode().as_str(), "sensor_suite_ready");
        suite
    }

    pub fn simulated(config: &Config, store: Arc<HouseholdStore>) -> Self {
        let sim = config.simulation();
        Self {
            motion: Arc::new(SimMotionInput::new(sim.motion_probability)),
            camera: Box::new(SimCamera::new(config.camera(), sim.camera_motion)),
            tag_reader: Box::new(SimTagReader::new(sim.tag_hit_probability)),
            scanner: Arc::new(SimScanner::new(store, sim.proximity_present_probability)),
        }
    }

    pub async fn hardware(config: &Config) -> Self {
        let gpio = config.gpio();
        let motion = SysfsMotionInput::new(&gpio.sysfs_root, gpio.motion_pin);
        // Reads keep failing (and being logged) until the pin is available
        if let Err(e) = motion.prepare().await {
            warn!(pin = %gpio.motion_pin, error = %e, "gpio_prepare_failed");
        }

        Self {
            motion: Arc::new(motion),
            camera: Box::new(FfmpegCamera::new(config.camera().clone())),
            tag_reader: Box::new(SerialTagReader::new(config.tag_reader())),
            scanner: Arc::new(BluetoothctlScanner::new(&config.bluetooth().command)),
        }
    }
}
