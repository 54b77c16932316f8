//! Service configuration loading from TOML files
//!
//! The binaries pick the file with `--config`, the CONFIG_FILE environment
//! variable or config/dev.toml, in that order. A missing or broken file
//! falls back to defaults.
//!
//! The household data (items, credentials) lives in the JSON store, not here.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorMode {
    Simulation,
    Hardware,
}

impl SensorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorMode::Simulation => "simulation",
            SensorMode::Hardware => "hardware",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    pub mode: SensorMode,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self { mode: SensorMode::Simulation }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpioConfig {
    /// BCM pin number of the PIR output
    #[serde(default = "default_motion_pin")]
    pub motion_pin: u32,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,
}

fn default_motion_pin() -> u32 {
    18
}

fn default_sysfs_root() -> String {
    "/sys/class/gpio".to_string()
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self { motion_pin: default_motion_pin(), sysfs_root: default_sysfs_root() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Capture program producing raw gray frames on stdout
    #[serde(default = "default_camera_command")]
    pub command: String,
    #[serde(default = "default_camera_device")]
    pub device: String,
    #[serde(default = "default_camera_width")]
    pub width: usize,
    #[serde(default = "default_camera_height")]
    pub height: usize,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

fn default_camera_command() -> String {
    "ffmpeg".to_string()
}

fn default_camera_device() -> String {
    "/dev/video0".to_string()
}

fn default_camera_width() -> usize {
    320
}

fn default_camera_height() -> usize {
    240
}

fn default_camera_fps() -> u32 {
    15
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: default_camera_command(),
            device: default_camera_device(),
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagReaderConfig {
    #[serde(default = "default_tag_device")]
    pub device: String,
    #[serde(default = "default_tag_baud")]
    pub baud: u32,
    /// Upper bound on a single non-blocking read
    #[serde(default = "default_tag_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_tag_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_tag_baud() -> u32 {
    115200
}

fn default_tag_read_timeout_ms() -> u64 {
    20
}

impl Default for TagReaderConfig {
    fn default() -> Self {
        Self {
            device: default_tag_device(),
            baud: default_tag_baud(),
            read_timeout_ms: default_tag_read_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BluetoothConfig {
    #[serde(default = "default_bluetooth_command")]
    pub command: String,
}

fn default_bluetooth_command() -> String {
    "bluetoothctl".to_string()
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self { command: default_bluetooth_command() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub trigger_poll_ms: u64,
    pub exit_timeout_ms: u64,
    pub warmup_frames: usize,
    pub motion_pixel_threshold: usize,
    pub motion_min_run: usize,
    /// Fraction of frame height kept as the central judgement band
    pub band_fraction: f32,
    pub tag_attempts: u32,
    pub tag_spacing_ms: u64,
    pub proximity_scan_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            trigger_poll_ms: 500,
            exit_timeout_ms: 3000,
            warmup_frames: 10,
            motion_pixel_threshold: 5000,
            motion_min_run: 3,
            band_fraction: 0.5,
            tag_attempts: 30,
            tag_spacing_ms: 100,
            proximity_scan_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
    /// Minimum spacing between push attempts
    #[serde(default = "default_notify_min_interval_secs")]
    pub min_interval_secs: u64,
}

fn default_notify_endpoint() -> String {
    "https://api.line.me/v2/bot/message/push".to_string()
}

fn default_notify_timeout_ms() -> u64 {
    5000
}

fn default_notify_min_interval_secs() -> u64 {
    15
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            endpoint: default_notify_endpoint(),
            timeout_ms: default_notify_timeout_ms(),
            min_interval_secs: default_notify_min_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub cooldown_secs: u64,
    pub error_backoff_ms: u64,
    pub idle_poll_secs: u64,
    /// Period of the metrics summary log line
    pub metrics_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 10,
            error_backoff_ms: 1000,
            idle_poll_secs: 2,
            metrics_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    /// Config API port (0 to disable)
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_address: default_http_bind_address(), port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_file")]
    pub data_file: String,
}

fn default_data_file() -> String {
    "data.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { data_file: default_data_file() }
    }
}

/// Knobs for the simulated sensors
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Probability that a simulated PIR poll reads active
    pub motion_probability: f64,
    /// Whether the simulated camera shows someone walking through
    pub camera_motion: bool,
    pub tag_hit_probability: f64,
    pub proximity_present_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            motion_probability: 0.0,
            camera_motion: true,
            tag_hit_probability: 0.5,
            proximity_present_probability: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub tag_reader: TagReaderConfig,
    #[serde(default)]
    pub bluetooth: BluetoothConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    sensor_mode: SensorMode,
    gpio: GpioConfig,
    camera: CameraConfig,
    tag_reader: TagReaderConfig,
    bluetooth: BluetoothConfig,
    detection: DetectionConfig,
    notify: NotifyConfig,
    monitor: MonitorConfig,
    http: HttpConfig,
    store: StoreConfig,
    simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            config_file,
            sensor_mode: toml_config.sensors.mode,
            gpio: toml_config.gpio,
            camera: toml_config.camera,
            tag_reader: toml_config.tag_reader,
            bluetooth: toml_config.bluetooth,
            detection: toml_config.detection,
            notify: toml_config.notify,
            monitor: toml_config.monitor,
            http: toml_config.http,
            store: toml_config.store,
            simulation: toml_config.simulation,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn sensor_mode(&self) -> SensorMode {
        self.sensor_mode
    }

    pub fn gpio(&self) -> &GpioConfig {
        &self.gpio
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    pub fn tag_reader(&self) -> &TagReaderConfig {
        &self.tag_reader
    }

    pub fn bluetooth(&self) -> &BluetoothConfig {
        &self.bluetooth
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn trigger_poll_interval(&self) -> Duration {
        Duration::from_millis(self.detection.trigger_poll_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.detection.exit_timeout_ms)
    }

    pub fn warmup_frames(&self) -> usize {
        self.detection.warmup_frames
    }

    pub fn motion_pixel_threshold(&self) -> usize {
        self.detection.motion_pixel_threshold
    }

    pub fn motion_min_run(&self) -> usize {
        self.detection.motion_min_run
    }

    pub fn band_fraction(&self) -> f32 {
        self.detection.band_fraction
    }

    pub fn tag_attempts(&self) -> u32 {
        self.detection.tag_attempts
    }

    pub fn tag_spacing(&self) -> Duration {
        Duration::from_millis(self.detection.tag_spacing_ms)
    }

    pub fn proximity_scan_duration(&self) -> Duration {
        Duration::from_millis(self.detection.proximity_scan_ms)
    }

    pub fn notify_endpoint(&self) -> &str {
        &self.notify.endpoint
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify.timeout_ms)
    }

    pub fn notify_min_interval(&self) -> Duration {
        Duration::from_secs(self.notify.min_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.monitor.cooldown_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.monitor.error_backoff_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.idle_poll_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.metrics_interval_secs.max(1))
    }

    pub fn http_bind_address(&self) -> &str {
        &self.http.bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http.port
    }

    pub fn data_file(&self) -> &str {
        &self.store.data_file
    }

    /// Builder method for tests to switch sensor mode
    #[cfg(test)]
    pub fn with_sensor_mode(mut self, mode: SensorMode) -> Self {
        self.sensor_mode = mode;
        self
    }
}
