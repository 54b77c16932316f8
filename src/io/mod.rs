//! IO modules - sensors and external interfaces
//!
//! - `motion` - PIR input over sysfs GPIO
//! - `camera` - grayscale frames from a capture subprocess
//! - `tag_reader` - RFID reader on a serial port
//! - `bluetooth` - BLE advertisement scanning via bluetoothctl
//! - `sensors` - simulated or hardware sensor suite from config
//! - `push` - LINE push message client
//! - `http_api` - household config and manual trigger HTTP API

pub mod bluetooth;
pub mod camera;
pub mod error;
pub mod http_api;
pub mod motion;
pub mod push;
pub mod sensors;
pub mod tag_reader;

pub use error::SensorError;
pub use http_api::{start_api_server, ApiState};
pub use push::{LinePushClient, PushSender};
pub use sensors::SensorSuite;
