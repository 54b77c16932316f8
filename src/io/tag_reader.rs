//! Short-range tag reader on a serial port
//!
//! The reader pushes tag IDs unsolicited whenever a tag is in range. A read
//! is a single bounded wait for pending bytes; any bytes count as a hit and
//! are reported as uppercase hex.

use crate::infra::config::TagReaderConfig;
use crate::io::error::SensorError;
use async_trait::async_trait;
use rand::Rng;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Single non-blocking tag read
#[async_trait]
pub trait TagReader: Send {
    /// `Some(tag)` when a tag was read, `None` when nothing is in range
    async fn try_read(&mut self) -> Result<Option<String>, SensorError>;
}

pub struct SerialTagReader {
    device: String,
    baud: u32,
    read_timeout: Duration,
    /// Opened lazily, dropped after an I/O error so the next read reopens
    port: Option<tokio_serial::SerialStream>,
}

impl SerialTagReader {
    pub fn new(config: &TagReaderConfig) -> Self {
        Self {
            device: config.device.clone(),
            baud: config.baud,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            port: None,
        }
    }

    fn ensure_open(&mut self) -> Result<&mut tokio_serial::SerialStream, SensorError> {
        if self.port.is_none() {
            let port = tokio_serial::new(&self.device, self.baud)
                .timeout(self.read_timeout)
                .open_native_async()
                .map_err(|e| SensorError::open(&self.device, e))?;
            info!(device = %self.device, baud = %self.baud, "tag_reader_opened");
            self.port = Some(port);
        }
        self.port.as_mut().ok_or_else(|| SensorError::NotOpen(self.device.clone()))
    }
}

#[async_trait]
impl TagReader for SerialTagReader {
    async fn try_read(&mut self) -> Result<Option<String>, SensorError> {
        let read_timeout = self.read_timeout;
        let port = self.ensure_open()?;
        let mut buf = [0u8; 64];

        match tokio::time::timeout(read_timeout, port.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => Ok(decode_tag(&buf[..n])),
            Ok(Ok(_)) => Ok(None),
            Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Ok(Err(e)) => {
                warn!(device = %self.device, error = %e, "tag_reader_read_error");
                self.port = None;
                Err(SensorError::read(&self.device, e))
            }
            Err(_) => Ok(None),
        }
    }
}

/// Uppercase hex of the raw bytes, ignoring line terminators
fn decode_tag(raw: &[u8]) -> Option<String> {
    let payload: Vec<u8> = raw.iter().copied().filter(|b| *b != b'\r' && *b != b'\n').collect();
    if payload.is_empty() {
        return None;
    }
    let tag = hex::encode_upper(payload);
    debug!(tag = %tag, "tag_read");
    Some(tag)
}

/// Simulated reader: each read hits with a fixed probability
pub struct SimTagReader {
    probability: f64,
}

impl SimTagReader {
    pub fn new(probability: f64) -> Self {
        Self { probability: probability.clamp(0.0, 1.0) }
    }
}

#[async_trait]
impl TagReader for SimTagReader {
    async fn try_read(&mut self) -> Result<Option<String>, SensorError> {
        let hit = rand::thread_rng().gen_bool(self.probability);
        Ok(hit.then(|| "E2000017221101441890".to_string()))
    }
}
