//! Shared types for the departure pipeline

use serde::Serialize;

/// Which departure signal woke the trigger gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Manual override from the HTTP API
    Manual,
    /// Physical motion sensor read active
    Motion,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Motion => "motion",
        }
    }
}

/// Result of a camera exit confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited,
    NotExited,
    SensorError,
}

impl ExitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitOutcome::Exited => "exited",
            ExitOutcome::NotExited => "not_exited",
            ExitOutcome::SensorError => "sensor_error",
        }
    }
}

/// Per-item judgement: is the belonging still near the door?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceVerdict {
    /// Item is still at home (forgotten)
    StillPresent,
    /// Item left with the owner
    Absent,
}

impl PresenceVerdict {
    #[inline]
    pub fn from_present(present: bool) -> Self {
        if present {
            PresenceVerdict::StillPresent
        } else {
            PresenceVerdict::Absent
        }
    }

    #[inline]
    pub fn is_still_present(&self) -> bool {
        matches!(self, PresenceVerdict::StillPresent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceVerdict::StillPresent => "still_present",
            PresenceVerdict::Absent => "absent",
        }
    }
}

/// Sensing modality chosen for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensingModality {
    /// Short-range tag reader poll
    Tag,
    /// Bluetooth proximity scan for the given (normalized) identifier
    Proximity(String),
}

/// One advertisement received during a proximity scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Normalized device identifier (uppercase, no separators)
    pub identifier: String,
    /// Received signal strength in dBm
    pub rssi: i16,
}

/// Signal strength of one advertisement kept for a scan window
#[derive(Debug, Clone, Copy)]
pub struct SignalSample {
    pub rssi: i16,
}

/// Foreground pixel count of one judged frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSample {
    pub foreground_pixels: usize,
    pub threshold: usize,
}

impl MotionSample {
    #[inline]
    pub fn is_hit(&self) -> bool {
        self.foreground_pixels > self.threshold
    }
}

/// Grayscale frame, row-major, one byte per pixel
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        Self { width, height, pixels }
    }

    /// Uniform frame, used by simulated cameras and tests
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self { width, height, pixels: vec![value; width * height] }
    }

    /// Rows of the central horizontal band covering `fraction` of the height
    pub fn central_band(&self, fraction: f32) -> std::ops::Range<usize> {
        let fraction = fraction.clamp(0.0, 1.0);
        let band = ((self.height as f32) * fraction).round() as usize;
        let start = (self.height - band.min(self.height)) / 2;
        start..start + band.min(self.height)
    }

    /// Pixel slice for a row range
    pub fn rows(&self, rows: std::ops::Range<usize>) -> &[u8] {
        &self.pixels[rows.start * self.width..rows.end * self.width]
    }
}
