//! Sensor adapter errors

use thiserror::Error;

/// Failure reported by a sensor adapter. Never fatal to the monitor loop.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The device could not be opened (port, camera, GPIO export)
    #[error("failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    /// A read from an opened device failed
    #[error("read from {device} failed: {source}")]
    Read {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// A helper process (capture or scan tool) could not be run
    #[error("process `{program}` failed: {reason}")]
    Process { program: String, reason: String },

    /// The device produced data we could not interpret
    #[error("unexpected data from {device}: {detail}")]
    Parse { device: String, detail: String },

    /// Operation used before `open()`
    #[error("{0} is not open")]
    NotOpen(String),
}

impl SensorError {
    pub fn open(device: impl Into<String>, reason: impl ToString) -> Self {
        SensorError::Open { device: device.into(), reason: reason.to_string() }
    }

    pub fn read(device: impl Into<String>, source: std::io::Error) -> Self {
        SensorError::Read { device: device.into(), source }
    }

    pub fn process(program: impl Into<String>, reason: impl ToString) -> Self {
        SensorError::Process { program: program.into(), reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SensorError::open("/dev/ttyUSB0", "No such file or directory");
        assert_eq!(err.to_string(), "failed to open /dev/ttyUSB0: No such file or directory");

        let err = SensorError::read(
            "/dev/video0",
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "early eof"),
        );
        assert!(err.to_string().contains("early eof"));
    }
}
