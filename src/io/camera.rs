//! Frame capture
//!
//! Hardware mode spawns a capture program (ffmpeg by default) that writes raw
//! 8-bit grayscale frames of a fixed size to stdout; each frame is exactly
//! `width * height` bytes.

use crate::domain::types::Frame;
use crate::infra::config::CameraConfig;
use crate::io::error::SensorError;
use async_trait::async_trait;
use rand::Rng;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Source of grayscale frames for exit confirmation
#[async_trait]
pub trait FrameSource: Send {
    async fn open(&mut self) -> Result<(), SensorError>;
    async fn next_frame(&mut self) -> Result<Frame, SensorError>;
    /// Stop capturing; safe to call when not open
    async fn release(&mut self);
}

pub struct FfmpegCamera {
    config: CameraConfig,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config, child: None, stdout: None }
    }

    fn capture_args(&self) -> Vec<String> {
        let size = format!("{}x{}", self.config.width, self.config.height);
        vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "v4l2".to_string(),
            "-framerate".to_string(),
            self.config.fps.to_string(),
            "-video_size".to_string(),
            size.clone(),
            "-i".to_string(),
            self.config.device.clone(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "gray".to_string(),
            "-s".to_string(),
            size,
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl FrameSource for FfmpegCamera {
    async fn open(&mut self) -> Result<(), SensorError> {
        self.release().await;

        let mut child = Command::new(&self.config.command)
            .args(self.capture_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SensorError::open(&self.config.device, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SensorError::open(&self.config.device, "capture stdout unavailable"))?;

        info!(
            device = %self.config.device,
            width = %self.config.width,
            height = %self.config.height,
            "camera_opened"
        );
        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, SensorError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(SensorError::NotOpen(self.config.device.clone()));
        };
        let mut pixels = vec![0u8; self.config.width * self.config.height];
        stdout
            .read_exact(&mut pixels)
            .await
            .map_err(|e| SensorError::read(&self.config.device, e))?;
        Ok(Frame::new(self.config.width, self.config.height, pixels))
    }

    async fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "camera_release_failed");
            } else {
                debug!(device = %self.config.device, "camera_released");
            }
        }
    }
}

const SIM_BACKGROUND: u8 = 40;
const SIM_FOREGROUND: u8 = 200;
/// Frames of empty scene before the simulated person appears
const SIM_EMPTY_FRAMES: usize = 12;

/// Synthetic doorway: a static noisy scene, optionally with a bright
/// silhouette walking across the middle of the frame.
pub struct SimCamera {
    width: usize,
    height: usize,
    frame_interval: Duration,
    with_motion: bool,
    frame_index: usize,
    open: bool,
}

impl SimCamera {
    pub fn new(config: &CameraConfig, with_motion: bool) -> Self {
        let fps = config.fps.max(1) as u64;
        Self {
            width: config.width,
            height: config.height,
            frame_interval: Duration::from_millis(1000 / fps),
            with_motion,
            frame_index: 0,
            open: false,
        }
    }

    fn render(&self) -> Frame {
        let mut rng = rand::thread_rng();
        let mut pixels: Vec<u8> = (0..self.width * self.height)
            .map(|_| SIM_BACKGROUND.saturating_add(rng.gen_range(0..3)))
            .collect();

        if self.with_motion && self.frame_index >= SIM_EMPTY_FRAMES {
            // Silhouette: a quarter of the width, full height, moving right
            let body_w = (self.width / 4).max(1);
            let step = (self.width / 16).max(1);
            let x0 = ((self.frame_index - SIM_EMPTY_FRAMES) * step) % self.width;
            for row in 0..self.height {
                for col in x0..(x0 + body_w).min(self.width) {
                    pixels[row * self.width + col] = SIM_FOREGROUND;
                }
            }
        }

        Frame::new(self.width, self.height, pixels)
    }
}

#[async_trait]
impl FrameSource for SimCamera {
    async fn open(&mut self) -> Result<(), SensorError> {
        self.frame_index = 0;
        self.open = true;
        debug!(with_motion = %self.with_motion, "sim_camera_opened");
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, SensorError> {
        if !self.open {
            return Err(SensorError::NotOpen("sim_camera".to_string()));
        }
        tokio::time::sleep(self.frame_interval).await;
        let frame = self.render();
        self.frame_index += 1;
        Ok(frame)
    }

    async fn release(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CameraConfig {
        CameraConfig { width: 64, height: 48, fps: 30, ..Default::default() }
    }

    #[test]
    fn test_capture_args_contain_geometry() {
        let camera = FfmpegCamera::new(small_config());
        let args = camera.capture_args();
        assert!(args.contains(&"64x48".to_string()));
        assert!(args.contains(&"/dev/video0".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[tokio::test]
    async fn test_ffmpeg_next_frame_before_open() {
        let mut camera = FfmpegCamera::new(small_config());
        assert!(matches!(camera.next_frame().await, Err(SensorError::NotOpen(_))));
        camera.release().await;
    }

    #[tokio::test]
    async fn test_missing_capture_program_fails_open() {
        let config =
            CameraConfig { command: "/nonexistent/capture-tool".to_string(), ..small_config() };
        let mut camera = FfmpegCamera::new(config);
        assert!(matches!(camera.open().await, Err(SensorError::Open { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_camera_silhouette_appears() {
        let mut camera = SimCamera::new(&small_config(), true);
        camera.open().await.unwrap();
        let first = camera.next_frame().await.unwrap();
        assert!(first.pixels.iter().all(|&p| p < SIM_FOREGROUND));

        for _ in 1..SIM_EMPTY_FRAMES {
            camera.next_frame().await.unwrap();
        }
        let with_person = camera.next_frame().await.unwrap();
        let bright = with_person.pixels.iter().filter(|&&p| p == SIM_FOREGROUND).count();
        assert_eq!(bright, 16 * 48);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_camera_requires_open() {
        let mut camera = SimCamera::new(&small_config(), false);
        assert!(camera.next_frame().await.is_err());
    }
}
