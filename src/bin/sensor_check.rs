//! Sensor bring-up tool
//!
//! Exercises one sensor (or the push endpoint) at a time with the adapters
//! the service uses, so wiring can be checked on the Pi without running the
//! full monitor loop. Hardware adapters are always used, whatever the
//! config's sensor mode.

use clap::{Parser, Subcommand};
use departure_guard::domain::household::normalize_identifier;
use departure_guard::domain::types::{Advertisement, SignalSample};
use departure_guard::infra::{Config, HouseholdStore};
use departure_guard::io::bluetooth::{BluetoothctlScanner, ProximityScanner};
use departure_guard::io::camera::{FfmpegCamera, FrameSource};
use departure_guard::io::motion::{MotionInput, SysfsMotionInput};
use departure_guard::io::tag_reader::{SerialTagReader, TagReader};
use departure_guard::io::{LinePushClient, PushSender};
use departure_guard::services::background::BackgroundModel;
use departure_guard::services::proximity_probe::judge;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "sensor_check", about = "Check departure guard sensors one at a time")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    #[command(subcommand)]
    command: Check,
}

#[derive(Subcommand, Debug)]
enum Check {
    /// Print PIR state changes
    Motion {
        #[arg(long, default_value = "30")]
        seconds: u64,
    },
    /// Print foreground pixel counts per frame
    Camera {
        #[arg(long, default_value = "100")]
        frames: usize,
    },
    /// Poll the tag reader and print every tag seen
    Tag {
        #[arg(long, default_value = "100")]
        attempts: u32,
    },
    /// Scan and print advertisements, optionally judging one device
    Scan {
        #[arg(long, default_value = "3")]
        seconds: u64,
        /// Device address to judge (any separator style)
        #[arg(long)]
        device: Option<String>,
    },
    /// Send a test reminder with the credentials from the data file
    Push {
        #[arg(long, default_value = "departure guard test message")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    println!("config: {} (sensor mode ignored, using hardware)", config.config_file());

    match args.command {
        Check::Motion { seconds } => check_motion(&config, seconds).await,
        Check::Camera { frames } => check_camera(&config, frames).await,
        Check::Tag { attempts } => check_tag(&config, attempts).await,
        Check::Scan { seconds, device } => check_scan(&config, seconds, device).await,
        Check::Push { message } => check_push(&config, &message).await,
    }
}

async fn check_motion(config: &Config, seconds: u64) -> anyhow::Result<()> {
    let gpio = config.gpio();
    let motion = SysfsMotionInput::new(&gpio.sysfs_root, gpio.motion_pin);
    motion.prepare().await?;
    println!("watching gpio{} for {seconds}s", gpio.motion_pin);

    let start = Instant::now();
    let mut last: Option<bool> = None;
    while start.elapsed() < Duration::from_secs(seconds) {
        match motion.read_active().await {
            Ok(active) if last != Some(active) => {
                let state = if active { "ACTIVE" } else { "idle" };
                println!("[{:>6.2}s] {state}", start.elapsed().as_secs_f64());
                last = Some(active);
            }
            Ok(_) => {}
            Err(e) => println!("[{:>6.2}s] read failed: {e}", start.elapsed().as_secs_f64()),
        }
        tokio::time::sleep(config.trigger_poll_interval()).await;
    }
    Ok(())
}

async fn check_camera(config: &Config, frames: usize) -> anyhow::Result<()> {
    let mut camera = FfmpegCamera::new(config.camera().clone());
    camera.open().await?;

    let mut model = BackgroundModel::new();
    let threshold = config.motion_pixel_threshold();
    let start = Instant::now();
    let mut result = Ok(());
    for i in 0..frames {
        let frame = match camera.next_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                result = Err(e.into());
                break;
            }
        };
        let band = frame.central_band(config.band_fraction());
        let foreground = model.apply(frame.rows(band));
        let hit = i >= config.warmup_frames() && foreground > threshold;
        let marker = if hit { " <- hit" } else { "" };
        println!("frame {i:>4} foreground {foreground:>6}{marker}");
    }
    camera.release().await;

    let fps = frames as f64 / start.elapsed().as_secs_f64().max(0.001);
    println!("{fps:.1} fps, threshold {threshold}");
    result
}

async fn check_tag(config: &Config, attempts: u32) -> anyhow::Result<()> {
    let mut reader = SerialTagReader::new(config.tag_reader());
    let mut hits = 0u32;
    for attempt in 1..=attempts {
        match reader.try_read().await {
            Ok(Some(tag)) => {
                hits += 1;
                println!("attempt {attempt:>4}: {tag}");
            }
            Ok(None) => {}
            Err(e) => println!("attempt {attempt:>4}: error {e}"),
        }
        tokio::time::sleep(config.tag_spacing()).await;
    }
    println!("{hits}/{attempts} reads returned a tag");
    Ok(())
}

async fn check_scan(config: &Config, seconds: u64, device: Option<String>) -> anyhow::Result<()> {
    let scanner = BluetoothctlScanner::new(&config.bluetooth().command);
    let (tx, mut rx) = mpsc::unbounded_channel::<Advertisement>();
    let duration = Duration::from_secs(seconds);

    let target = device.as_deref().map(normalize_identifier);
    let start = Instant::now();
    let printer = async {
        let mut samples = Vec::new();
        while let Some(adv) = rx.recv().await {
            println!("[{:>5.2}s] {} {}", start.elapsed().as_secs_f64(), adv.identifier, adv.rssi);
            if target.as_deref() == Some(adv.identifier.as_str()) {
                samples.push(SignalSample { rssi: adv.rssi });
            }
        }
        samples
    };

    let (scan_result, samples) = tokio::join!(scanner.scan(duration, tx), printer);
    scan_result?;

    if let Some(target) = target {
        let verdict = if judge(&samples) { "still present" } else { "absent" };
        println!("{target}: {} samples, {verdict}", samples.len());
    }
    Ok(())
}

async fn check_push(config: &Config, message: &str) -> anyhow::Result<()> {
    let household = HouseholdStore::new(config.data_file()).snapshot();
    if !household.has_credentials() {
        anyhow::bail!("No push credentials in {}", config.data_file());
    }

    let client = LinePushClient::new(config.notify_endpoint(), config.notify_timeout())?;
    client.push(&household.notifier_token, &household.notifier_recipient, message).await?;
    println!("push accepted by {}", config.notify_endpoint());
    Ok(())
}
