//! Tests for the MonitorLoop module

use super::*;
use crate::domain::household::Item;
use crate::domain::types::{Advertisement, Frame};
use crate::io::bluetooth::ProximityScanner;
use crate::io::camera::FrameSource;
use crate::io::error::SensorError;
use crate::io::motion::MotionInput;
use crate::io::tag_reader::TagReader;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;

const W: usize = 20;
const H: usize = 20;

/// Call counters shared between the stubs and the test body
#[derive(Default)]
struct Counters {
    motion_reads: AtomicU32,
    camera_opens: AtomicU32,
    tag_reads: AtomicU32,
    scans: AtomicU32,
    pushes: Mutex<Vec<String>>,
}

struct AlwaysActive(Arc<Counters>);

#[async_trait]
impl MotionInput for AlwaysActive {
    async fn read_active(&self) -> Result<bool, SensorError> {
        self.0.motion_reads.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

struct NeverActive;

#[async_trait]
impl MotionInput for NeverActive {
    async fn read_active(&self) -> Result<bool, SensorError> {
        Ok(false)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Scene {
    Empty,
    /// Empty during warm-up, then a person on every frame
    Walker,
    /// Camera cannot be opened
    Unplugged,
}

struct Hallway {
    counters: Arc<Counters>,
    scene: Scene,
    frames: usize,
}

#[async_trait]
impl FrameSource for Hallway {
    async fn open(&mut self) -> Result<(), SensorError> {
        self.counters.camera_opens.fetch_add(1, Ordering::SeqCst);
        if self.scene == Scene::Unplugged {
            return Err(SensorError::open("/dev/video0", "no such device"));
        }
        self.frames = 0;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, SensorError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.frames += 1;
        let mut frame = Frame::filled(W, H, 40);
        if self.scene == Scene::Walker && self.frames > 2 {
            for row in 0..H {
                frame.pixels[row * W..row * W + 10].fill(200);
            }
        }
        Ok(frame)
    }

    async fn release(&mut self) {}
}

/// Someone disables the system while the gate is waiting: the first read
/// saves a disabled document, later reads see motion
struct EditedWhileWaiting {
    store: HouseholdStore,
    reads: AtomicU32,
}

#[async_trait]
impl MotionInput for EditedWhileWaiting {
    async fn read_active(&self) -> Result<bool, SensorError> {
        if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
            let disabled =
                HouseholdConfig { system_enabled: false, items: vec![], ..household(true) };
            self.store.save(&disabled).unwrap();
            return Ok(false);
        }
        Ok(true)
    }
}

struct TagOnShelf(Arc<Counters>);

#[async_trait]
impl TagReader for TagOnShelf {
    async fn try_read(&mut self) -> Result<Option<String>, SensorError> {
        self.0.tag_reads.fetch_add(1, Ordering::SeqCst);
        Ok(Some("04A1B2".to_string()))
    }
}

/// The phone sits still next to the door; the watch walks away
struct Beacons(Arc<Counters>);

#[async_trait]
impl ProximityScanner for Beacons {
    async fn scan(
        &self,
        duration: Duration,
        events: mpsc::UnboundedSender<Advertisement>,
    ) -> Result<(), SensorError> {
        self.0.scans.fetch_add(1, Ordering::SeqCst);
        for (phone, watch) in [(-55, -60), (-56, -72), (-55, -81)] {
            for (identifier, rssi) in [("AABBCCDDEEFF", phone), ("112233445566", watch)] {
                let _ = events.send(Advertisement { identifier: identifier.to_string(), rssi });
            }
            tokio::time::sleep(duration / 4).await;
        }
        Ok(())
    }
}

struct RecordingPush(Arc<Counters>);

#[async_trait]
impl PushSender for RecordingPush {
    async fn push(&self, _token: &str, _recipient: &str, message: &str) -> anyhow::Result<()> {
        self.0.pushes.lock().push(message.to_string());
        Ok(())
    }
}

fn item(name: &str, identifier: &str, enabled: bool, start: &str, end: &str) -> Item {
    Item {
        name: name.to_string(),
        identifier: identifier.to_string(),
        enabled,
        start_time: start.to_string(),
        end_time: end.to_string(),
    }
}

fn household(system_enabled: bool) -> HouseholdConfig {
    HouseholdConfig {
        system_enabled,
        items: vec![
            item("keys", "", true, "08:00", "18:00"),
            item("phone", "aa:bb:cc:dd:ee:ff", true, "00:00", "23:59"),
            item("watch", "11:22:33:44:55:66", true, "00:00", "23:59"),
            item("umbrella", "RFID", true, "19:00", "23:00"),
            item("wallet", "CC:CC:CC:CC:CC:CC", false, "00:00", "23:59"),
        ],
        notifier_token: "token".to_string(),
        notifier_recipient: "U123".to_string(),
    }
}

fn afternoon() -> String {
    "14:05".to_string()
}

struct Harness {
    monitor: MonitorLoop,
    counters: Arc<Counters>,
    metrics: Arc<Metrics>,
    _dir: tempfile::TempDir,
}

fn harness(doc: &HouseholdConfig, scene: Scene, motion: Option<Arc<dyn MotionInput>>) -> Harness {
    harness_in(tempfile::tempdir().unwrap(), doc, scene, motion)
}

fn harness_in(
    dir: tempfile::TempDir,
    doc: &HouseholdConfig,
    scene: Scene,
    motion: Option<Arc<dyn MotionInput>>,
) -> Harness {
    let store = Arc::new(HouseholdStore::new(dir.path().join("data.json")));
    store.save(doc).unwrap();

    let counters = Arc::new(Counters::default());
    let metrics = Arc::new(Metrics::new());
    let motion: Arc<dyn MotionInput> = match motion {
        Some(motion) => motion,
        None => Arc::new(AlwaysActive(counters.clone())),
    };

    let gate = TriggerGate::new(motion, ManualTrigger::new(), Duration::from_millis(500));
    let confirmer = ExitConfirmer::new(
        Box::new(Hallway { counters: counters.clone(), scene, frames: 0 }),
        ExitConfirmerParams {
            warmup_frames: 2,
            pixel_threshold: 50,
            min_run: 3,
            band_fraction: 0.5,
        },
    );
    let router = ItemPresenceRouter::new(
        TagPresenceProbe::new(Box::new(TagOnShelf(counters.clone()))),
        ProximityPresenceProbe::new(Arc::new(Beacons(counters.clone()))),
        ProbeBudget::default(),
    );
    let push = Arc::new(RecordingPush(counters.clone()));
    let throttle = NotificationThrottle::new(push, Duration::from_secs(15));

    let monitor = MonitorLoop::new(
        store,
        gate,
        confirmer,
        router,
        throttle,
        metrics.clone(),
        MonitorTimings::default(),
    )
    .with_time_of_day(afternoon);

    Harness { monitor, counters, metrics, _dir: dir }
}

#[tokio::test(start_paused = true)]
async fn test_disabled_system_touches_no_sensor() {
    let mut h = harness(&household(false), Scene::Walker, None);

    let outcome = h.monitor.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Disabled);
    assert_eq!(h.counters.motion_reads.load(Ordering::SeqCst), 0);
    assert_eq!(h.counters.camera_opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.counters.tag_reads.load(Ordering::SeqCst), 0);
    assert_eq!(h.counters.scans.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.report().cycles_total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_exit_reports_every_forgotten_item() {
    let mut h = harness(&household(true), Scene::Walker, None);

    let outcome = h.monitor.run_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            checked: 3,
            forgotten: vec!["keys".to_string(), "phone".to_string()],
            notify: Some(NotifyOutcome::Sent),
        }
    );
    // keys hit on the first read; umbrella is outside its window
    assert_eq!(h.counters.tag_reads.load(Ordering::SeqCst), 1);
    // phone and watch only; the disabled wallet is never scanned
    assert_eq!(h.counters.scans.load(Ordering::SeqCst), 2);

    let pushes = h.counters.pushes.lock();
    assert_eq!(pushes.len(), 1);
    assert!(pushes[0].ends_with("keys, phone"));

    let summary = h.metrics.report();
    assert_eq!(summary.exits_confirmed, 1);
    assert_eq!(summary.items_checked, 3);
    assert_eq!(summary.items_still_present, 2);
    assert_eq!(summary.notifications_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_exit_skips_item_checks() {
    let mut h = harness(&household(true), Scene::Empty, None);

    let outcome = h.monitor.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::NotExited);
    assert_eq!(h.counters.camera_opens.load(Ordering::SeqCst), 1);
    assert_eq!(h.counters.tag_reads.load(Ordering::SeqCst), 0);
    assert_eq!(h.counters.scans.load(Ordering::SeqCst), 0);
    assert!(h.counters.pushes.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_nothing_forgotten_sends_nothing() {
    let mut doc = household(true);
    doc.items = vec![item("watch", "11:22:33:44:55:66", true, "00:00", "23:59")];
    let mut h = harness(&doc, Scene::Walker, None);

    let outcome = h.monitor.run_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Completed { checked: 1, forgotten: vec![], notify: None }
    );
    assert!(h.counters.pushes.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_departure_within_interval_is_throttled() {
    let mut h = harness(&household(true), Scene::Walker, None);

    h.monitor.run_cycle().await.unwrap();
    let second = h.monitor.run_cycle().await.unwrap();

    match second {
        CycleOutcome::Completed { notify, .. } => {
            assert_eq!(notify, Some(NotifyOutcome::Throttled))
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.counters.pushes.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let h = harness(&household(true), Scene::Walker, Some(Arc::new(NeverActive)));
    let mut monitor = h.monitor;
    let (tx, rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        monitor.run(rx).await;
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_wait_applies_to_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let motion: Arc<dyn MotionInput> = Arc::new(EditedWhileWaiting {
        store: HouseholdStore::new(dir.path().join("data.json")),
        reads: AtomicU32::new(0),
    });
    let mut h = harness_in(dir, &household(true), Scene::Walker, Some(motion));

    let first = h.monitor.run_cycle().await.unwrap();
    assert_eq!(
        first,
        CycleOutcome::Completed {
            checked: 3,
            forgotten: vec!["keys".to_string(), "phone".to_string()],
            notify: Some(NotifyOutcome::Sent),
        }
    );

    let second = h.monitor.run_cycle().await.unwrap();
    assert_eq!(second, CycleOutcome::Disabled);
    assert_eq!(h.counters.camera_opens.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unplugged_camera_backs_off_between_cycles() {
    let h = harness(&household(true), Scene::Unplugged, None);
    let counters = h.counters.clone();
    let mut monitor = h.monitor;
    let (tx, rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        monitor.run(rx).await;
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

    // One open per second of error backoff
    let opens = counters.camera_opens.load(Ordering::SeqCst);
    assert!((2..=12).contains(&opens), "camera opened {opens} times");
}
