//! Bluetooth LE advertisement scanning
//!
//! Hardware mode runs `bluetoothctl --timeout <secs> scan on` and parses the
//! RSSI change lines it prints for every advertisement it sees:
//!
//! ```text
//! [CHG] Device AA:BB:CC:DD:EE:FF RSSI: -60
//! [CHG] Device AA:BB:CC:DD:EE:FF RSSI: 0xffffffc4 (-60)
//! ```
//!
//! Each parsed advertisement is pushed into the caller's channel as it
//! arrives; the scan stops when the duration elapses.

use crate::domain::household::{normalize_identifier, HouseholdConfig};
use crate::domain::types::{Advertisement, SensingModality};
use crate::infra::store::HouseholdStore;
use crate::io::error::SensorError;
use async_trait::async_trait;
use rand::Rng;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Timed advertisement scan feeding an event channel
#[async_trait]
pub trait ProximityScanner: Send + Sync {
    /// Scan for `duration`, sending every advertisement to `events` in
    /// arrival order. Returns when the scan has stopped.
    async fn scan(
        &self,
        duration: Duration,
        events: mpsc::UnboundedSender<Advertisement>,
    ) -> Result<(), SensorError>;
}

pub struct BluetoothctlScanner {
    command: String,
}

impl BluetoothctlScanner {
    pub fn new(command: &str) -> Self {
        Self { command: command.to_string() }
    }
}

#[async_trait]
impl ProximityScanner for BluetoothctlScanner {
    async fn scan(
        &self,
        duration: Duration,
        events: mpsc::UnboundedSender<Advertisement>,
    ) -> Result<(), SensorError> {
        let timeout_secs = duration.as_secs().max(1).to_string();
        let mut child = Command::new(&self.command)
            .args(["--timeout", timeout_secs.as_str(), "scan", "on"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SensorError::process(&self.command, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SensorError::process(&self.command, "stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();

        info!(duration_ms = %duration.as_millis(), "ble_scan_started");
        let deadline = tokio::time::Instant::now() + duration;
        let mut seen = 0usize;

        let read_result = loop {
            match tokio::time::timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if let Some(adv) = parse_advertisement(&line) {
                        seen += 1;
                        if events.send(adv).is_err() {
                            break Ok(());
                        }
                    }
                }
                // Tool exited on its own (its --timeout rounds to whole seconds)
                Ok(Ok(None)) => break Ok(()),
                Ok(Err(e)) => break Err(SensorError::read(&self.command, e)),
                Err(_) => break Ok(()),
            }
        };

        if let Err(e) = child.kill().await {
            debug!(error = %e, "ble_scan_kill_failed");
        }
        info!(advertisements = %seen, "ble_scan_stopped");
        read_result
    }
}

/// Parse one `bluetoothctl` output line into an advertisement
pub fn parse_advertisement(line: &str) -> Option<Advertisement> {
    let after_device = &line[line.find("Device ")? + "Device ".len()..];
    let address: String = after_device.chars().take(17).collect();
    if address.len() != 17 || address.chars().filter(|c| *c == ':').count() != 5 {
        return None;
    }

    let after_rssi = after_device[after_device.find("RSSI:")? + "RSSI:".len()..].trim();
    let value = match (after_rssi.find('('), after_rssi.find(')')) {
        (Some(open), Some(close)) if open < close => &after_rssi[open + 1..close],
        _ => after_rssi.split_whitespace().next()?,
    };
    let rssi = value.trim().parse::<i16>().ok()?;

    Some(Advertisement { identifier: normalize_identifier(&address), rssi })
}

const SIM_SAMPLES_PER_SCAN: u32 = 6;

/// Simulated scanner advertising every proximity item in the household
/// config. Each device is randomly either resting near the door (stable
/// signal) or walking away (signal decaying by several dB per sample).
pub struct SimScanner {
    store: Arc<HouseholdStore>,
    present_probability: f64,
}

impl SimScanner {
    pub fn new(store: Arc<HouseholdStore>, present_probability: f64) -> Self {
        Self { store, present_probability: present_probability.clamp(0.0, 1.0) }
    }
}

/// RSSI step per sample for every proximity item: 0 stays put, -6 walks away
fn walk_plan(household: &HouseholdConfig, present_probability: f64) -> Vec<(String, i16)> {
    let mut rng = rand::thread_rng();
    household
        .items
        .iter()
        .filter_map(|item| match item.modality() {
            SensingModality::Proximity(id) => Some(id),
            SensingModality::Tag => None,
        })
        .map(|id| {
            let step = if rng.gen_bool(present_probability) { 0 } else { -6 };
            (id, step)
        })
        .collect()
}

#[async_trait]
impl ProximityScanner for SimScanner {
    async fn scan(
        &self,
        duration: Duration,
        events: mpsc::UnboundedSender<Advertisement>,
    ) -> Result<(), SensorError> {
        let store = self.store.clone();
        let present_probability = self.present_probability;
        let plan =
            tokio::task::spawn_blocking(move || walk_plan(&store.snapshot(), present_probability))
                .await
                .map_err(|e| SensorError::process("sim-scanner", e))?;
        let interval = duration / SIM_SAMPLES_PER_SCAN;
        for i in 0..SIM_SAMPLES_PER_SCAN {
            tokio::time::sleep(interval).await;
            for (identifier, step) in &plan {
                let rssi = -60 + step * i as i16;
                if events.send(Advertisement { identifier: identifier.clone(), rssi }).is_err() {
                    warn!("sim_scan_receiver_dropped");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::household::Item;
    use tempfile::tempdir;

    #[test]
    fn test_parse_plain_rssi() {
        let adv = parse_advertisement("[CHG] Device AA:BB:CC:DD:EE:FF RSSI: -60").unwrap();
        assert_eq!(adv.identifier, "AABBCCDDEEFF");
        assert_eq!(adv.rssi, -60);
    }

    #[test]
    fn test_parse_hex_rssi_with_colors() {
        let line = "\u{1b}[0;93m[CHG]\u{1b}[0m Device 11:22:33:44:55:66 RSSI: 0xffffffb0 (-80)";
        let adv = parse_advertisement(line).unwrap();
        assert_eq!(adv.identifier, "112233445566");
        assert_eq!(adv.rssi, -80);
    }

    #[test]
    fn test_parse_ignores_non_rssi_lines() {
        assert!(parse_advertisement("[NEW] Device AA:BB:CC:DD:EE:FF Phone").is_none());
        assert!(parse_advertisement("Discovery started").is_none());
        assert!(parse_advertisement("[CHG] Device AA:BB RSSI: -60").is_none());
        assert!(parse_advertisement("[CHG] Device AA:BB:CC:DD:EE:FF RSSI: loud").is_none());
    }

    #[tokio::test]
    async fn test_missing_tool_is_process_error() {
        let scanner = BluetoothctlScanner::new("/nonexistent/bluetoothctl");
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = scanner.scan(Duration::from_millis(10), tx).await;
        assert!(matches!(result, Err(SensorError::Process { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_scanner_advertises_proximity_items_only() {
        let dir = tempdir().unwrap();
        let store = Arc::new(HouseholdStore::new(dir.path().join("data.json")));
        store
            .save(&HouseholdConfig {
                items: vec![
                    Item {
                        name: "phone".to_string(),
                        identifier: "aa:bb:cc:dd:ee:ff".to_string(),
                        enabled: true,
                        start_time: "00:00".to_string(),
                        end_time: "23:59".to_string(),
                    },
                    Item {
                        name: "keys".to_string(),
                        identifier: String::new(),
                        enabled: true,
                        start_time: "00:00".to_string(),
                        end_time: "23:59".to_string(),
                    },
                ],
                ..Default::default()
            })
            .unwrap();

        let scanner = SimScanner::new(store, 1.0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        scanner.scan(Duration::from_secs(3), tx).await.unwrap();

        let mut received = Vec::new();
        while let Ok(adv) = rx.try_recv() {
            received.push(adv);
        }
        assert_eq!(received.len(), SIM_SAMPLES_PER_SCAN as usize);
        assert!(received.iter().all(|a| a.identifier == "AABBCCDDEEFF" && a.rssi == -60));
    }

    #[test]
    fn test_walk_plan_without_presence_walks_every_device_away() {
        let household = HouseholdConfig {
            items: vec![Item {
                name: "watch".to_string(),
                identifier: "11:22:33:44:55:66".to_string(),
                enabled: true,
                start_time: "00:00".to_string(),
                end_time: "23:59".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(walk_plan(&household, 0.0), vec![("112233445566".to_string(), -6)]);
    }
}
