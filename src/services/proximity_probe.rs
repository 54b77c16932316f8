//! Bluetooth proximity presence probe
//!
//! Collects the RSSI of one device over a fixed scan window and compares the
//! first and last samples. A stable signal means the device is still resting
//! where it was; a large change means it is moving away with the owner.

use crate::domain::types::SignalSample;
use crate::io::bluetooth::ProximityScanner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Largest first-to-last RSSI change (dB) still judged as "not moving"
pub const RSSI_STABLE_DELTA: i16 = 5;

/// Extra time granted to a scanner that overruns its own duration
const SCAN_GRACE: Duration = Duration::from_secs(2);

/// `true` (still present) when at least two samples exist and the
/// first-to-last change is within [`RSSI_STABLE_DELTA`].
pub fn judge(samples: &[SignalSample]) -> bool {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() >= 2 => {
            (last.rssi - first.rssi).abs() <= RSSI_STABLE_DELTA
        }
        _ => false,
    }
}

pub struct ProximityPresenceProbe {
    scanner: Arc<dyn ProximityScanner>,
}

impl ProximityPresenceProbe {
    pub fn new(scanner: Arc<dyn ProximityScanner>) -> Self {
        Self { scanner }
    }

    /// Scan for the full `duration`, then judge the samples of `identifier`
    /// (normalized form). Scanner failures are judged absent.
    pub async fn scan_and_judge(&self, identifier: &str, duration: Duration) -> bool {
        match self.collect(identifier, duration).await {
            Some(samples) => {
                let present = judge(&samples);
                info!(
                    identifier = %identifier,
                    samples = %samples.len(),
                    first_rssi = ?samples.first().map(|s| s.rssi),
                    last_rssi = ?samples.last().map(|s| s.rssi),
                    present = %present,
                    "proximity_judged"
                );
                present
            }
            None => false,
        }
    }

    /// Samples for `identifier` in arrival order, or `None` if the scan failed
    async fn collect(&self, identifier: &str, duration: Duration) -> Option<Vec<SignalSample>> {
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let scan = tokio::time::timeout(duration + SCAN_GRACE, self.scanner.scan(duration, tx));
        let drain = async {
            let mut samples = Vec::new();
            // Ends when the scanner drops its sender
            while let Some(adv) = rx.recv().await {
                if adv.identifier == identifier {
                    samples.push(SignalSample { rssi: adv.rssi });
                }
            }
            samples
        };

        let (scan_result, samples) = tokio::join!(scan, drain);
        match scan_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(identifier = %identifier, error = %e, "proximity_scan_failed");
                return None;
            }
            Err(_) => {
                warn!(identifier = %identifier, "proximity_scan_overran");
                return None;
            }
        }

        // The judgement window is fixed even if the scanner stopped early
        let remaining = duration.saturating_sub(started.elapsed());
        if !remaining.is_zero() {
            debug!(remaining_ms = %remaining.as_millis(), "proximity_scan_short");
            tokio::time::sleep(remaining).await;
        }
        Some(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Advertisement;
    use crate::io::error::SensorError;
    use async_trait::async_trait;

    fn samples(rssi: &[i16]) -> Vec<SignalSample> {
        rssi.iter().map(|&rssi| SignalSample { rssi }).collect()
    }

    #[test]
    fn test_judge_stable_signal_is_present() {
        assert!(judge(&samples(&[-60, -61])));
        assert!(judge(&samples(&[-60, -90, -65])));
    }

    #[test]
    fn test_judge_decaying_signal_is_absent() {
        assert!(!judge(&samples(&[-60, -80])));
        assert!(!judge(&samples(&[-60, -66])));
    }

    #[test]
    fn test_judge_boundary_is_inclusive() {
        assert!(judge(&samples(&[-60, -65])));
        assert!(judge(&samples(&[-65, -60])));
    }

    #[test]
    fn test_judge_insufficient_samples() {
        assert!(!judge(&samples(&[])));
        assert!(!judge(&samples(&[-60])));
    }

    /// Emits a fixed list of advertisements spread over the scan window
    struct StubScanner {
        ads: Vec<(&'static str, i16)>,
        fail: bool,
        stop_early: bool,
    }

    #[async_trait]
    impl ProximityScanner for StubScanner {
        async fn scan(
            &self,
            duration: Duration,
            events: mpsc::UnboundedSender<Advertisement>,
        ) -> Result<(), SensorError> {
            if self.fail {
                return Err(SensorError::process("bluetoothctl", "adapter down"));
            }
            let step = duration / (self.ads.len() as u32 + 1);
            for (id, rssi) in &self.ads {
                tokio::time::sleep(step).await;
                let _ = events.send(Advertisement { identifier: id.to_string(), rssi: *rssi });
            }
            if !self.stop_early {
                tokio::time::sleep(step).await;
            }
            Ok(())
        }
    }

    fn probe(ads: Vec<(&'static str, i16)>) -> ProximityPresenceProbe {
        ProximityPresenceProbe::new(Arc::new(StubScanner { ads, fail: false, stop_early: false }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_other_devices() {
        let probe = probe(vec![("AABB", -60), ("CCDD", -90), ("AABB", -62)]);
        assert!(probe.scan_and_judge("AABB", Duration::from_secs(3)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_moving_away_is_absent() {
        let probe = probe(vec![("AABB", -60), ("AABB", -70), ("AABB", -80)]);
        assert!(!probe.scan_and_judge("AABB", Duration::from_secs(3)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_sample_is_absent() {
        let probe = probe(vec![("AABB", -60), ("CCDD", -60)]);
        assert!(!probe.scan_and_judge("AABB", Duration::from_secs(3)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scanner_failure_is_absent() {
        let probe = ProximityPresenceProbe::new(Arc::new(StubScanner {
            ads: vec![],
            fail: true,
            stop_early: false,
        }));
        assert!(!probe.scan_and_judge("AABB", Duration::from_secs(3)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_full_duration_even_if_scanner_stops_early() {
        let probe = ProximityPresenceProbe::new(Arc::new(StubScanner {
            ads: vec![("AABB", -60), ("AABB", -60)],
            fail: false,
            stop_early: true,
        }));
        let start = Instant::now();
        assert!(probe.scan_and_judge("AABB", Duration::from_secs(3)).await);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
