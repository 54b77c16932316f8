//! Household data store - JSON document on disk
//!
//! Every read and write holds the same lock, so the monitor loop never sees a
//! half-written document and two API writes never interleave. Writes go to a
//! sibling temp file that is renamed over the original.

use crate::domain::household::HouseholdConfig;
use anyhow::Context;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct HouseholdStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HouseholdStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        info!(file_path = %path.display(), "household_store_initialized");
        Self { path, lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete snapshot of the household config.
    /// Missing or corrupt files yield the default document.
    pub fn snapshot(&self) -> HouseholdConfig {
        let _guard = self.lock.lock();
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(file = %self.path.display(), error = %e, "household_store_corrupt");
                    HouseholdConfig::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = %self.path.display(), "household_store_missing");
                HouseholdConfig::default()
            }
            Err(e) => {
                warn!(file = %self.path.display(), error = %e, "household_store_read_failed");
                HouseholdConfig::default()
            }
        }
    }

    /// Replace the whole document
    pub fn save(&self, config: &HouseholdConfig) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(config).context("Failed to encode household")?;

        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        info!(
            file = %self.path.display(),
            items = %config.items.len(),
            system_enabled = %config.system_enabled,
            "household_store_saved"
        );
        Ok(())
    }

    /// Parse and save a raw JSON body from the config API
    pub fn save_json(&self, body: &[u8]) -> anyhow::Result<HouseholdConfig> {
        let config: HouseholdConfig =
            serde_json::from_slice(body).context("Invalid household JSON")?;
        self.save(&config)?;
        Ok(config)
    }
}
