//! Household configuration document: tracked items, system switch and
//! push credentials.
//!
//! Field names match the JSON data file written by the config API.

use crate::domain::types::SensingModality;
use serde::{Deserialize, Serialize};

/// Identifier value that forces the tag reader even though it is non-empty
pub const TAG_SENTINEL: &str = "RFID";

fn default_true() -> bool {
    true
}

fn default_start_time() -> String {
    "00:00".to_string()
}

fn default_end_time() -> String {
    "23:59".to_string()
}

/// A belonging the owner wants to be reminded about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// Bluetooth address, or empty / sentinel for the tag reader
    #[serde(rename = "mac", default)]
    pub identifier: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_start_time")]
    pub start_time: String,
    #[serde(default = "default_end_time")]
    pub end_time: String,
}

impl Item {
    /// Lexicographic `start <= now <= end` on `HH:MM` strings.
    /// Windows crossing midnight never match.
    pub fn in_window(&self, now: &str) -> bool {
        self.start_time.as_str() <= now && now <= self.end_time.as_str()
    }

    /// Enabled and inside its window
    pub fn is_active_at(&self, now: &str) -> bool {
        self.enabled && self.in_window(now)
    }

    pub fn modality(&self) -> SensingModality {
        let trimmed = self.identifier.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(TAG_SENTINEL) {
            SensingModality::Tag
        } else {
            SensingModality::Proximity(normalize_identifier(trimmed))
        }
    }
}

/// Uppercase and strip `:` / `-` separators
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != ':' && *c != '-').collect::<String>().to_uppercase()
}

/// Snapshot of the household config read at the top of each cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdConfig {
    #[serde(default = "default_true")]
    pub system_enabled: bool,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(rename = "line_token", default)]
    pub notifier_token: String,
    #[serde(rename = "line_user_id", default)]
    pub notifier_recipient: String,
}

impl Default for HouseholdConfig {
    fn default() -> Self {
        Self {
            system_enabled: true,
            items: Vec::new(),
            notifier_token: String::new(),
            notifier_recipient: String::new(),
        }
    }
}

impl HouseholdConfig {
    /// Items to check for a departure at `now` (`HH:MM`), in config order
    pub fn active_items(&self, now: &str) -> Vec<&Item> {
        self.items.iter().filter(|item| item.is_active_at(now)).collect()
    }

    pub fn has_credentials(&self) -> bool {
        !self.notifier_token.trim().is_empty() && !self.notifier_recipient.trim().is_empty()
    }
}
