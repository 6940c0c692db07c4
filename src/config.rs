//! Persisted rover settings.
//!
//! A small fixed-capacity struct serialised with postcard into the
//! settings store. Loads fall back to defaults on first boot or on a
//! corrupted blob; saves validate first so a bad write never lands.

use std::sync::Mutex;

use heapless::String;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::ports::{SettingsError, SettingsStore};

/// User-tunable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoverSettings {
    /// Camera module is mounted mirrored on production units.
    pub camera_horizontal_flip: bool,
    pub wifi_ssid: String<32>,
    pub wifi_password: String<64>,
}

impl Default for RoverSettings {
    fn default() -> Self {
        Self {
            camera_horizontal_flip: true,
            wifi_ssid: String::try_from("RoverNetwork").unwrap_or_default(),
            wifi_password: String::try_from("RoverRover").unwrap_or_default(),
        }
    }
}

impl RoverSettings {
    /// SSID must be non-empty printable ASCII; password empty (open
    /// network) or at least 8 bytes (WPA2 minimum).
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.wifi_ssid.is_empty() {
            return Err(SettingsError::ValidationFailed("empty SSID"));
        }
        if !self
            .wifi_ssid
            .chars()
            .all(|c| c.is_ascii() && !c.is_ascii_control())
        {
            return Err(SettingsError::ValidationFailed(
                "SSID must be printable ASCII",
            ));
        }
        if !self.wifi_password.is_empty() && self.wifi_password.len() < 8 {
            return Err(SettingsError::ValidationFailed(
                "password shorter than 8 bytes",
            ));
        }
        Ok(())
    }
}

/// In-memory view of the persisted settings plus its backing store.
pub struct Settings {
    store: Box<dyn SettingsStore>,
    current: Mutex<RoverSettings>,
}

impl Settings {
    /// Load from `store`, falling back to defaults when nothing is
    /// persisted yet or the stored blob is unusable.
    pub fn new(store: Box<dyn SettingsStore>) -> Self {
        let current = match store.load() {
            Ok(settings) => settings,
            Err(SettingsError::NotFound) => RoverSettings::default(),
            Err(e) => {
                warn!("settings: load failed ({e}), using defaults");
                RoverSettings::default()
            }
        };
        Self {
            store,
            current: Mutex::new(current),
        }
    }

    pub fn get(&self) -> RoverSettings {
        self.current.lock().expect("settings poisoned").clone()
    }

    /// Replace the in-memory settings. Not persisted until
    /// [`store`](Self::store).
    pub fn set(&self, settings: RoverSettings) {
        *self.current.lock().expect("settings poisoned") = settings;
    }

    /// Validate and persist the in-memory settings.
    pub fn store(&self) -> Result<(), SettingsError> {
        let current = self.get();
        current.validate()?;
        self.store.save(&current)
    }
}
