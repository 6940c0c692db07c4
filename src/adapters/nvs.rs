//! NVS-backed settings store.
//!
//! One postcard blob under the `perse` namespace. Commits are atomic
//! per `nvs_commit`, so a power cut mid-save leaves the previous blob
//! intact. On the host this delegates to the in-memory store.

use crate::config::RoverSettings;
use crate::ports::{SettingsError, SettingsStore};

#[cfg(not(target_os = "espidf"))]
use crate::adapters::mem_store::MemSettingsStore;

#[cfg(target_os = "espidf")]
use std::sync::Mutex;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

#[cfg(target_os = "espidf")]
const NAMESPACE: &str = "perse";
#[cfg(target_os = "espidf")]
const KEY: &str = "settings";
#[cfg(target_os = "espidf")]
const MAX_BLOB: usize = 256;

pub struct NvsSettingsStore {
    #[cfg(target_os = "espidf")]
    nvs: Mutex<EspNvs<NvsDefault>>,
    #[cfg(not(target_os = "espidf"))]
    inner: MemSettingsStore,
}

impl NvsSettingsStore {
    #[cfg(target_os = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, SettingsError> {
        let nvs = EspNvs::new(partition, NAMESPACE, true).map_err(|_| SettingsError::IoError)?;
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, SettingsError> {
        Ok(Self {
            inner: MemSettingsStore::empty(),
        })
    }
}

impl SettingsStore for NvsSettingsStore {
    fn load(&self) -> Result<RoverSettings, SettingsError> {
        #[cfg(target_os = "espidf")]
        {
            let nvs = self.nvs.lock().expect("nvs poisoned");
            let mut buf = [0u8; MAX_BLOB];
            match nvs.get_blob(KEY, &mut buf) {
                Ok(Some(bytes)) => {
                    postcard::from_bytes(bytes).map_err(|_| SettingsError::Corrupted)
                }
                Ok(None) => Err(SettingsError::NotFound),
                Err(_) => Err(SettingsError::IoError),
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.inner.load()
    }

    fn save(&self, settings: &RoverSettings) -> Result<(), SettingsError> {
        #[cfg(target_os = "espidf")]
        {
            let bytes = postcard::to_allocvec(settings).map_err(|_| SettingsError::IoError)?;
            let mut nvs = self.nvs.lock().expect("nvs poisoned");
            nvs.set_blob(KEY, &bytes).map_err(|_| SettingsError::IoError)
        }

        #[cfg(not(target_os = "espidf"))]
        self.inner.save(settings)
    }
}
