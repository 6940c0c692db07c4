//! In-memory settings store.
//!
//! Same blob format as the NVS store (postcard), backed by a shared
//! cell so tests can reload "flash" across store instances.

use std::sync::{Arc, Mutex};

use crate::config::RoverSettings;
use crate::ports::{SettingsError, SettingsStore};

pub type SharedBlob = Arc<Mutex<Option<Vec<u8>>>>;

pub struct MemSettingsStore {
    blob: SharedBlob,
}

impl MemSettingsStore {
    /// A store with nothing persisted (first boot).
    pub fn empty() -> Self {
        Self {
            blob: Arc::new(Mutex::new(None)),
        }
    }

    /// A backing cell usable across several store instances.
    pub fn shared() -> SharedBlob {
        Arc::new(Mutex::new(None))
    }

    pub fn from_shared(shared: &SharedBlob) -> Self {
        Self {
            blob: Arc::clone(shared),
        }
    }
}

impl SettingsStore for MemSettingsStore {
    fn load(&self) -> Result<RoverSettings, SettingsError> {
        let blob = self.blob.lock().expect("mem store poisoned");
        match blob.as_deref() {
            None => Err(SettingsError::NotFound),
            Some(bytes) => postcard::from_bytes(bytes).map_err(|_| SettingsError::Corrupted),
        }
    }

    fn save(&self, settings: &RoverSettings) -> Result<(), SettingsError> {
        let bytes = postcard::to_allocvec(settings).map_err(|_| SettingsError::IoError)?;
        *self.blob.lock().expect("mem store poisoned") = Some(bytes);
        Ok(())
    }
}
