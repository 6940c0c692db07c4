//! Typed service registry.
//!
//! One statically-known [`Slot`] per collaborator, instead of a keyed
//! map of erased pointers: a lookup can fail only by *absence*, never
//! by type confusion.
//!
//! Handles returned by `get` are `Arc`s, so a caller holding one across
//! a concurrent [`Slot::retire`] keeps a valid object. The teardown
//! contract still holds: consumers re-fetch from the registry before
//! each use rather than caching handles, so a cleared slot is observed
//! as `None` before the last owner drops the service.

use std::sync::{Arc, RwLock};

use crate::config::Settings;
use crate::controllers::{
    ArmController, CameraController, HeadlightsController, MotorDriveController,
};
use crate::ports::{AudioOut, ControlSocket, Indicators, InputSource, WifiLink};
use crate::services::battery::Battery;
use crate::services::low_battery::LowBatteryService;
use crate::services::telemetry::TelemetryService;
use crate::state::StateMachine;

/// Holder for one optionally-present shared service.
pub struct Slot<T: ?Sized> {
    cell: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> Slot<T> {
    pub fn new() -> Self {
        Self {
            cell: RwLock::new(None),
        }
    }

    pub fn set(&self, value: Arc<T>) {
        *self.cell.write().expect("registry poisoned") = Some(value);
    }

    /// Current occupant, if any. Clones the `Arc`.
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.read().expect("registry poisoned").clone()
    }

    pub fn clear(&self) {
        *self.cell.write().expect("registry poisoned") = None;
    }

    /// Clear the slot and hand back the (possibly last) owning handle.
    /// From the moment this returns, `get` yields `None`; the caller
    /// then stops/drops the service at its leisure.
    pub fn retire(&self) -> Option<Arc<T>> {
        self.cell.write().expect("registry poisoned").take()
    }

    pub fn is_present(&self) -> bool {
        self.cell.read().expect("registry poisoned").is_some()
    }
}

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// All shared collaborators, one field per role.
#[derive(Default)]
pub struct Registry {
    pub wifi: Slot<dyn WifiLink>,
    pub tcp: Slot<dyn ControlSocket>,
    pub audio: Slot<dyn AudioOut>,
    pub input: Slot<dyn InputSource>,
    pub leds: Slot<dyn Indicators>,
    pub settings: Slot<Settings>,
    pub drive: Slot<MotorDriveController>,
    pub arm: Slot<ArmController>,
    pub camera: Slot<CameraController>,
    pub headlights: Slot<HeadlightsController>,
    pub battery: Slot<Battery>,
    pub state_machine: Slot<StateMachine>,
    pub low_battery: Slot<LowBatteryService>,
    pub telemetry: Slot<TelemetryService>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}
