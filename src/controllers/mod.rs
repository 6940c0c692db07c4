//! Actuator command fronts with Local/Remote authority.
//!
//! Each actuator has exactly one writer at a time. Both command
//! sources write through the controller unconditionally; only the
//! side that currently holds authority reaches the sink. Switching
//! authority re-applies the new side's last stored command, so an
//! actuator never keeps running on the losing side's orders.

use std::sync::Mutex;

use log::debug;

/// Which command source currently drives the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authority {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveDirection {
    #[default]
    Stop,
    Forward,
    Backward,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorDriveState {
    pub direction: DriveDirection,
    /// 0..=100.
    pub speed: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmState {
    pub position: u8,
    pub pinch: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraState {
    pub rotation: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadlightsState {
    pub on: bool,
}

/// Write side of an actuator.
pub trait CommandSink<S>: Send + Sync {
    fn apply(&self, state: &S);
}

/// Authority-gated front for one actuator.
///
/// Lock order is authority → side slot, everywhere.
pub struct DeviceController<S> {
    name: &'static str,
    authority: Mutex<Authority>,
    local: Mutex<S>,
    remote: Mutex<S>,
    sink: Box<dyn CommandSink<S>>,
}

impl<S: Clone + Default + Send> DeviceController<S> {
    /// Build a controller under Local authority and drive the actuator
    /// to the neutral (`Default`) state.
    pub fn new(name: &'static str, sink: Box<dyn CommandSink<S>>) -> Self {
        let neutral = S::default();
        sink.apply(&neutral);
        Self {
            name,
            authority: Mutex::new(Authority::Local),
            local: Mutex::new(neutral.clone()),
            remote: Mutex::new(neutral),
            sink,
        }
    }

    pub fn authority(&self) -> Authority {
        *self.authority.lock().expect("controller poisoned")
    }

    /// Hand authority to `authority`. Re-applies that side's stored
    /// state so the actuator immediately reflects its new master.
    pub fn set_authority(&self, authority: Authority) {
        let mut current = self.authority.lock().expect("controller poisoned");
        if *current == authority {
            return;
        }
        *current = authority;
        debug!("{}: authority -> {:?}", self.name, authority);
        let state = match authority {
            Authority::Local => self.local.lock().expect("controller poisoned").clone(),
            Authority::Remote => self.remote.lock().expect("controller poisoned").clone(),
        };
        self.sink.apply(&state);
    }

    pub fn set_locally(&self, state: S) {
        self.store(Authority::Local, state);
    }

    pub fn set_remotely(&self, state: S) {
        self.store(Authority::Remote, state);
    }

    fn store(&self, side: Authority, state: S) {
        let current = self.authority.lock().expect("controller poisoned");
        {
            let slot = match side {
                Authority::Local => &self.local,
                Authority::Remote => &self.remote,
            };
            let mut slot = slot.lock().expect("controller poisoned");
            *slot = state.clone();
        }
        if *current == side {
            self.sink.apply(&state);
        }
    }
}

pub type MotorDriveController = DeviceController<MotorDriveState>;
pub type ArmController = DeviceController<ArmState>;
pub type CameraController = DeviceController<CameraState>;
pub type HeadlightsController = DeviceController<HeadlightsState>;
