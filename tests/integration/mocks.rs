//! Mock adapters shared by the integration scenarios.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use perse_rover::bus::Button;
use perse_rover::controllers::{CommandSink, MotorDriveState};
use perse_rover::ports::{
    AudioOut, ControlSocket, Indicators, InputSource, Led, PowerSensor, SoundClip, WifiLink,
};

/// Wi-Fi whose connectivity tests flip directly.
#[derive(Default)]
pub struct MockWifi {
    connected: AtomicBool,
}

impl MockWifi {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl WifiLink for MockWifi {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Control socket with a scriptable accept outcome.
pub struct MockSocket {
    accept: Mutex<Result<bool, std::io::ErrorKind>>,
    connected: AtomicBool,
}

impl MockSocket {
    pub fn idle() -> Self {
        Self {
            accept: Mutex::new(Ok(false)),
            connected: AtomicBool::new(false),
        }
    }

    pub fn set_accept(&self, outcome: Result<bool, std::io::ErrorKind>) {
        *self.accept.lock().unwrap() = outcome;
    }
}

impl ControlSocket for MockSocket {
    fn try_accept(&self) -> std::io::Result<bool> {
        match *self.accept.lock().unwrap() {
            Ok(true) => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(kind) => Err(kind.into()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Records every play call; never "finishes" a clip on its own.
#[derive(Default)]
pub struct MockAudio {
    pub played: Mutex<Vec<(SoundClip, bool)>>,
    current: Mutex<Option<SoundClip>>,
}

impl AudioOut for MockAudio {
    fn play(&self, clip: SoundClip, interrupt: bool) {
        let mut current = self.current.lock().unwrap();
        if current.is_some() && !interrupt {
            return;
        }
        *current = Some(clip);
        self.played.lock().unwrap().push((clip, interrupt));
    }

    fn current(&self) -> Option<SoundClip> {
        *self.current.lock().unwrap()
    }
}

#[derive(Default)]
pub struct MockLeds {
    pub calls: Mutex<Vec<(&'static str, Led)>>,
}

impl Indicators for MockLeds {
    fn on(&self, led: Led) {
        self.calls.lock().unwrap().push(("on", led));
    }
    fn off(&self, led: Led) {
        self.calls.lock().unwrap().push(("off", led));
    }
    fn blink(&self, led: Led) {
        self.calls.lock().unwrap().push(("blink", led));
    }
}

#[derive(Default)]
pub struct MockInput {
    pair: AtomicBool,
    headlights: AtomicBool,
}

impl MockInput {
    pub fn set_pressed(&self, button: Button, pressed: bool) {
        let level = match button {
            Button::Pair => &self.pair,
            Button::Headlights => &self.headlights,
        };
        level.store(pressed, Ordering::SeqCst);
    }
}

impl InputSource for MockInput {
    fn is_pressed(&self, button: Button) -> bool {
        match button {
            Button::Pair => self.pair.load(Ordering::SeqCst),
            Button::Headlights => self.headlights.load(Ordering::SeqCst),
        }
    }
}

/// Records every drive state that reaches the "motors".
#[derive(Clone, Default)]
pub struct DriveRecorder {
    pub applied: Arc<Mutex<Vec<MotorDriveState>>>,
}

impl CommandSink<MotorDriveState> for DriveRecorder {
    fn apply(&self, state: &MotorDriveState) {
        self.applied.lock().unwrap().push(*state);
    }
}

/// Voltage source scripted per read; repeats the last value.
pub struct ScriptedSensor {
    readings: Vec<u16>,
    idx: usize,
}

impl ScriptedSensor {
    pub fn new(readings: Vec<u16>) -> Box<Self> {
        Box::new(Self { readings, idx: 0 })
    }
}

impl PowerSensor for ScriptedSensor {
    fn read_millivolts(&mut self) -> u16 {
        let mv = self.readings[self.idx.min(self.readings.len() - 1)];
        self.idx += 1;
        mv
    }
}
