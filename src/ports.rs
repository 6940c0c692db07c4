//! Hardware and transport ports.
//!
//! Narrow traits the domain code depends on; `adapters/` provides the
//! ESP-IDF implementations and the test suite provides mocks.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::bus::Button;
use crate::config::RoverSettings;

/// Wi-Fi access point status.
pub trait WifiLink: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// The controller's TCP control channel.
pub trait ControlSocket: Send + Sync {
    /// Poll for an inbound connection. `Ok(true)` means a controller
    /// connected, `Ok(false)` means nobody is knocking yet, `Err`
    /// means the transport itself failed.
    fn try_accept(&self) -> std::io::Result<bool>;

    fn is_connected(&self) -> bool;

    fn disconnect(&self);
}

/// Pre-recorded audio cues stored on SPIFFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundClip {
    PowerOn,
    PairStart,
    PairSuccess,
    PairFail,
    LowBattery,
    BatteryEmpty,
}

pub trait AudioOut: Send + Sync {
    /// Queue a clip. With `interrupt` the current clip is cut off;
    /// without it the call is dropped if something is already playing.
    fn play(&self, clip: SoundClip, interrupt: bool);

    fn current(&self) -> Option<SoundClip>;
}

/// Indicator LEDs on the chassis and status board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Arm,
    Rear,
    StatusYellow,
    StatusRed,
    StatusGreen,
}

impl Led {
    pub const ALL: [Led; 5] = [
        Led::Arm,
        Led::Rear,
        Led::StatusYellow,
        Led::StatusRed,
        Led::StatusGreen,
    ];
}

pub trait Indicators: Send + Sync {
    fn on(&self, led: Led);
    fn off(&self, led: Led);
    fn blink(&self, led: Led);
}

/// Instantaneous button level (the event bus carries the edges).
pub trait InputSource: Send + Sync {
    fn is_pressed(&self, button: Button) -> bool;
}

/// Battery voltage source. `&mut` because ADC reads disturb driver
/// state on ESP-IDF.
pub trait PowerSensor: Send {
    fn read_millivolts(&mut self) -> u16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    /// Nothing persisted yet (first boot).
    NotFound,
    /// Blob present but undecodable.
    Corrupted,
    ValidationFailed(&'static str),
    IoError,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no stored settings"),
            Self::Corrupted => write!(f, "stored settings corrupted"),
            Self::ValidationFailed(why) => write!(f, "settings invalid: {why}"),
            Self::IoError => write!(f, "settings storage I/O error"),
        }
    }
}

/// Persistent settings backend (NVS on device).
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<RoverSettings, SettingsError>;
    fn save(&self, settings: &RoverSettings) -> Result<(), SettingsError>;
}

/// Periodic status frame published over the telemetry link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub seq: u32,
    pub battery_percent: u8,
    pub paired: bool,
}

/// Inbound drive command, both axes normalised to `-1.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear: f32,
    pub angular: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    InitFailed(&'static str),
    PublishFailed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed(what) => write!(f, "link init failed: {what}"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Bidirectional telemetry transport (status out, velocity in).
pub trait TelemetryLink: Send {
    fn init(&mut self) -> Result<(), LinkError>;
    fn publish_status(&mut self, report: &StatusReport) -> Result<(), LinkError>;
    fn poll_velocity(&mut self) -> Option<VelocityCommand>;
}
