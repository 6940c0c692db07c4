//! Actuator write sides: track motors, servos, headlights.
//!
//! These implement [`CommandSink`] for the device controllers. Track
//! motors are two H-bridges driven by LEDC PWM; the arm and camera are
//! hobby servos on 50 Hz LEDC channels; headlights are a plain GPIO.

#![cfg(target_os = "espidf")]

use std::sync::Mutex;

use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::ledc::LedcDriver;
use log::warn;

use crate::controllers::{
    ArmState, CameraState, CommandSink, DriveDirection, HeadlightsState, MotorDriveState,
};

/// Per-side H-bridge: forward and reverse PWM inputs.
pub struct HBridge {
    pub forward: LedcDriver<'static>,
    pub reverse: LedcDriver<'static>,
}

impl HBridge {
    fn drive(&mut self, signed_percent: i32) {
        let duty = |channel: &LedcDriver<'static>, percent: u32| {
            channel.get_max_duty() * percent / 100
        };
        let magnitude = signed_percent.unsigned_abs().min(100);
        let (fwd, rev) = if signed_percent >= 0 {
            (magnitude, 0)
        } else {
            (0, magnitude)
        };
        if let Err(e) = self.forward.set_duty(duty(&self.forward, fwd)) {
            warn!("motor pwm write failed: {e}");
        }
        if let Err(e) = self.reverse.set_duty(duty(&self.reverse, rev)) {
            warn!("motor pwm write failed: {e}");
        }
    }
}

pub struct TrackDriveSink {
    bridges: Mutex<(HBridge, HBridge)>,
}

impl TrackDriveSink {
    pub fn new(left: HBridge, right: HBridge) -> Self {
        Self {
            bridges: Mutex::new((left, right)),
        }
    }
}

impl CommandSink<MotorDriveState> for TrackDriveSink {
    fn apply(&self, state: &MotorDriveState) {
        let speed = i32::from(state.speed.min(100));
        let (left, right) = match state.direction {
            DriveDirection::Stop => (0, 0),
            DriveDirection::Forward => (speed, speed),
            DriveDirection::Backward => (-speed, -speed),
            DriveDirection::Left => (-speed, speed),
            DriveDirection::Right => (speed, -speed),
        };
        let mut bridges = self.bridges.lock().expect("drive sink poisoned");
        bridges.0.drive(left);
        bridges.1.drive(right);
    }
}

/// Hobby servo on a 50 Hz LEDC channel. Maps 0..=180 degrees onto the
/// 1.0–2.0 ms pulse band.
struct Servo {
    channel: LedcDriver<'static>,
}

impl Servo {
    fn set_degrees(&mut self, degrees: u8) {
        let max_duty = self.channel.get_max_duty();
        // 1 ms = 5% of the 20 ms frame, 2 ms = 10%.
        let min = max_duty / 20;
        let span = max_duty / 20;
        let duty = min + span * u32::from(degrees.min(180)) / 180;
        if let Err(e) = self.channel.set_duty(duty) {
            warn!("servo pwm write failed: {e}");
        }
    }
}

pub struct ArmSink {
    servos: Mutex<(Servo, Servo)>,
}

impl ArmSink {
    pub fn new(position: LedcDriver<'static>, pinch: LedcDriver<'static>) -> Self {
        Self {
            servos: Mutex::new((Servo { channel: position }, Servo { channel: pinch })),
        }
    }
}

impl CommandSink<ArmState> for ArmSink {
    fn apply(&self, state: &ArmState) {
        let mut servos = self.servos.lock().expect("arm sink poisoned");
        servos.0.set_degrees(state.position);
        servos.1.set_degrees(state.pinch);
    }
}

pub struct CameraSink {
    servo: Mutex<Servo>,
}

impl CameraSink {
    pub fn new(rotation: LedcDriver<'static>) -> Self {
        Self {
            servo: Mutex::new(Servo { channel: rotation }),
        }
    }
}

impl CommandSink<CameraState> for CameraSink {
    fn apply(&self, state: &CameraState) {
        self.servo
            .lock()
            .expect("camera sink poisoned")
            .set_degrees(state.rotation);
    }
}

pub struct HeadlightsSink {
    pin: Mutex<PinDriver<'static, AnyOutputPin, Output>>,
}

impl HeadlightsSink {
    pub fn new(pin: PinDriver<'static, AnyOutputPin, Output>) -> Self {
        Self {
            pin: Mutex::new(pin),
        }
    }
}

impl CommandSink<HeadlightsState> for HeadlightsSink {
    fn apply(&self, state: &HeadlightsState) {
        let mut pin = self.pin.lock().expect("headlights sink poisoned");
        let result = if state.on {
            pin.set_high()
        } else {
            pin.set_low()
        };
        if let Err(e) = result {
            warn!("headlights gpio write failed: {e}");
        }
    }
}
