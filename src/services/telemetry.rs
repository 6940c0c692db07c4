//! Telemetry service: status out, velocity commands in.
//!
//! Owns its transport link outright. Link init is soft-fail: if the
//! transport cannot come up the worker logs and idles out without
//! taking the rest of the firmware down. Inbound velocity commands are
//! translated to drive states and written on the remote side of the
//! drive controller; whether they reach the motors is the current
//! state's authority decision, not ours.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use log::debug;

use crate::controllers::{DriveDirection, MotorDriveState};
use crate::ports::{StatusReport, TelemetryLink, VelocityCommand};
use crate::registry::Registry;
use crate::worker::{Core, StopToken, Task, Worker, WorkerConfig};

const POLL_DELAY: Duration = Duration::from_millis(50);
const STATUS_PERIOD: Duration = Duration::from_secs(1);

/// Below this magnitude on both axes the command is a stop.
const DEADBAND: f32 = 0.05;

/// Translate a normalised velocity command into a drive state. The
/// dominant axis wins; speed is its magnitude in percent.
pub fn drive_state_from_velocity(cmd: VelocityCommand) -> MotorDriveState {
    let linear = cmd.linear.clamp(-1.0, 1.0);
    let angular = cmd.angular.clamp(-1.0, 1.0);
    if linear.abs() < DEADBAND && angular.abs() < DEADBAND {
        return MotorDriveState::default();
    }
    let (direction, magnitude) = if linear.abs() >= angular.abs() {
        let dir = if linear > 0.0 {
            DriveDirection::Forward
        } else {
            DriveDirection::Backward
        };
        (dir, linear.abs())
    } else {
        let dir = if angular > 0.0 {
            DriveDirection::Left
        } else {
            DriveDirection::Right
        };
        (dir, angular.abs())
    };
    MotorDriveState {
        direction,
        speed: (magnitude * 100.0) as u8,
    }
}

pub struct TelemetryService {
    initialized: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl TelemetryService {
    pub fn new(link: Box<dyn TelemetryLink>, registry: &Arc<Registry>) -> Self {
        let initialized = Arc::new(AtomicBool::new(false));
        // Network-adjacent, so it shares the protocol core.
        let worker = Worker::spawn(
            WorkerConfig::new("telemetry\0").stack_kb(8).core(Core::Pro),
            LinkTask {
                link,
                registry: Arc::clone(registry),
                initialized: Arc::clone(&initialized),
                seq: 0,
                last_status: None,
            },
        );
        Self {
            initialized,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Whether the transport link came up.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        let worker = self.worker.lock().expect("telemetry poisoned").take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

struct LinkTask {
    link: Box<dyn TelemetryLink>,
    registry: Arc<Registry>,
    initialized: Arc<AtomicBool>,
    seq: u32,
    last_status: Option<Instant>,
}

impl Task for LinkTask {
    fn on_start(&mut self, _stop: &Arc<StopToken>) -> anyhow::Result<()> {
        self.link.init().context("telemetry link init")?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn step(&mut self, stop: &StopToken) -> ControlFlow<()> {
        while let Some(cmd) = self.link.poll_velocity() {
            let state = drive_state_from_velocity(cmd);
            if let Some(drive) = self.registry.drive.get() {
                drive.set_remotely(state);
            }
        }

        let due = self
            .last_status
            .map_or(true, |at| at.elapsed() >= STATUS_PERIOD);
        if due {
            let report = StatusReport {
                seq: self.seq,
                battery_percent: self
                    .registry
                    .battery
                    .get()
                    .map_or(0, |battery| battery.percent()),
                paired: self
                    .registry
                    .tcp
                    .get()
                    .is_some_and(|tcp| tcp.is_connected()),
            };
            if let Err(e) = self.link.publish_status(&report) {
                debug!("telemetry: status publish failed: {e}");
            } else {
                self.seq = self.seq.wrapping_add(1);
            }
            self.last_status = Some(Instant::now());
        }

        stop.sleep(POLL_DELAY);
        ControlFlow::Continue(())
    }
}
