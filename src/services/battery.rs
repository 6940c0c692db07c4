//! Battery supervision.
//!
//! Samples pack voltage, smooths it with an EMA, maps it to a percent
//! and classifies it into [`PowerLevel`]. Level changes are posted on
//! the bus; reaching `Critical` fires the registered shutdown callback
//! exactly once for the lifetime of the device.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::bus::{BatteryEvent, Event, EventBus};
use crate::ports::PowerSensor;
use crate::worker::{StopToken, Task, Worker, WorkerConfig};

/// Pack voltage considered empty / full (single LiPo cell).
const EMPTY_MV: f32 = 3500.0;
const FULL_MV: f32 = 4200.0;

/// EMA smoothing factor for new samples.
const EMA_ALPHA: f32 = 0.3;

const LOW_PERCENT: u8 = 15;
const CRITICAL_PERCENT: u8 = 5;

const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevel {
    Normal,
    Low,
    Critical,
}

fn mv_to_percent(mv: f32) -> u8 {
    let frac = (mv - EMPTY_MV) / (FULL_MV - EMPTY_MV);
    (frac.clamp(0.0, 1.0) * 100.0) as u8
}

fn classify(percent: u8) -> PowerLevel {
    if percent <= CRITICAL_PERCENT {
        PowerLevel::Critical
    } else if percent <= LOW_PERCENT {
        PowerLevel::Low
    } else {
        PowerLevel::Normal
    }
}

struct Core {
    bus: Arc<EventBus>,
    ema_mv: Mutex<f32>,
    percent: AtomicU8,
    level: Mutex<PowerLevel>,
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    fired: AtomicBool,
}

impl Core {
    /// Fold one voltage sample in; post on level change, fire the
    /// shutdown callback on the first entry into `Critical`.
    fn sample(&self, mv: u16) {
        let ema = {
            let mut ema = self.ema_mv.lock().expect("battery poisoned");
            *ema = *ema * (1.0 - EMA_ALPHA) + f32::from(mv) * EMA_ALPHA;
            *ema
        };
        let percent = mv_to_percent(ema);
        self.percent.store(percent, Ordering::Release);

        let level = classify(percent);
        let changed = {
            let mut current = self.level.lock().expect("battery poisoned");
            let changed = *current != level;
            *current = level;
            changed
        };
        if changed {
            info!("battery: {percent}% ({level:?})");
            self.bus.post(Event::Battery(BatteryEvent { level }));
        }

        if level == PowerLevel::Critical && !self.fired.swap(true, Ordering::AcqRel) {
            warn!("battery: critical, invoking shutdown callback");
            let callback = self.callback.lock().expect("battery poisoned").take();
            if let Some(callback) = callback {
                callback();
            }
        }
    }
}

/// Battery monitor. Construct early (it takes a synchronous first
/// reading for the boot cutoff check), then `begin` to start sampling.
pub struct Battery {
    core: Arc<Core>,
    sensor: Mutex<Option<Box<dyn PowerSensor>>>,
    worker: Mutex<Option<Worker>>,
}

impl Battery {
    pub fn new(mut sensor: Box<dyn PowerSensor>, bus: Arc<EventBus>) -> Self {
        let mv = f32::from(sensor.read_millivolts());
        let percent = mv_to_percent(mv);
        Self {
            core: Arc::new(Core {
                bus,
                ema_mv: Mutex::new(mv),
                percent: AtomicU8::new(percent),
                level: Mutex::new(classify(percent)),
                callback: Mutex::new(None),
                fired: AtomicBool::new(false),
            }),
            sensor: Mutex::new(Some(sensor)),
            worker: Mutex::new(None),
        }
    }

    pub fn percent(&self) -> u8 {
        self.core.percent.load(Ordering::Acquire)
    }

    pub fn level(&self) -> PowerLevel {
        *self.core.level.lock().expect("battery poisoned")
    }

    /// True when the pack is too empty to run at all. Checked at boot
    /// before any service is started.
    pub fn is_shutdown(&self) -> bool {
        self.percent() == 0
    }

    /// Register the ordered-shutdown hook. The latest registration
    /// wins; it is invoked at most once.
    pub fn set_shutdown_callback(&self, callback: impl FnOnce() + Send + 'static) {
        *self.core.callback.lock().expect("battery poisoned") = Some(Box::new(callback));
    }

    /// Start periodic sampling. Idempotent.
    pub fn begin(&self) {
        self.begin_with_period(SAMPLE_PERIOD);
    }

    /// `begin` with an explicit sample period (tests use a short one).
    pub fn begin_with_period(&self, period: Duration) {
        let mut worker = self.worker.lock().expect("battery poisoned");
        if worker.is_some() {
            return;
        }
        let Some(sensor) = self.sensor.lock().expect("battery poisoned").take() else {
            return;
        };
        *worker = Some(Worker::spawn(
            WorkerConfig::new("battery\0"),
            SampleTask {
                core: Arc::clone(&self.core),
                sensor,
                period,
            },
        ));
    }

    pub fn stop(&self) {
        let worker = self.worker.lock().expect("battery poisoned").take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

struct SampleTask {
    core: Arc<Core>,
    sensor: Box<dyn PowerSensor>,
    period: Duration,
}

impl Task for SampleTask {
    fn step(&mut self, stop: &StopToken) -> ControlFlow<()> {
        self.core.sample(self.sensor.read_millivolts());
        stop.sleep(self.period);
        ControlFlow::Continue(())
    }
}
