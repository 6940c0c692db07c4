//! Low-battery warning service.
//!
//! Listens for battery level changes: entering `Low` plays the warning
//! cue and blinks the red status LED; returning to `Normal` clears it.
//! `Critical` is the shutdown path's business, not this one's.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use crate::bus::{Event, EventBus, EventQueue, Facility};
use crate::ports::{Led, SoundClip};
use crate::registry::Registry;
use crate::services::battery::PowerLevel;
use crate::worker::{StopToken, Task, Worker, WorkerConfig};

const QUEUE_CAPACITY: usize = 4;

pub struct LowBatteryService {
    worker: Mutex<Option<Worker>>,
}

impl LowBatteryService {
    pub fn new(registry: &Arc<Registry>, bus: &Arc<EventBus>) -> Self {
        Self {
            worker: Mutex::new(Some(Worker::spawn(
                WorkerConfig::new("lowbatt\0"),
                WarnTask {
                    registry: Arc::clone(registry),
                    bus: Arc::clone(bus),
                    queue: None,
                },
            ))),
        }
    }

    pub fn stop(&self) {
        let worker = self.worker.lock().expect("low battery poisoned").take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

struct WarnTask {
    registry: Arc<Registry>,
    bus: Arc<EventBus>,
    queue: Option<Arc<EventQueue>>,
}

impl Task for WarnTask {
    fn on_start(&mut self, stop: &Arc<StopToken>) -> anyhow::Result<()> {
        let queue = EventQueue::new(QUEUE_CAPACITY);
        stop.bind_queue(&queue);
        self.bus.listen(Facility::Battery, &queue);
        self.queue = Some(queue);
        Ok(())
    }

    fn step(&mut self, _stop: &StopToken) -> ControlFlow<()> {
        let queue = self.queue.as_ref().expect("on_start sets the queue");
        let Ok(event) = queue.get(None) else {
            return ControlFlow::Break(());
        };
        let Event::Battery(battery) = event else {
            return ControlFlow::Continue(());
        };
        match battery.level {
            PowerLevel::Low => {
                if let Some(audio) = self.registry.audio.get() {
                    audio.play(SoundClip::LowBattery, false);
                }
                if let Some(leds) = self.registry.leds.get() {
                    leds.blink(Led::StatusRed);
                }
            }
            PowerLevel::Normal => {
                if let Some(leds) = self.registry.leds.get() {
                    leds.off(Led::StatusRed);
                }
            }
            PowerLevel::Critical => {}
        }
        ControlFlow::Continue(())
    }

    fn on_stop(&mut self) {
        if let Some(queue) = self.queue.take() {
            self.bus.unlisten(&queue);
        }
    }
}
