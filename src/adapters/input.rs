//! Button input: level source plus the poll worker that turns levels
//! into debounced press/release events on the bus.

use std::ops::ControlFlow;
#[cfg(not(target_os = "espidf"))]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bus::{Button, Event, EventBus, InputAction, InputEvent};
use crate::ports::InputSource;
use crate::worker::{StopToken, Task, Worker, WorkerConfig};

#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::{AnyIOPin, Input, PinDriver, Pull};

/// The poll interval doubles as the debounce window: a bounce shorter
/// than this never produces an edge pair.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

const BUTTONS: [Button; 2] = [Button::Pair, Button::Headlights];

/// GPIO-backed button levels. Buttons are active-low with pull-ups.
pub struct GpioInput {
    #[cfg(target_os = "espidf")]
    pins: Mutex<[PinDriver<'static, AnyIOPin, Input>; 2]>,
    #[cfg(not(target_os = "espidf"))]
    levels: [AtomicBool; 2],
}

impl GpioInput {
    #[cfg(target_os = "espidf")]
    pub fn new(pair: AnyIOPin, headlights: AnyIOPin) -> anyhow::Result<Self> {
        let mut pair = PinDriver::input(pair)?;
        let mut headlights = PinDriver::input(headlights)?;
        pair.set_pull(Pull::Up)?;
        headlights.set_pull(Pull::Up)?;
        Ok(Self {
            pins: Mutex::new([pair, headlights]),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            levels: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// Simulation hook: set a button's pressed level.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_pressed(&self, button: Button, pressed: bool) {
        self.levels[button as usize].store(pressed, Ordering::Release);
    }
}

impl InputSource for GpioInput {
    fn is_pressed(&self, button: Button) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.pins.lock().expect("input poisoned")[button as usize].is_low()
        }

        #[cfg(not(target_os = "espidf"))]
        self.levels[button as usize].load(Ordering::Acquire)
    }
}

/// Polls an [`InputSource`] and posts edges on the Input facility.
pub struct InputPoller {
    worker: Mutex<Option<Worker>>,
}

impl InputPoller {
    pub fn new(source: Arc<dyn InputSource>, bus: Arc<EventBus>) -> Self {
        Self {
            worker: Mutex::new(Some(Worker::spawn(
                WorkerConfig::new("input\0").stack_kb(3).priority(7),
                PollTask {
                    source,
                    bus,
                    last: [false; 2],
                },
            ))),
        }
    }

    pub fn stop(&self) {
        let worker = self.worker.lock().expect("input poller poisoned").take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

struct PollTask {
    source: Arc<dyn InputSource>,
    bus: Arc<EventBus>,
    last: [bool; 2],
}

impl Task for PollTask {
    fn step(&mut self, stop: &StopToken) -> ControlFlow<()> {
        for (i, button) in BUTTONS.into_iter().enumerate() {
            let pressed = self.source.is_pressed(button);
            if pressed != self.last[i] {
                self.last[i] = pressed;
                let action = if pressed {
                    InputAction::Press
                } else {
                    InputAction::Release
                };
                self.bus.post(Event::Input(InputEvent { button, action }));
            }
        }
        stop.sleep(POLL_INTERVAL);
        ControlFlow::Continue(())
    }
}
