//! Indicator LED driver.
//!
//! Steady on/off writes the pin directly; blink is handled by a small
//! toggle worker so callers never have to re-poke a blinking LED.

use std::sync::{Arc, Mutex};

use crate::ports::{Indicators, Led};

#[cfg(target_os = "espidf")]
use std::ops::ControlFlow;
#[cfg(target_os = "espidf")]
use std::time::Duration;

#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

#[cfg(target_os = "espidf")]
use crate::worker::{StopToken, Task, Worker, WorkerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedMode {
    #[default]
    Off,
    On,
    Blink,
}

#[cfg(target_os = "espidf")]
const BLINK_HALF_PERIOD: Duration = Duration::from_millis(250);

pub struct GpioLeds {
    modes: Arc<Mutex<[LedMode; Led::ALL.len()]>>,
    #[cfg(target_os = "espidf")]
    pins: Arc<Mutex<[PinDriver<'static, AnyOutputPin, Output>; Led::ALL.len()]>>,
    #[cfg(target_os = "espidf")]
    blinker: Mutex<Option<Worker>>,
}

impl GpioLeds {
    #[cfg(target_os = "espidf")]
    pub fn new(
        pins: [PinDriver<'static, AnyOutputPin, Output>; Led::ALL.len()],
    ) -> anyhow::Result<Self> {
        let modes = Arc::new(Mutex::new([LedMode::Off; Led::ALL.len()]));
        let pins = Arc::new(Mutex::new(pins));
        let blinker = Worker::spawn(
            WorkerConfig::new("leds\0").stack_kb(2),
            BlinkTask {
                modes: Arc::clone(&modes),
                pins: Arc::clone(&pins),
                phase: false,
            },
        );
        Ok(Self {
            modes,
            pins,
            blinker: Mutex::new(Some(blinker)),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            modes: Arc::new(Mutex::new([LedMode::Off; Led::ALL.len()])),
        }
    }

    /// Simulation hook: current mode of a LED.
    #[cfg(not(target_os = "espidf"))]
    pub fn mode(&self, led: Led) -> LedMode {
        self.modes.lock().expect("leds poisoned")[led as usize]
    }

    #[cfg(target_os = "espidf")]
    pub fn stop(&self) {
        let worker = self.blinker.lock().expect("leds poisoned").take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    fn set_mode(&self, led: Led, mode: LedMode) {
        self.modes.lock().expect("leds poisoned")[led as usize] = mode;
        #[cfg(target_os = "espidf")]
        {
            let mut pins = self.pins.lock().expect("leds poisoned");
            let pin = &mut pins[led as usize];
            // Blink leaves the pin to the toggle worker.
            let result = match mode {
                LedMode::On => pin.set_high(),
                LedMode::Off => pin.set_low(),
                LedMode::Blink => Ok(()),
            };
            if let Err(e) = result {
                log::warn!("leds: gpio write failed: {e}");
            }
        }
    }
}

impl Indicators for GpioLeds {
    fn on(&self, led: Led) {
        self.set_mode(led, LedMode::On);
    }

    fn off(&self, led: Led) {
        self.set_mode(led, LedMode::Off);
    }

    fn blink(&self, led: Led) {
        self.set_mode(led, LedMode::Blink);
    }
}

#[cfg(target_os = "espidf")]
struct BlinkTask {
    modes: Arc<Mutex<[LedMode; Led::ALL.len()]>>,
    pins: Arc<Mutex<[PinDriver<'static, AnyOutputPin, Output>; Led::ALL.len()]>>,
    phase: bool,
}

#[cfg(target_os = "espidf")]
impl Task for BlinkTask {
    fn step(&mut self, stop: &StopToken) -> ControlFlow<()> {
        self.phase = !self.phase;
        let modes = *self.modes.lock().expect("leds poisoned");
        let mut pins = self.pins.lock().expect("leds poisoned");
        for (i, mode) in modes.into_iter().enumerate() {
            if mode == LedMode::Blink {
                let result = if self.phase {
                    pins[i].set_high()
                } else {
                    pins[i].set_low()
                };
                if let Err(e) = result {
                    log::warn!("leds: gpio write failed: {e}");
                }
            }
        }
        drop(pins);
        stop.sleep(BLINK_HALF_PERIOD);
        ControlFlow::Continue(())
    }
}
