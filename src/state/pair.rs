//! Pair state: wait for a controller to connect.
//!
//! The rover idles with the yellow status LED on. Holding the pair
//! button runs the pairing service; releasing it stops the attempt.
//! A success event moves the machine to Drive.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bus::{Button, Event, EventBus, EventQueue, Facility, InputAction};
use crate::ports::{Led, SoundClip};
use crate::registry::Registry;
use crate::services::pair::PairTask;
use crate::state::{RoverState, StateKind};
use crate::worker::{StopToken, Worker, WorkerConfig};

const QUEUE_CAPACITY: usize = 10;
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct PairState {
    registry: Arc<Registry>,
    bus: Arc<EventBus>,
    queue: Arc<EventQueue>,
    pairing: Mutex<Option<Worker>>,
}

impl PairState {
    pub fn new(registry: &Arc<Registry>, bus: &Arc<EventBus>, stop: &Arc<StopToken>) -> Self {
        let queue = EventQueue::new(QUEUE_CAPACITY);
        stop.bind_queue(&queue);
        bus.listen(Facility::Input, &queue);
        bus.listen(Facility::Pair, &queue);

        if let Some(leds) = registry.leds.get() {
            leds.on(Led::StatusYellow);
        }

        let state = Self {
            registry: Arc::clone(registry),
            bus: Arc::clone(bus),
            queue,
            pairing: Mutex::new(None),
        };

        // Button may already be held when the state is entered.
        let held = state
            .registry
            .input
            .get()
            .is_some_and(|input| input.is_pressed(Button::Pair));
        if held {
            state.start_pairing();
        }

        state
    }

    /// Spawn the pairing worker. No-op when one is already running.
    fn start_pairing(&self) {
        let mut pairing = self.pairing.lock().expect("pair state poisoned");
        if pairing.is_some() {
            return;
        }
        if let Some(audio) = self.registry.audio.get() {
            // Restarting within the same cue keeps it playing.
            if audio.current() != Some(SoundClip::PairStart) {
                audio.play(SoundClip::PairStart, true);
            }
        }
        if let Some(leds) = self.registry.leds.get() {
            leds.blink(Led::StatusYellow);
        }
        *pairing = Some(Worker::spawn(
            WorkerConfig::new("pair\0"),
            PairTask::new(&self.registry, &self.bus),
        ));
    }

    /// Stop and discard the pairing worker, if any.
    fn stop_pairing(&self) {
        let worker = self.pairing.lock().expect("pair state poisoned").take();
        if let Some(worker) = worker {
            worker.stop();
            // Back to the steady "waiting" indication.
            if let Some(leds) = self.registry.leds.get() {
                leds.on(Led::StatusYellow);
            }
        }
    }

    fn on_pair_result(&self, success: bool) {
        self.stop_pairing();
        let audio = self.registry.audio.get();
        if success {
            if let Some(audio) = audio {
                audio.play(SoundClip::PairSuccess, true);
            }
            if let Some(machine) = self.registry.state_machine.get() {
                machine.transition(StateKind::Drive);
            }
        } else if let Some(audio) = audio {
            audio.play(SoundClip::PairFail, true);
        }
    }
}

impl RoverState for PairState {
    fn name(&self) -> &'static str {
        "pair"
    }

    fn poll(&mut self, _stop: &StopToken) {
        let Ok(event) = self.queue.get(Some(POLL_TIMEOUT)) else {
            return;
        };
        match event {
            Event::Input(input) if input.button == Button::Pair => match input.action {
                InputAction::Press => self.start_pairing(),
                InputAction::Release => self.stop_pairing(),
            },
            Event::Pair(pair) => self.on_pair_result(pair.success),
            _ => {}
        }
    }
}

impl Drop for PairState {
    fn drop(&mut self) {
        // Stop the attempt first: stop_pairing restores the steady
        // indication, and the LED must end up off.
        self.stop_pairing();
        if let Some(leds) = self.registry.leds.get() {
            leds.off(Led::StatusYellow);
        }
        self.bus.unlisten(&self.queue);
    }
}
