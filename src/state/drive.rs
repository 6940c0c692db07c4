//! Drive state: a controller is connected and has the wheel.
//!
//! Drive, arm and camera actuators hand authority to the remote
//! controller; headlights stay on local authority so the chassis
//! button keeps working. Losing the controller falls back to Pair.

use std::sync::Arc;
use std::time::Duration;

use crate::bus::{Button, CommEvent, Event, EventBus, EventQueue, Facility, InputAction};
use crate::controllers::{Authority, HeadlightsState};
use crate::ports::Led;
use crate::registry::Registry;
use crate::state::{RoverState, StateKind};
use crate::worker::StopToken;

const QUEUE_CAPACITY: usize = 10;
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct DriveState {
    registry: Arc<Registry>,
    bus: Arc<EventBus>,
    queue: Arc<EventQueue>,
    headlights_on: bool,
}

impl DriveState {
    pub fn new(registry: &Arc<Registry>, bus: &Arc<EventBus>, stop: &Arc<StopToken>) -> Self {
        let queue = EventQueue::new(QUEUE_CAPACITY);
        stop.bind_queue(&queue);
        bus.listen(Facility::Input, &queue);
        bus.listen(Facility::Comm, &queue);

        grant_remote_authority(registry);
        if let Some(leds) = registry.leds.get() {
            leds.on(Led::StatusGreen);
        }

        Self {
            registry: Arc::clone(registry),
            bus: Arc::clone(bus),
            queue,
            headlights_on: false,
        }
    }

    fn toggle_headlights(&mut self) {
        self.headlights_on = !self.headlights_on;
        if let Some(headlights) = self.registry.headlights.get() {
            headlights.set_locally(HeadlightsState {
                on: self.headlights_on,
            });
        }
    }
}

impl RoverState for DriveState {
    fn name(&self) -> &'static str {
        "drive"
    }

    fn poll(&mut self, _stop: &StopToken) {
        let Ok(event) = self.queue.get(Some(POLL_TIMEOUT)) else {
            return;
        };
        match event {
            Event::Comm(CommEvent::ControllerDisconnected) => {
                if let Some(machine) = self.registry.state_machine.get() {
                    machine.transition(StateKind::Pair);
                }
            }
            Event::Input(input)
                if input.button == Button::Headlights && input.action == InputAction::Press =>
            {
                self.toggle_headlights();
            }
            _ => {}
        }
    }
}

impl Drop for DriveState {
    fn drop(&mut self) {
        // Neutral before the remote side loses its say.
        if let Some(drive) = self.registry.drive.get() {
            drive.set_authority(Authority::Local);
            drive.set_locally(Default::default());
        }
        if let Some(arm) = self.registry.arm.get() {
            arm.set_authority(Authority::Local);
            arm.set_locally(Default::default());
        }
        if let Some(camera) = self.registry.camera.get() {
            camera.set_authority(Authority::Local);
            camera.set_locally(Default::default());
        }
        if let Some(headlights) = self.registry.headlights.get() {
            headlights.set_locally(HeadlightsState { on: false });
        }
        if let Some(leds) = self.registry.leds.get() {
            leds.off(Led::StatusGreen);
        }
        self.bus.unlisten(&self.queue);
    }
}

fn grant_remote_authority(registry: &Registry) {
    if let Some(drive) = registry.drive.get() {
        drive.set_authority(Authority::Remote);
    }
    if let Some(arm) = registry.arm.get() {
        arm.set_authority(Authority::Remote);
    }
    if let Some(camera) = registry.camera.get() {
        camera.set_authority(Authority::Remote);
    }
}
