//! Ordered power-down.
//!
//! Runs when the battery goes critical (or on an explicit power-off).
//! Every step retires the registry slot *first*, so concurrent workers
//! that re-fetch their collaborators observe the absence and degrade,
//! then stops/neutralises the retired service. Safe to call more than
//! once; every step tolerates an already-empty slot.
//!
//! Deliberately does not touch the battery monitor: the shutdown
//! callback runs *on* its worker, and the caller halts the chip right
//! after this returns anyway.

use std::time::Duration;

use log::info;

use crate::controllers::{Authority, DeviceController};
use crate::ports::{Led, SoundClip};
use crate::registry::Registry;

/// Neutralise one actuator and drop its controller.
fn retire_controller<S: Clone + Default + Send>(slot: &crate::registry::Slot<DeviceController<S>>) {
    if let Some(controller) = slot.retire() {
        controller.set_authority(Authority::Local);
        controller.set_locally(S::default());
    }
}

/// Tear the system down in dependency order, finishing with the
/// battery-empty cue held for `cue_hold` so it can finish playing.
pub fn power_down(registry: &Registry, cue_hold: Duration) {
    info!("power down: begin");

    // Cut the control channel so no further remote commands arrive.
    if let Some(tcp) = registry.tcp.get() {
        tcp.disconnect();
    }

    // Stop the command writers before their targets disappear. The
    // current state's Drop needs the controllers, so the machine goes
    // first.
    if let Some(machine) = registry.state_machine.retire() {
        machine.stop();
    }
    if let Some(telemetry) = registry.telemetry.retire() {
        telemetry.stop();
    }
    if let Some(low_battery) = registry.low_battery.retire() {
        low_battery.stop();
    }

    retire_controller(&registry.drive);
    retire_controller(&registry.arm);
    retire_controller(&registry.camera);
    retire_controller(&registry.headlights);

    if let Some(leds) = registry.leds.retire() {
        for led in Led::ALL {
            leds.off(led);
        }
    }

    if let Some(audio) = registry.audio.retire() {
        audio.play(SoundClip::BatteryEmpty, true);
        std::thread::sleep(cue_hold);
    }

    registry.tcp.clear();
    registry.wifi.clear();
    registry.input.clear();
    registry.settings.clear();

    info!("power down: complete");
}
