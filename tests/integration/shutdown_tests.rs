//! Critical-battery scenarios: the warning path and the full ordered
//! power-down while driving.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use perse_rover::bus::{Button, Event, InputAction, InputEvent};
use perse_rover::controllers::{Authority, DriveDirection, MotorDriveState};
use perse_rover::ports::{Led, SoundClip};
use perse_rover::services::battery::Battery;
use perse_rover::services::low_battery::LowBatteryService;
use perse_rover::shutdown;
use perse_rover::state::StateKind;

use crate::mocks::ScriptedSensor;
use crate::pairing_tests::{wait_until, world};

#[test]
fn low_battery_warns_and_recovery_clears() {
    let w = world();
    let battery = Arc::new(Battery::new(
        ScriptedSensor::new(vec![4100, 3300, 3300, 3300, 4100]),
        Arc::clone(&w.bus),
    ));
    w.registry.battery.set(Arc::clone(&battery));
    let warn_service = LowBatteryService::new(&w.registry, &w.bus);
    std::thread::sleep(Duration::from_millis(20));

    battery.begin_with_period(Duration::from_millis(10));
    assert!(wait_until(Duration::from_secs(2), || {
        w.leds.calls.lock().unwrap().contains(&("blink", Led::StatusRed))
    }));
    assert!(w
        .audio
        .played
        .lock()
        .unwrap()
        .iter()
        .any(|(clip, _)| *clip == SoundClip::LowBattery));

    // Charger plugged back in: voltage recovers, red LED clears.
    assert!(wait_until(Duration::from_secs(2), || {
        w.leds.calls.lock().unwrap().contains(&("off", Led::StatusRed))
    }));
    battery.stop();
    warn_service.stop();
}

#[test]
fn critical_battery_while_driving_powers_down_in_order() {
    let w = world();

    // Pair and get driving with a live remote command on the motors.
    w.socket.set_accept(Ok(true));
    w.machine.transition(StateKind::Pair);
    w.machine.begin();
    assert!(wait_until(Duration::from_secs(1), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusYellow))
    }));
    w.bus.post(Event::Input(InputEvent {
        button: Button::Pair,
        action: InputAction::Press,
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        w.registry
            .drive
            .get()
            .is_some_and(|d| d.authority() == Authority::Remote)
    }));
    let forward = MotorDriveState {
        direction: DriveDirection::Forward,
        speed: 80,
    };
    w.registry.drive.get().unwrap().set_remotely(forward);
    assert!(wait_until(Duration::from_secs(1), || {
        w.drive_applied.lock().unwrap().contains(&forward)
    }));

    // Pack collapses. The shutdown callback runs the ordered teardown
    // (halt itself is the caller's business, not tested here).
    let battery = Arc::new(Battery::new(
        ScriptedSensor::new(vec![4100, 3300]),
        Arc::clone(&w.bus),
    ));
    w.registry.battery.set(Arc::clone(&battery));

    let fired = Arc::new(AtomicU32::new(0));
    let count = Arc::clone(&fired);
    let registry = Arc::clone(&w.registry);
    battery.set_shutdown_callback(move || {
        count.fetch_add(1, Ordering::SeqCst);
        shutdown::power_down(&registry, Duration::ZERO);
    });
    battery.begin_with_period(Duration::from_millis(10));

    assert!(wait_until(Duration::from_secs(2), || {
        fired.load(Ordering::SeqCst) == 1
    }));
    battery.stop();

    // Motors are neutral and the last thing they saw is neutral.
    let applied = w.drive_applied.lock().unwrap();
    assert_eq!(applied.last(), Some(&MotorDriveState::default()));
    drop(applied);

    // Registry is cleared: late consumers observe absence.
    assert!(w.registry.drive.get().is_none());
    assert!(w.registry.state_machine.get().is_none());
    assert!(w.registry.audio.get().is_none());
    assert!(w.registry.tcp.get().is_none());

    // Farewell cue was the battery-empty clip.
    assert_eq!(
        w.audio.played.lock().unwrap().last().map(|(c, _)| *c),
        Some(SoundClip::BatteryEmpty)
    );

    // All LEDs driven off during teardown.
    let led_calls = w.leds.calls.lock().unwrap();
    for led in Led::ALL {
        assert!(led_calls.contains(&("off", led)), "{led:?} not turned off");
    }
}
