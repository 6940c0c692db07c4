//! Pairing flow scenarios: button to paired, failure handling, and
//! losing the controller again.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use perse_rover::bus::{
    Button, CommEvent, Event, EventBus, EventQueue, Facility, InputAction, InputEvent,
};
use perse_rover::controllers::{Authority, MotorDriveController};
use perse_rover::ports::{
    AudioOut, ControlSocket, Indicators, InputSource, Led, SoundClip, WifiLink,
};
use perse_rover::registry::Registry;
use perse_rover::state::{StateKind, StateMachine};

use crate::mocks::{DriveRecorder, MockAudio, MockInput, MockLeds, MockSocket, MockWifi};

pub struct World {
    pub registry: Arc<Registry>,
    pub bus: Arc<EventBus>,
    pub wifi: Arc<MockWifi>,
    pub socket: Arc<MockSocket>,
    pub audio: Arc<MockAudio>,
    pub leds: Arc<MockLeds>,
    pub input: Arc<MockInput>,
    pub drive_applied: Arc<Mutex<Vec<perse_rover::controllers::MotorDriveState>>>,
    pub machine: Arc<StateMachine>,
}

pub fn world() -> World {
    let registry = Registry::new();
    let bus = EventBus::new();

    let wifi = Arc::new(MockWifi::default());
    wifi.set_connected(true);
    let socket = Arc::new(MockSocket::idle());
    let audio = Arc::new(MockAudio::default());
    let leds = Arc::new(MockLeds::default());
    let input = Arc::new(MockInput::default());

    let recorder = DriveRecorder::default();
    let drive_applied = Arc::clone(&recorder.applied);
    let drive = Arc::new(MotorDriveController::new("drive", Box::new(recorder)));
    drive_applied.lock().unwrap().clear();

    registry.wifi.set(Arc::clone(&wifi) as Arc<dyn WifiLink>);
    registry.tcp.set(Arc::clone(&socket) as Arc<dyn ControlSocket>);
    registry.audio.set(Arc::clone(&audio) as Arc<dyn AudioOut>);
    registry.leds.set(Arc::clone(&leds) as Arc<dyn Indicators>);
    registry.input.set(Arc::clone(&input) as Arc<dyn InputSource>);
    registry.drive.set(drive);

    let machine = Arc::new(StateMachine::new(Arc::clone(&registry), Arc::clone(&bus)));
    registry.state_machine.set(Arc::clone(&machine));

    World {
        registry,
        bus,
        wifi,
        socket,
        audio,
        leds,
        input,
        drive_applied,
        machine,
    }
}

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn press(bus: &EventBus, button: Button) {
    bus.post(Event::Input(InputEvent {
        button,
        action: InputAction::Press,
    }));
}

fn played(audio: &MockAudio) -> Vec<SoundClip> {
    audio.played.lock().unwrap().iter().map(|(c, _)| *c).collect()
}

#[test]
fn button_press_pairs_and_enters_drive() {
    let w = world();
    let pair_events = EventQueue::new(8);
    w.bus.listen(Facility::Pair, &pair_events);

    w.machine.transition(StateKind::Pair);
    w.machine.begin();
    assert!(wait_until(Duration::from_secs(1), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusYellow))
    }));

    w.socket.set_accept(Ok(true));
    press(&w.bus, Button::Pair);

    // Drive entry is observable through the green LED and the remote
    // authority handoff.
    assert!(wait_until(Duration::from_secs(2), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusGreen))
    }));
    let drive = w.registry.drive.get().unwrap();
    assert_eq!(drive.authority(), Authority::Remote);

    // Exactly one success event was posted.
    assert_eq!(pair_events.len(), 1);

    // Cues in order: start, then success.
    let clips = played(&w.audio);
    let start = clips.iter().position(|c| *c == SoundClip::PairStart);
    let success = clips.iter().position(|c| *c == SoundClip::PairSuccess);
    assert!(start.is_some() && success.is_some());
    assert!(start < success);

    // Yellow went off when Pair was torn down.
    assert!(w
        .leds
        .calls
        .lock()
        .unwrap()
        .contains(&("off", Led::StatusYellow)));

    w.machine.stop();
}

#[test]
fn button_already_held_at_entry_starts_pairing() {
    let w = world();
    w.socket.set_accept(Ok(true));
    w.input.set_pressed(Button::Pair, true);

    w.machine.transition(StateKind::Pair);
    w.machine.begin();

    // No press event is ever posted; entry alone must kick it off.
    assert!(wait_until(Duration::from_secs(2), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusGreen))
    }));
    w.machine.stop();
}

#[test]
fn transport_failure_plays_fail_cue_and_stays_in_pair() {
    let w = world();
    w.socket
        .set_accept(Err(std::io::ErrorKind::ConnectionReset));

    w.machine.transition(StateKind::Pair);
    w.machine.begin();
    assert!(wait_until(Duration::from_secs(1), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusYellow))
    }));
    press(&w.bus, Button::Pair);

    assert!(wait_until(Duration::from_secs(2), || {
        played(&w.audio).contains(&SoundClip::PairFail)
    }));
    std::thread::sleep(Duration::from_millis(50));

    // Still in Pair: no green, no authority handoff.
    assert!(!w.leds.calls.lock().unwrap().contains(&("on", Led::StatusGreen)));
    assert_eq!(
        w.registry.drive.get().unwrap().authority(),
        Authority::Local
    );
    w.machine.stop();
}

#[test]
fn controller_disconnect_falls_back_to_pair() {
    let w = world();
    w.socket.set_accept(Ok(true));
    w.machine.transition(StateKind::Pair);
    w.machine.begin();
    assert!(wait_until(Duration::from_secs(1), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusYellow))
    }));
    press(&w.bus, Button::Pair);
    assert!(wait_until(Duration::from_secs(2), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusGreen))
    }));
    w.leds.calls.lock().unwrap().clear();
    w.drive_applied.lock().unwrap().clear();

    w.bus.post(Event::Comm(CommEvent::ControllerDisconnected));

    // Back to Pair: yellow again, authority back to Local with the
    // motors driven to neutral on the way out.
    assert!(wait_until(Duration::from_secs(2), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusYellow))
    }));
    assert_eq!(
        w.registry.drive.get().unwrap().authority(),
        Authority::Local
    );
    assert!(w
        .drive_applied
        .lock()
        .unwrap()
        .contains(&Default::default()));
    w.machine.stop();
}

#[test]
fn repeated_pair_commands_are_no_ops() {
    let w = world();
    let pair_events = EventQueue::new(8);
    w.bus.listen(Facility::Pair, &pair_events);

    w.machine.transition(StateKind::Pair);
    w.machine.begin();
    assert!(wait_until(Duration::from_secs(1), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusYellow))
    }));

    // Release with no attempt running: nothing to stop.
    w.bus.post(Event::Input(InputEvent {
        button: Button::Pair,
        action: InputAction::Release,
    }));
    std::thread::sleep(Duration::from_millis(50));

    // Nobody is accepting; a second press while the attempt spins
    // must not start a second one.
    press(&w.bus, Button::Pair);
    press(&w.bus, Button::Pair);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        played(&w.audio)
            .iter()
            .filter(|c| **c == SoundClip::PairStart)
            .count(),
        1
    );

    // Stopping twice is equally harmless.
    for _ in 0..2 {
        w.bus.post(Event::Input(InputEvent {
            button: Button::Pair,
            action: InputAction::Release,
        }));
    }
    std::thread::sleep(Duration::from_millis(100));

    // The state still pairs normally afterwards, exactly once.
    w.socket.set_accept(Ok(true));
    press(&w.bus, Button::Pair);
    assert!(wait_until(Duration::from_secs(2), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusGreen))
    }));
    assert_eq!(pair_events.len(), 1);
    w.machine.stop();
}

#[test]
fn teardown_mid_attempt_leaves_the_yellow_led_off() {
    let w = world();
    // Nobody accepts, so the attempt is still live at teardown.
    w.machine.transition(StateKind::Pair);
    w.machine.begin();
    assert!(wait_until(Duration::from_secs(1), || {
        w.leds.calls.lock().unwrap().contains(&("on", Led::StatusYellow))
    }));
    press(&w.bus, Button::Pair);
    assert!(wait_until(Duration::from_secs(1), || {
        w.leds.calls.lock().unwrap().contains(&("blink", Led::StatusYellow))
    }));

    w.machine.stop();

    let yellow_last = w
        .leds
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, led)| *led == Led::StatusYellow)
        .last()
        .map(|(call, _)| *call);
    assert_eq!(yellow_last, Some("off"));
}

#[test]
fn releasing_the_button_cancels_the_attempt() {
    let w = world();
    // Nobody ever accepts; the attempt just spins.
    w.machine.transition(StateKind::Pair);
    w.machine.begin();
    press(&w.bus, Button::Pair);
    std::thread::sleep(Duration::from_millis(100));

    w.bus.post(Event::Input(InputEvent {
        button: Button::Pair,
        action: InputAction::Release,
    }));
    std::thread::sleep(Duration::from_millis(100));

    // Accepting now must not pair — the worker is gone.
    w.socket.set_accept(Ok(true));
    std::thread::sleep(Duration::from_millis(200));
    assert!(!w.leds.calls.lock().unwrap().contains(&("on", Led::StatusGreen)));
    w.machine.stop();
}
