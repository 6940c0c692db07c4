//! Firmware entry point.
//!
//! Boot order matters: the battery cutoff check runs before anything
//! that draws real current, and the shutdown callback is registered
//! before sampling starts so a critically empty pack can never slip
//! through the gap.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use log::{info, warn};

use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::FromValueType as _;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use perse_rover::adapters::audio::SpiffsAudio;
use perse_rover::adapters::input::{GpioInput, InputPoller};
use perse_rover::adapters::leds::GpioLeds;
use perse_rover::adapters::motors::{ArmSink, CameraSink, HBridge, HeadlightsSink, TrackDriveSink};
use perse_rover::adapters::nvs::NvsSettingsStore;
use perse_rover::adapters::power::{halt, AdcBattery};
use perse_rover::adapters::tcp::TcpControlSocket;
use perse_rover::adapters::telemetry_link::{UdpTelemetryLink, AGENT_PORT};
use perse_rover::adapters::wifi::WifiAp;
use perse_rover::bus::EventBus;
use perse_rover::config::Settings;
use perse_rover::controllers::{
    ArmController, CameraController, HeadlightsController, MotorDriveController,
};
use perse_rover::ports::{AudioOut, ControlSocket, Indicators, InputSource, SoundClip, WifiLink};
use perse_rover::registry::Registry;
use perse_rover::services::battery::Battery;
use perse_rover::services::low_battery::LowBatteryService;
use perse_rover::services::telemetry::TelemetryService;
use perse_rover::shutdown;
use perse_rover::state::{StateKind, StateMachine};

/// How long the battery-empty cue is allowed to play before the chip
/// goes down.
const SHUTDOWN_CUE_HOLD: Duration = Duration::from_secs(3);

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("Perse rover v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take().context("peripherals already taken")?;
    let pins = peripherals.pins;
    let ledc = peripherals.ledc;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── Battery cutoff check ──────────────────────────────────
    let bus = EventBus::new();
    let battery = Arc::new(Battery::new(
        Box::new(AdcBattery::new(peripherals.adc1, pins.gpio4)?),
        Arc::clone(&bus),
    ));
    if battery.is_shutdown() {
        warn!("battery empty at boot ({}%), halting", battery.percent());
        halt();
    }
    info!("battery at {}%", battery.percent());

    // ── Settings ──────────────────────────────────────────────
    let store = NvsSettingsStore::new(nvs_partition)
        .map_err(|e| anyhow::anyhow!("settings store init failed: {e}"))?;
    let settings = Arc::new(Settings::new(Box::new(store)));

    // ── Hardware adapters ─────────────────────────────────────
    let registry = Registry::new();

    let audio = Arc::new(SpiffsAudio::new());
    let leds = Arc::new(GpioLeds::new([
        PinDriver::output(AnyOutputPin::from(pins.gpio5))?,
        PinDriver::output(AnyOutputPin::from(pins.gpio6))?,
        PinDriver::output(AnyOutputPin::from(pins.gpio7))?,
        PinDriver::output(AnyOutputPin::from(pins.gpio8))?,
        PinDriver::output(AnyOutputPin::from(pins.gpio9))?,
    ])?);
    let input = Arc::new(GpioInput::new(
        AnyIOPin::from(pins.gpio0),
        AnyIOPin::from(pins.gpio1),
    )?);
    let input_poller = InputPoller::new(
        Arc::clone(&input) as Arc<dyn InputSource>,
        Arc::clone(&bus),
    );

    let wifi = Arc::new(WifiAp::new(Arc::clone(&bus)));
    wifi.start(peripherals.modem, sysloop, &settings.get())?;
    let tcp = Arc::new(TcpControlSocket::new(Arc::clone(&bus))?);

    // ── Actuator controllers ──────────────────────────────────
    // One 50 Hz timer serves the H-bridges and the servos. The
    // channel drivers borrow it for the whole uptime, hence the leak.
    let pwm_timer: &'static LedcTimerDriver<'static> = Box::leak(Box::new(LedcTimerDriver::new(
        ledc.timer0,
        &TimerConfig::default().frequency(50.Hz()),
    )?));

    let drive = Arc::new(MotorDriveController::new(
        "drive",
        Box::new(TrackDriveSink::new(
            HBridge {
                forward: LedcDriver::new(ledc.channel0, pwm_timer, pins.gpio12)?,
                reverse: LedcDriver::new(ledc.channel1, pwm_timer, pins.gpio13)?,
            },
            HBridge {
                forward: LedcDriver::new(ledc.channel2, pwm_timer, pins.gpio14)?,
                reverse: LedcDriver::new(ledc.channel3, pwm_timer, pins.gpio15)?,
            },
        )),
    ));
    let arm = Arc::new(ArmController::new(
        "arm",
        Box::new(ArmSink::new(
            LedcDriver::new(ledc.channel4, pwm_timer, pins.gpio16)?,
            LedcDriver::new(ledc.channel5, pwm_timer, pins.gpio17)?,
        )),
    ));
    let camera = Arc::new(CameraController::new(
        "camera",
        Box::new(CameraSink::new(LedcDriver::new(
            ledc.channel6,
            pwm_timer,
            pins.gpio18,
        )?)),
    ));
    let headlights = Arc::new(HeadlightsController::new(
        "headlights",
        Box::new(HeadlightsSink::new(PinDriver::output(AnyOutputPin::from(
            pins.gpio21,
        ))?)),
    ));

    // ── Registry wiring ───────────────────────────────────────
    registry.audio.set(Arc::clone(&audio) as Arc<dyn AudioOut>);
    registry.leds.set(leds as Arc<dyn Indicators>);
    registry.input.set(input as Arc<dyn InputSource>);
    registry.wifi.set(wifi as Arc<dyn WifiLink>);
    registry.tcp.set(tcp as Arc<dyn ControlSocket>);
    registry.settings.set(settings);
    registry.drive.set(drive);
    registry.arm.set(arm);
    registry.camera.set(camera);
    registry.headlights.set(headlights);
    registry.battery.set(Arc::clone(&battery));

    // ── Services ──────────────────────────────────────────────
    audio.play(SoundClip::PowerOn, true);

    let machine = Arc::new(StateMachine::new(Arc::clone(&registry), Arc::clone(&bus)));
    registry.state_machine.set(Arc::clone(&machine));
    machine.transition(StateKind::Pair);
    machine.begin();

    registry
        .low_battery
        .set(Arc::new(LowBatteryService::new(&registry, &bus)));

    let agent = SocketAddr::from(([192, 168, 4, 2], AGENT_PORT));
    registry.telemetry.set(Arc::new(TelemetryService::new(
        Box::new(UdpTelemetryLink::new(agent)),
        &registry,
    )));

    // ── Shutdown hook, then start sampling ────────────────────
    let shutdown_registry = Arc::clone(&registry);
    battery.set_shutdown_callback(move || {
        shutdown::power_down(&shutdown_registry, SHUTDOWN_CUE_HOLD);
        halt();
    });
    battery.begin();

    info!("system up");
    loop {
        std::thread::sleep(Duration::from_secs(60));
        // Keep the input poller alive for the whole uptime.
        let _ = &input_poller;
    }
}
