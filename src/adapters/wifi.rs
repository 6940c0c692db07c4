//! Wi-Fi access point adapter.
//!
//! The rover hosts its own AP; the controller joins it and then opens
//! the TCP control channel. "Connected" here means at least one
//! station is associated.
//!
//! On the host this is a simulation flag that tests flip directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::bus::{Event, EventBus, WifiEvent};
use crate::config::RoverSettings;
use crate::ports::WifiLink;

#[cfg(target_os = "espidf")]
use std::sync::Mutex;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    hal::modem::Modem,
    wifi::{AccessPointConfiguration, AuthMethod, Configuration, EspWifi, WifiEvent as IdfWifiEvent},
};

pub struct WifiAp {
    bus: Arc<EventBus>,
    station_connected: Arc<AtomicBool>,
    #[cfg(target_os = "espidf")]
    driver: Mutex<Option<EspWifi<'static>>>,
    #[cfg(target_os = "espidf")]
    subscription: Mutex<Option<EspSubscription<'static, System>>>,
}

impl WifiAp {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            station_connected: Arc::new(AtomicBool::new(false)),
            #[cfg(target_os = "espidf")]
            driver: Mutex::new(None),
            #[cfg(target_os = "espidf")]
            subscription: Mutex::new(None),
        }
    }

    /// Bring the access point up with the configured SSID/password.
    #[cfg(target_os = "espidf")]
    pub fn start(
        &self,
        modem: Modem,
        sysloop: EspSystemEventLoop,
        settings: &RoverSettings,
    ) -> anyhow::Result<()> {
        let mut wifi = EspWifi::new(modem, sysloop.clone(), None)?;

        let auth_method = if settings.wifi_password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        wifi.set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
            ssid: settings.wifi_ssid.clone(),
            password: settings.wifi_password.clone(),
            auth_method,
            ..Default::default()
        }))?;
        wifi.start()?;
        info!("wifi: AP '{}' up", settings.wifi_ssid);

        let flag = Arc::clone(&self.station_connected);
        let bus = Arc::clone(&self.bus);
        let subscription = sysloop.subscribe::<IdfWifiEvent, _>(move |event| match event {
            IdfWifiEvent::ApStaConnected(_) => {
                flag.store(true, Ordering::Release);
                bus.post(Event::Wifi(WifiEvent::Connected));
            }
            IdfWifiEvent::ApStaDisconnected(_) => {
                flag.store(false, Ordering::Release);
                bus.post(Event::Wifi(WifiEvent::Disconnected));
            }
            _ => {}
        })?;

        *self.driver.lock().expect("wifi poisoned") = Some(wifi);
        *self.subscription.lock().expect("wifi poisoned") = Some(subscription);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(&self, settings: &RoverSettings) -> anyhow::Result<()> {
        info!("wifi: AP '{}' up (simulation)", settings.wifi_ssid);
        Ok(())
    }

    /// Simulation hook: mark a station as (dis)connected.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_station_connected(&self, connected: bool) {
        let was = self.station_connected.swap(connected, Ordering::AcqRel);
        if was != connected {
            let event = if connected {
                WifiEvent::Connected
            } else {
                WifiEvent::Disconnected
            };
            self.bus.post(Event::Wifi(event));
        }
    }
}

impl WifiLink for WifiAp {
    fn is_connected(&self) -> bool {
        self.station_connected.load(Ordering::Acquire)
    }
}
