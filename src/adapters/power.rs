//! Battery voltage sensing and the final halt.

use crate::ports::PowerSensor;

#[cfg(target_os = "espidf")]
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
#[cfg(target_os = "espidf")]
use esp_idf_hal::adc::ADC1;
#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::Gpio4;
#[cfg(target_os = "espidf")]
use log::warn;

/// Pack voltage is measured through a 1:2 resistor divider.
#[cfg(target_os = "espidf")]
const DIVIDER_RATIO: u32 = 2;

#[cfg(target_os = "espidf")]
pub struct AdcBattery {
    adc: &'static AdcDriver<'static, ADC1>,
    channel: AdcChannelDriver<'static, Gpio4, &'static AdcDriver<'static, ADC1>>,
    last_mv: u16,
}

#[cfg(target_os = "espidf")]
impl AdcBattery {
    pub fn new(adc1: ADC1, pin: Gpio4) -> anyhow::Result<Self> {
        use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
        // The channel driver borrows the ADC driver; the battery is
        // sampled for the whole uptime, so leaking it is fine.
        let adc: &'static AdcDriver<'static, ADC1> = Box::leak(Box::new(AdcDriver::new(adc1)?));
        let channel = AdcChannelDriver::new(adc, pin, &AdcChannelConfig::default())?;
        Ok(Self {
            adc,
            channel,
            last_mv: 0,
        })
    }
}

#[cfg(target_os = "espidf")]
impl PowerSensor for AdcBattery {
    fn read_millivolts(&mut self) -> u16 {
        match self.adc.read(&mut self.channel) {
            Ok(raw_mv) => {
                self.last_mv = (u32::from(raw_mv) * DIVIDER_RATIO) as u16;
                self.last_mv
            }
            Err(e) => {
                // Keep the last good reading rather than reporting a
                // phantom empty pack.
                warn!("battery adc read failed: {e}");
                self.last_mv
            }
        }
    }
}

/// Fixed-voltage sensor for the host build.
#[cfg(not(target_os = "espidf"))]
pub struct FixedVoltage(pub u16);

#[cfg(not(target_os = "espidf"))]
impl PowerSensor for FixedVoltage {
    fn read_millivolts(&mut self) -> u16 {
        self.0
    }
}

/// Power the system off for good. On device this enters deep sleep
/// with no wake source, which is the closest thing the board has to
/// an off switch.
pub fn halt() -> ! {
    #[cfg(target_os = "espidf")]
    {
        // SAFETY: no arguments, never returns.
        unsafe {
            esp_idf_sys::esp_deep_sleep_start();
        }
        unreachable!("deep sleep does not return");
    }

    #[cfg(not(target_os = "espidf"))]
    std::process::exit(0);
}
