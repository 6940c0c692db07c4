//! Platform adapters behind the port traits.
//!
//! ESP-IDF driver code is guarded by `#[cfg(target_os = "espidf")]`;
//! everything else doubles as the host-side simulation used by tests.

pub mod audio;
pub mod input;
pub mod leds;
pub mod mem_store;
pub mod motors;
pub mod nvs;
pub mod power;
pub mod tcp;
pub mod telemetry_link;
pub mod wifi;
