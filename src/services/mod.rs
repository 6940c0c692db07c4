//! Long-running services: pairing, battery supervision, telemetry.

pub mod battery;
pub mod low_battery;
pub mod pair;
pub mod telemetry;
