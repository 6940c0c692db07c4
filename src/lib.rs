//! Perse rover control firmware library.
//!
//! Exposes the platform-independent modules for integration testing
//! and external inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod bus;
pub mod config;
pub mod controllers;
pub mod ports;
pub mod registry;
pub mod services;
pub mod shutdown;
pub mod state;
pub mod worker;

// Platform adapters; the ESP-IDF implementations are guarded by cfg
// attributes inside.
pub mod adapters;
