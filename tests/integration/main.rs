//! Integration test driver for `tests/integration/`.
//!
//! Each `mod` below maps to a file that exercises a full scenario
//! against mock adapters. All tests run on the host with no real
//! hardware required.

mod mocks;
mod pairing_tests;
mod shutdown_tests;
