//! ridelink library
//!
//! Headless driver for a single ride session. The session, coordination, and
//! protocol logic live in the `ridelink-*` crates.

pub mod headless;

pub use headless::runner::run_headless;
