//! ridelink-app - Ride status coordination for ridelink
//!
//! Sits on top of the socket session and turns protocol events into ride
//! progress for the UI:
//!
//! - [`RideStatusCoordinator`] - pure state machine over ride status events
//! - [`RideSession`] / [`RideHandle`] - runs the coordinator in one task with
//!   debounced notifications, resync timers, and the REST fallback
//! - [`transitions`] - role- and leg-specific next-step table
//! - [`config`] - `ridelink.toml` loading

pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod engine;
pub mod history;
pub mod rest;
pub mod resync;
pub mod transitions;

pub use config::{default_config_path, init_settings_file, load_settings};
pub use coordinator::{
    CoordinatorAction, RideContext, RideStatusCoordinator, StatusUpdate, UserAlert,
};
pub use debounce::Debouncer;
pub use engine::{RideCommand, RideHandle, RideSession, RideSubscriptions};
pub use history::{parse_timestamp, StatusHistory};
pub use rest::{parse_snapshot, HttpRideStatusSource, RideSnapshot, RideStatusSource};
pub use resync::ResyncScheduler;
pub use transitions::{next_transition, status_effects, Transition, UiEffect};
