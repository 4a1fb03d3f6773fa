//! # ridelink-core - Ride Status Domain Types
//!
//! Foundation crate for ridelink. Provides the ride status model, the socket
//! wire protocol, shared settings types, error handling, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Status Model (`status`)
//! - [`RideStatus`] - Ordered ride lifecycle, plus an out-of-band `Unknown`
//! - [`Role`] - Ride giver or ride taker
//! - [`RideLeg`] - Pick-up or drop-off leg
//! - [`GiverAction`] - Status-advancing actions available to the giver
//! - [`Coordinate`] - A latitude/longitude pair
//!
//! ### Wire Protocol (`protocol`)
//! - [`ProtocolEvent`] - Decoded socket message
//! - [`WireMessage`] - Flat JSON form shared by every message type
//! - [`ControlFrame`] - Plain-text `PING` / `PONG`
//!
//! ### Settings (`settings`)
//! - [`Settings`] - Root of `ridelink.toml`, every field defaulted
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum with configuration / transport / protocol classes
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use ridelink_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod protocol;
pub mod settings;
pub mod status;

/// Prelude for common imports used throughout all ridelink crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use protocol::{
    ControlFrame, ProtocolEvent, WireMessage, ERROR_INVALID_TRANSITION,
    ERROR_RIDE_ALREADY_ONGOING, RECOVERABLE_ERROR_CODES,
};
pub use settings::{
    CoordinatorSettings, EndpointSettings, ReconnectSettings, SessionSettings, Settings,
};
pub use status::{Coordinate, GiverAction, RideLeg, RideStatus, Role};
