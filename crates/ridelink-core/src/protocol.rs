//! Ride socket wire protocol.
//!
//! Every message is a flat JSON object discriminated by `socketEventType`.
//! Decoding goes through [`WireMessage`], a permissive superset of all
//! fields, and then into the typed [`ProtocolEvent`]. Fields the client does
//! not know about are ignored, and unknown `socketEventType` values decode to
//! [`ProtocolEvent::Generic`] so newer servers do not break older clients.
//!
//! Besides JSON, the socket carries the plain-text control frames `PING` and
//! `PONG` (see [`ControlFrame`]).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::status::{Coordinate, RideStatus};

// ---------------------------------------------------------------------------
// Event type names
// ---------------------------------------------------------------------------

pub const EVENT_STATUS: &str = "STATUS";
pub const EVENT_ERROR: &str = "ERROR";
pub const EVENT_LOCATION_UPDATE: &str = "LOCATION_UPDATE";
pub const EVENT_RIDE_START: &str = "RIDE_START";

/// Server error code for an invalid status transition
pub const ERROR_INVALID_TRANSITION: i64 = 7007;

/// Server error code for a ride that is already ongoing
pub const ERROR_RIDE_ALREADY_ONGOING: i64 = 7010;

/// Error codes resolved by resyncing instead of alerting the user
pub const RECOVERABLE_ERROR_CODES: &[i64] = &[ERROR_INVALID_TRANSITION, ERROR_RIDE_ALREADY_ONGOING];

// ---------------------------------------------------------------------------
// ProtocolEvent
// ---------------------------------------------------------------------------

/// A decoded ride socket message
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Ride status push
    Status {
        ride_status: RideStatus,
        next_status: Option<String>,
        date_time: Option<String>,
    },
    /// Server-reported error
    Error { code: i64, description: String },
    /// Live position of the ride giver
    LocationUpdate {
        ride_id: Option<String>,
        position: Coordinate,
    },
    /// Route endpoints announced when a ride starts
    RideStart {
        ride_id: Option<String>,
        start: Coordinate,
        end: Coordinate,
    },
    /// Any other event, identified only by its type and ride
    Generic {
        event_type: String,
        ride_id: Option<String>,
        taker_id: Option<String>,
    },
}

impl ProtocolEvent {
    /// Query asking the server to push the authoritative ride status
    pub fn status_query(ride_id: impl Into<String>, taker_id: Option<String>) -> Self {
        ProtocolEvent::Generic {
            event_type: EVENT_STATUS.to_string(),
            ride_id: Some(ride_id.into()),
            taker_id,
        }
    }

    /// The `socketEventType` this event is sent with
    pub fn event_type(&self) -> &str {
        match self {
            ProtocolEvent::Status { .. } => EVENT_STATUS,
            ProtocolEvent::Error { .. } => EVENT_ERROR,
            ProtocolEvent::LocationUpdate { .. } => EVENT_LOCATION_UPDATE,
            ProtocolEvent::RideStart { .. } => EVENT_RIDE_START,
            ProtocolEvent::Generic { event_type, .. } => event_type,
        }
    }

    /// Returns true for server error codes that a status resync resolves
    pub fn is_recoverable_error(&self) -> bool {
        matches!(self, ProtocolEvent::Error { code, .. } if RECOVERABLE_ERROR_CODES.contains(code))
    }

    /// Serialize to the flat JSON wire form
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&WireMessage::from(self))?)
    }

    /// Decode a JSON text frame
    pub fn decode(text: &str) -> Result<Self> {
        let wire: WireMessage = serde_json::from_str(text)?;
        wire.into_event()
    }
}

// ---------------------------------------------------------------------------
// WireMessage
// ---------------------------------------------------------------------------

/// Flat superset of every wire message field.
///
/// Unknown fields are ignored on deserialization; absent fields are skipped
/// on serialization.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub socket_event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_longitude: Option<f64>,
}

impl From<&ProtocolEvent> for WireMessage {
    fn from(event: &ProtocolEvent) -> Self {
        let mut wire = WireMessage {
            socket_event_type: Some(event.event_type().to_string()),
            ..Default::default()
        };

        match event {
            ProtocolEvent::Status {
                ride_status,
                next_status,
                date_time,
            } => {
                wire.ride_status = Some(ride_status.wire_name().to_string());
                wire.next_status = next_status.clone();
                wire.date_time = date_time.clone();
            }
            ProtocolEvent::Error { code, description } => {
                wire.error_code = Some(*code);
                wire.error_description = Some(description.clone());
            }
            ProtocolEvent::LocationUpdate { ride_id, position } => {
                wire.ride_id = ride_id.clone();
                wire.latitude = Some(position.latitude);
                wire.longitude = Some(position.longitude);
            }
            ProtocolEvent::RideStart {
                ride_id,
                start,
                end,
            } => {
                wire.ride_id = ride_id.clone();
                wire.start_latitude = Some(start.latitude);
                wire.start_longitude = Some(start.longitude);
                wire.end_latitude = Some(end.latitude);
                wire.end_longitude = Some(end.longitude);
            }
            ProtocolEvent::Generic {
                ride_id, taker_id, ..
            } => {
                wire.ride_id = ride_id.clone();
                wire.taker_id = taker_id.clone();
            }
        }

        wire
    }
}

impl WireMessage {
    /// Convert into a typed event, validating the fields its type requires
    pub fn into_event(self) -> Result<ProtocolEvent> {
        let event_type = self
            .socket_event_type
            .ok_or_else(|| Error::protocol("message has no socketEventType"))?;

        match event_type.to_ascii_uppercase().as_str() {
            EVENT_STATUS => {
                let ride_status = self
                    .ride_status
                    .ok_or_else(|| Error::protocol("STATUS message has no rideStatus"))?;
                Ok(ProtocolEvent::Status {
                    ride_status: RideStatus::from_wire(&ride_status),
                    next_status: self.next_status,
                    date_time: self.date_time,
                })
            }
            EVENT_ERROR => Ok(ProtocolEvent::Error {
                code: self
                    .error_code
                    .ok_or_else(|| Error::protocol("ERROR message has no errorCode"))?,
                description: self.error_description.unwrap_or_default(),
            }),
            EVENT_LOCATION_UPDATE => Ok(ProtocolEvent::LocationUpdate {
                ride_id: self.ride_id,
                position: coordinate(self.latitude, self.longitude, "latitude/longitude")?,
            }),
            EVENT_RIDE_START => Ok(ProtocolEvent::RideStart {
                ride_id: self.ride_id,
                start: coordinate(
                    self.start_latitude,
                    self.start_longitude,
                    "startLatitude/startLongitude",
                )?,
                end: coordinate(
                    self.end_latitude,
                    self.end_longitude,
                    "endLatitude/endLongitude",
                )?,
            }),
            _ => Ok(ProtocolEvent::Generic {
                event_type,
                ride_id: self.ride_id,
                taker_id: self.taker_id,
            }),
        }
    }
}

fn coordinate(lat: Option<f64>, lon: Option<f64>, fields: &str) -> Result<Coordinate> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(Coordinate::new(lat, lon)),
        _ => Err(Error::protocol(format!("message is missing {fields}"))),
    }
}

// ---------------------------------------------------------------------------
// Control frames
// ---------------------------------------------------------------------------

/// Plain-text liveness frames exchanged alongside JSON messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    Ping,
    Pong,
}

impl ControlFrame {
    /// Classify a text frame, case-insensitively. Returns `None` for anything
    /// that is not a bare `PING` or `PONG`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("PING") {
            Some(ControlFrame::Ping)
        } else if text.eq_ignore_ascii_case("PONG") {
            Some(ControlFrame::Pong)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlFrame::Ping => "PING",
            ControlFrame::Pong => "PONG",
        }
    }
}
