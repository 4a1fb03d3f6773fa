//! Ride lifecycle types: statuses, participant roles, ride legs, and the
//! actions a ride giver can take to advance a ride.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// RideStatus
// ─────────────────────────────────────────────────────────────────

/// Progress of a ride.
///
/// The known statuses form a total order (`Scheduled` < `Started` < … <
/// `Completed`). [`RideStatus::Unknown`] carries a status string the client
/// does not recognize; it sits outside that order, so comparing it with any
/// status yields `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RideStatus {
    Scheduled,
    Started,
    RiderArrived,
    PickedUp,
    ArrivedAtActivity,
    ActivityOngoing,
    ReturnedActivity,
    PickedUpFromActivity,
    ReturnedHome,
    Completed,
    /// Out-of-band status reported by the server but not known to this client
    Unknown(String),
}

impl RideStatus {
    /// All ordered statuses, earliest first
    pub const ORDERED: [RideStatus; 10] = [
        RideStatus::Scheduled,
        RideStatus::Started,
        RideStatus::RiderArrived,
        RideStatus::PickedUp,
        RideStatus::ArrivedAtActivity,
        RideStatus::ActivityOngoing,
        RideStatus::ReturnedActivity,
        RideStatus::PickedUpFromActivity,
        RideStatus::ReturnedHome,
        RideStatus::Completed,
    ];

    /// Position in the ride order, `None` for [`RideStatus::Unknown`]
    pub fn rank(&self) -> Option<u8> {
        let rank = match self {
            RideStatus::Scheduled => 0,
            RideStatus::Started => 1,
            RideStatus::RiderArrived => 2,
            RideStatus::PickedUp => 3,
            RideStatus::ArrivedAtActivity => 4,
            RideStatus::ActivityOngoing => 5,
            RideStatus::ReturnedActivity => 6,
            RideStatus::PickedUpFromActivity => 7,
            RideStatus::ReturnedHome => 8,
            RideStatus::Completed => 9,
            RideStatus::Unknown(_) => return None,
        };
        Some(rank)
    }

    /// Name used on the wire (`rideStatus` field)
    pub fn wire_name(&self) -> &str {
        match self {
            RideStatus::Scheduled => "SCHEDULED",
            RideStatus::Started => "STARTED",
            RideStatus::RiderArrived => "RIDER_ARRIVED",
            RideStatus::PickedUp => "PICKED_UP",
            RideStatus::ArrivedAtActivity => "ARRIVED_AT_ACTIVITY",
            RideStatus::ActivityOngoing => "ACTIVITY_ONGOING",
            RideStatus::ReturnedActivity => "RETURNED_ACTIVITY",
            RideStatus::PickedUpFromActivity => "PICKED_UP_FROM_ACTIVITY",
            RideStatus::ReturnedHome => "RETURNED_HOME",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Unknown(raw) => raw,
        }
    }

    /// Parse a wire status name.
    ///
    /// Matching ignores case and underscores, so `"RIDER_ARRIVED"`,
    /// `"riderArrived"` and `"rider_arrived"` are all accepted. Anything else
    /// becomes [`RideStatus::Unknown`].
    pub fn from_wire(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "scheduled" => RideStatus::Scheduled,
            "started" => RideStatus::Started,
            "riderarrived" => RideStatus::RiderArrived,
            "pickedup" => RideStatus::PickedUp,
            "arrivedatactivity" => RideStatus::ArrivedAtActivity,
            "activityongoing" => RideStatus::ActivityOngoing,
            "returnedactivity" => RideStatus::ReturnedActivity,
            "pickedupfromactivity" => RideStatus::PickedUpFromActivity,
            "returnedhome" => RideStatus::ReturnedHome,
            "completed" => RideStatus::Completed,
            _ => RideStatus::Unknown(raw.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, RideStatus::Unknown(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RideStatus::Completed)
    }
}

impl PartialOrd for RideStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        Some(self.rank()?.cmp(&other.rank()?))
    }
}

impl From<String> for RideStatus {
    fn from(raw: String) -> Self {
        RideStatus::from_wire(&raw)
    }
}

impl From<RideStatus> for String {
    fn from(status: RideStatus) -> Self {
        status.wire_name().to_string()
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Role / RideLeg
// ─────────────────────────────────────────────────────────────────

/// Which side of the ride this device represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The driving participant
    Giver,
    /// The passenger-side participant
    Taker,
}

impl Role {
    /// Value of the `role` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Role::Giver => "giver",
            Role::Taker => "taker",
        }
    }

    /// Name of the query parameter carrying the participant id
    pub fn participant_param(&self) -> &'static str {
        match self {
            Role::Giver => "giverId",
            Role::Taker => "takerId",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "giver" => Ok(Role::Giver),
            "taker" => Ok(Role::Taker),
            other => Err(Error::config(format!(
                "unknown role '{other}' (expected giver or taker)"
            ))),
        }
    }
}

/// Whether a scheduled leg picks a child up from an activity or drops one
/// off at it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideLeg {
    #[default]
    Pick,
    Drop,
}

impl fmt::Display for RideLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RideLeg::Pick => f.write_str("pick"),
            RideLeg::Drop => f.write_str("drop"),
        }
    }
}

impl FromStr for RideLeg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pick" => Ok(RideLeg::Pick),
            "drop" => Ok(RideLeg::Drop),
            other => Err(Error::config(format!(
                "unknown ride leg '{other}' (expected pick or drop)"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// GiverAction
// ─────────────────────────────────────────────────────────────────

/// A status-advancing action the ride giver can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GiverAction {
    StartRide,
    ArrivedAtPickup,
    MarkPickedUp,
    ArrivedAtActivity,
    ActivityOngoing,
    ReturnedToActivity,
    PickedUpFromActivity,
    DropOffAtHome,
}

impl GiverAction {
    /// Name reported as `nextStatus`
    pub fn next_status_name(&self) -> &'static str {
        match self {
            GiverAction::StartRide => "rideStart",
            GiverAction::ArrivedAtPickup => "riderArrived",
            GiverAction::MarkPickedUp => "pickedUp",
            GiverAction::ArrivedAtActivity => "arrivedAtActivity",
            GiverAction::ActivityOngoing => "activityOngoing",
            GiverAction::ReturnedToActivity => "returnedActivity",
            GiverAction::PickedUpFromActivity => "pickedUpFromActivity",
            GiverAction::DropOffAtHome => "returnedHome",
        }
    }

    /// `socketEventType` of the outbound message that performs this action
    pub fn event_type(&self) -> &'static str {
        match self {
            GiverAction::StartRide => "RIDE_START",
            GiverAction::ArrivedAtPickup => "RIDER_ARRIVED",
            GiverAction::MarkPickedUp => "PICKED_UP",
            GiverAction::ArrivedAtActivity => "ARRIVED_AT_ACTIVITY",
            GiverAction::ActivityOngoing => "ACTIVITY_ONGOING",
            GiverAction::ReturnedToActivity => "RETURNED_ACTIVITY",
            GiverAction::PickedUpFromActivity => "PICKED_UP_FROM_ACTIVITY",
            GiverAction::DropOffAtHome => "RETURNED_HOME",
        }
    }

    /// Button label shown to the giver
    pub fn label(&self) -> &'static str {
        match self {
            GiverAction::StartRide => "Start Ride",
            GiverAction::ArrivedAtPickup => "Arrived at Pickup",
            GiverAction::MarkPickedUp => "Picked Up",
            GiverAction::ArrivedAtActivity => "Arrived at Activity",
            GiverAction::ActivityOngoing => "Activity Ongoing",
            GiverAction::ReturnedToActivity => "Returned to Activity",
            GiverAction::PickedUpFromActivity => "Picked Up from Activity",
            GiverAction::DropOffAtHome => "Drop Off at Home",
        }
    }

    /// Status the server moves the ride to once the action is accepted
    pub fn target_status(&self) -> RideStatus {
        match self {
            GiverAction::StartRide => RideStatus::Started,
            GiverAction::ArrivedAtPickup => RideStatus::RiderArrived,
            GiverAction::MarkPickedUp => RideStatus::PickedUp,
            GiverAction::ArrivedAtActivity => RideStatus::ArrivedAtActivity,
            GiverAction::ActivityOngoing => RideStatus::ActivityOngoing,
            GiverAction::ReturnedToActivity => RideStatus::ReturnedActivity,
            GiverAction::PickedUpFromActivity => RideStatus::PickedUpFromActivity,
            GiverAction::DropOffAtHome => RideStatus::ReturnedHome,
        }
    }

    /// Parse a `nextStatus` name (case-insensitive)
    pub fn from_next_status(name: &str) -> Option<Self> {
        const ALL: [GiverAction; 8] = [
            GiverAction::StartRide,
            GiverAction::ArrivedAtPickup,
            GiverAction::MarkPickedUp,
            GiverAction::ArrivedAtActivity,
            GiverAction::ActivityOngoing,
            GiverAction::ReturnedToActivity,
            GiverAction::PickedUpFromActivity,
            GiverAction::DropOffAtHome,
        ];
        ALL.into_iter()
            .find(|action| action.next_status_name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for GiverAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.next_status_name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Coordinate
// ─────────────────────────────────────────────────────────────────

/// A WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}
