//! Role-specific reactions to a ride status.
//!
//! The giver gets the next status-advancing action; the taker only observes
//! and gets UI prompts at a few points of the ride.

use serde::Serialize;

use ridelink_core::{Coordinate, GiverAction, RideLeg, RideStatus, Role};

/// What the current status means for this participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The giver's next action
    Action(GiverAction),
    /// Nothing to perform; the participant just watches the ride
    Observe,
    /// Last leg finished; no further action
    Terminal,
    /// Ride completed: disconnect and ask for feedback
    Finished,
    /// Status/role/leg combination this client has no rule for
    Unmapped,
}

impl Transition {
    pub fn action(&self) -> Option<GiverAction> {
        match self {
            Transition::Action(action) => Some(*action),
            _ => None,
        }
    }

    /// `nextStatus` name shown to the UI, if any
    pub fn next_status_name(&self) -> Option<&'static str> {
        self.action().map(|a| a.next_status_name())
    }
}

/// Prompts and displays the UI layer reacts to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "camelCase")]
pub enum UiEffect {
    /// Taker: the giver is on the way
    RiderEnRoute,
    /// Taker: confirm the child was picked up
    ConfirmPickup,
    /// Taker: confirm the child was dropped off
    ConfirmDropOff,
    /// Ride completed
    FeedbackPrompt,
    /// Live giver position
    RiderLocation { position: Coordinate },
    /// Route endpoints announced at ride start
    RoutePlanned { start: Coordinate, end: Coordinate },
}

/// Next-status lookup for `role` on `leg` at `status`
pub fn next_transition(role: Role, leg: RideLeg, status: &RideStatus) -> Transition {
    match role {
        Role::Giver => giver_transition(leg, status),
        Role::Taker => match status {
            RideStatus::Completed => Transition::Finished,
            RideStatus::Unknown(_) => Transition::Unmapped,
            _ => Transition::Observe,
        },
    }
}

fn giver_transition(leg: RideLeg, status: &RideStatus) -> Transition {
    use GiverAction::*;

    let action = match (status, leg) {
        (RideStatus::Scheduled, _) => StartRide,
        (RideStatus::Started, RideLeg::Pick) => ArrivedAtPickup,
        (RideStatus::Started, RideLeg::Drop) => ReturnedToActivity,
        (RideStatus::RiderArrived, _) => MarkPickedUp,
        (RideStatus::PickedUp, _) => ArrivedAtActivity,
        (RideStatus::ArrivedAtActivity, _) => ActivityOngoing,
        (RideStatus::ActivityOngoing, RideLeg::Pick) => DropOffAtHome,
        (RideStatus::ActivityOngoing, RideLeg::Drop) => ReturnedToActivity,
        (RideStatus::ReturnedActivity, _) => PickedUpFromActivity,
        (RideStatus::PickedUpFromActivity, _) => DropOffAtHome,
        (RideStatus::ReturnedHome, RideLeg::Drop) => return Transition::Terminal,
        (RideStatus::ReturnedHome, RideLeg::Pick) => return Transition::Unmapped,
        (RideStatus::Completed, _) => return Transition::Finished,
        (RideStatus::Unknown(_), _) => return Transition::Unmapped,
    };
    Transition::Action(action)
}

/// Prompts fired once when the ride enters `status`
pub fn status_effects(role: Role, status: &RideStatus) -> Vec<UiEffect> {
    match (role, status) {
        (_, RideStatus::Completed) => vec![UiEffect::FeedbackPrompt],
        (Role::Taker, RideStatus::Started) => vec![UiEffect::RiderEnRoute],
        (Role::Taker, RideStatus::RiderArrived) => vec![UiEffect::ConfirmPickup],
        (Role::Taker, RideStatus::PickedUpFromActivity | RideStatus::ReturnedHome) => {
            vec![UiEffect::ConfirmDropOff]
        }
        _ => Vec::new(),
    }
}
