//! Ride status coordinator.
//!
//! Turns inbound protocol events and UI requests into [`CoordinatorAction`]s
//! for the engine to carry out. The coordinator itself never touches the
//! network or a timer, which keeps every rule testable as plain input and
//! output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ridelink_core::prelude::*;
use ridelink_core::{GiverAction, ProtocolEvent, RideLeg, RideStatus, Role};

use crate::history::{parse_timestamp, StatusHistory};
use crate::rest::RideSnapshot;
use crate::transitions::{next_transition, status_effects, Transition, UiEffect};

/// The ride this coordinator tracks and who is watching it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideContext {
    pub ride_id: String,
    pub participant_id: String,
    pub role: Role,
    pub leg: RideLeg,
}

/// Status as presented to the UI
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: RideStatus,
    pub transition: Transition,
    /// When the server first reported this status, if known
    pub since: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// `nextStatus` name for the giver's button, if there is an action
    pub fn next_status(&self) -> Option<&'static str> {
        self.transition.next_status_name()
    }

    /// Button label for the giver's next action
    pub fn action_label(&self) -> Option<&'static str> {
        self.transition.action().map(|a| a.label())
    }
}

/// A user-visible failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAlert {
    pub code: Option<i64>,
    pub message: String,
}

/// Work the engine performs after the coordinator handled an input
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorAction {
    /// Queue an outbound protocol message
    Send(ProtocolEvent),
    /// Hand a status change to the debounced notification
    PublishStatus(StatusUpdate),
    /// Fire a UI prompt right away
    Effect(UiEffect),
    Alert(UserAlert),
    /// Backstop resync after a status-changing send
    ScheduleResync,
    /// Resync as soon as allowed
    ResyncNow,
    /// Ride over: end the session
    Disconnect,
}

#[derive(Debug)]
pub struct RideStatusCoordinator {
    ride: RideContext,
    current: Option<RideStatus>,
    history: StatusHistory,
}

impl RideStatusCoordinator {
    pub fn new(ride: RideContext) -> Self {
        Self {
            ride,
            current: None,
            history: StatusHistory::new(),
        }
    }

    pub fn ride(&self) -> &RideContext {
        &self.ride
    }

    pub fn current_status(&self) -> Option<&RideStatus> {
        self.current.as_ref()
    }

    /// Next step for this participant, once a status is known
    pub fn next_transition(&self) -> Option<Transition> {
        self.current
            .as_ref()
            .map(|status| next_transition(self.ride.role, self.ride.leg, status))
    }

    pub fn history(&self) -> &StatusHistory {
        &self.history
    }

    pub fn current_update(&self) -> Option<StatusUpdate> {
        self.current.as_ref().map(|status| self.update_for(status))
    }

    /// Status query that makes the server push the authoritative status
    pub fn resync_query(&self) -> ProtocolEvent {
        let taker_id = match self.ride.role {
            Role::Taker => Some(self.ride.participant_id.clone()),
            Role::Giver => None,
        };
        ProtocolEvent::status_query(self.ride.ride_id.clone(), taker_id)
    }

    /// Forget everything learned during the session
    pub fn reset(&mut self) {
        self.current = None;
        self.history.clear();
    }

    // ─────────────────────────────────────────────────────────────
    // Inputs
    // ─────────────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: ProtocolEvent) -> Vec<CoordinatorAction> {
        match event {
            ProtocolEvent::Status {
                ride_status,
                next_status,
                date_time,
            } => self.apply_status(ride_status, next_status, date_time.as_deref(), false),

            ProtocolEvent::Error { code, description } => {
                if ridelink_core::RECOVERABLE_ERROR_CODES.contains(&code) {
                    info!("Coordinator: server error {} resolved by resync", code);
                    vec![CoordinatorAction::ResyncNow]
                } else {
                    warn!("Coordinator: server error {}: {}", code, description);
                    vec![CoordinatorAction::Alert(UserAlert {
                        code: Some(code),
                        message: description,
                    })]
                }
            }

            ProtocolEvent::LocationUpdate { ride_id, position } => {
                if !self.is_this_ride(ride_id.as_deref()) {
                    return Vec::new();
                }
                vec![CoordinatorAction::Effect(UiEffect::RiderLocation { position })]
            }

            ProtocolEvent::RideStart {
                ride_id,
                start,
                end,
            } => {
                if !self.is_this_ride(ride_id.as_deref()) {
                    return Vec::new();
                }
                vec![CoordinatorAction::Effect(UiEffect::RoutePlanned { start, end })]
            }

            ProtocolEvent::Generic { event_type, .. } => {
                debug!("Coordinator: ignoring {} event", event_type);
                Vec::new()
            }
        }
    }

    /// Apply a REST snapshot. Snapshots are authoritative and may move the
    /// status backwards.
    pub fn apply_snapshot(&mut self, snapshot: RideSnapshot) -> Vec<CoordinatorAction> {
        self.apply_status(snapshot.status, snapshot.next_status, None, true)
    }

    /// The giver asks to perform `action`, believing the ride is at
    /// `expected`.
    ///
    /// If local state disagrees, nothing is sent and a resync is requested
    /// instead.
    pub fn perform(&mut self, action: GiverAction, expected: &RideStatus) -> Vec<CoordinatorAction> {
        if self.ride.role != Role::Giver {
            warn!("Coordinator: {} is a giver action, ignoring for taker", action);
            return Vec::new();
        }

        let current_matches = self.current.as_ref() == Some(expected);
        let table_matches = self.next_transition() == Some(Transition::Action(action));
        if !current_matches || !table_matches {
            info!(
                "Coordinator: {} requested at {} but local status is {:?}, resyncing",
                action, expected, self.current
            );
            return vec![CoordinatorAction::ResyncNow];
        }

        info!("Coordinator: performing {}", action);
        vec![
            CoordinatorAction::Send(ProtocolEvent::Generic {
                event_type: action.event_type().to_string(),
                ride_id: Some(self.ride.ride_id.clone()),
                taker_id: None,
            }),
            CoordinatorAction::ScheduleResync,
        ]
    }

    /// Perform whatever the table says comes next
    pub fn perform_next(&mut self) -> Vec<CoordinatorAction> {
        match (self.current.clone(), self.next_transition()) {
            (Some(current), Some(Transition::Action(action))) => self.perform(action, &current),
            (_, None) | (_, Some(Transition::Unmapped)) => {
                info!("Coordinator: no known next step, resyncing");
                vec![CoordinatorAction::ResyncNow]
            }
            (_, Some(other)) => {
                debug!("Coordinator: nothing to perform ({:?})", other);
                Vec::new()
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Status application
    // ─────────────────────────────────────────────────────────────

    fn apply_status(
        &mut self,
        status: RideStatus,
        server_next: Option<String>,
        date_time: Option<&str>,
        authoritative: bool,
    ) -> Vec<CoordinatorAction> {
        let at = date_time.and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                warn!("Coordinator: unparsable timestamp '{}' for {}", raw, status);
            }
            parsed
        });
        let advanced = at.is_some_and(|at| self.history.record(&status, at));

        if let Some(current) = self.current.as_ref() {
            if *current == status {
                // Redelivery of the current status: only a newer timestamp
                // is worth telling the UI about.
                return if advanced {
                    vec![CoordinatorAction::PublishStatus(self.update_for(&status))]
                } else {
                    Vec::new()
                };
            }
            if !authoritative && status < *current {
                debug!(
                    "Coordinator: ignoring stale {} (current {})",
                    status, current
                );
                return Vec::new();
            }
        }

        info!("Coordinator: status -> {}", status);
        self.current = Some(status.clone());

        let transition = next_transition(self.ride.role, self.ride.leg, &status);
        self.cross_check(&status, transition, server_next.as_deref());

        let mut actions = vec![CoordinatorAction::PublishStatus(self.update_for(&status))];
        actions.extend(
            status_effects(self.ride.role, &status)
                .into_iter()
                .map(CoordinatorAction::Effect),
        );
        if status.is_completed() {
            actions.push(CoordinatorAction::Disconnect);
        }
        actions
    }

    fn cross_check(&self, status: &RideStatus, transition: Transition, server_next: Option<&str>) {
        if transition == Transition::Unmapped {
            warn!(
                "Coordinator: no transition rule for {} ({} on {} leg)",
                status, self.ride.role, self.ride.leg
            );
            return;
        }
        if self.ride.role != Role::Giver {
            return;
        }
        let Some(server) = server_next.map(str::trim).filter(|s| !s.is_empty()) else {
            return;
        };
        let agrees = transition
            .next_status_name()
            .is_some_and(|local| local.eq_ignore_ascii_case(server));
        if !agrees {
            warn!(
                "Coordinator: server suggests '{}' after {}, keeping {:?}",
                server, status, transition
            );
        }
    }

    fn update_for(&self, status: &RideStatus) -> StatusUpdate {
        StatusUpdate {
            status: status.clone(),
            transition: next_transition(self.ride.role, self.ride.leg, status),
            since: self.history.get(status),
        }
    }

    fn is_this_ride(&self, ride_id: Option<&str>) -> bool {
        match ride_id {
            Some(id) if id != self.ride.ride_id => {
                debug!("Coordinator: ignoring event for ride {}", id);
                false
            }
            _ => true,
        }
    }
}
