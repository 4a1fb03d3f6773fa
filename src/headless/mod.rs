//! Headless mode - NDJSON event output for scripting a ride session
//!
//! Ride progress is written to stdout as newline-delimited JSON, one event per
//! line. Each event has an "event" field naming its type.
//!
//! # Example Output
//!
//! ```json
//! {"event":"connection","state":"connected","timestamp":1714557600000}
//! {"event":"status","status":"SCHEDULED","next_status":"rideStart","action":"Start Ride","timestamp":1714557600300}
//! {"event":"effect","effect":"feedbackPrompt","timestamp":1714559400000}
//! ```

pub mod runner;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use ridelink_app::{StatusUpdate, UiEffect, UserAlert};
use ridelink_socket::ConnectionState;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Socket connection state changed
    Connection {
        state: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
        timestamp: i64,
    },

    /// Ride status changed (debounced)
    Status {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_status: Option<String>,
        /// Label of the giver's next action
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        since: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        elapsed_secs: Option<i64>,
        timestamp: i64,
    },

    /// UI prompt or map update
    Effect {
        #[serde(flatten)]
        effect: UiEffect,
        timestamp: i64,
    },

    /// User-visible failure
    Alert {
        code: Option<i64>,
        message: String,
        timestamp: i64,
    },

    /// The headless driver itself failed
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn connection(state: &ConnectionState) -> Self {
        let (label, attempt, delay_ms) = match state {
            ConnectionState::Idle => ("idle", None, None),
            ConnectionState::Connecting => ("connecting", None, None),
            ConnectionState::Connected => ("connected", None, None),
            ConnectionState::Reconnecting { attempt, delay } => (
                "reconnecting",
                Some(*attempt),
                Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
            ),
            ConnectionState::Failed => ("failed", None, None),
            ConnectionState::Disconnected => ("disconnected", None, None),
        };
        Self::Connection {
            state: label,
            attempt,
            delay_ms,
            timestamp: Self::now(),
        }
    }

    pub fn status(update: &StatusUpdate) -> Self {
        Self::status_at(update, Utc::now())
    }

    fn status_at(update: &StatusUpdate, now: DateTime<Utc>) -> Self {
        Self::Status {
            status: update.status.to_string(),
            next_status: update.next_status().map(str::to_string),
            action: update.action_label().map(str::to_string),
            since: update.since.map(|at| at.to_rfc3339()),
            elapsed_secs: update
                .since
                .map(|at| (now - at).num_seconds().max(0)),
            timestamp: now.timestamp_millis(),
        }
    }

    pub fn effect(effect: UiEffect) -> Self {
        Self::Effect {
            effect,
            timestamp: Self::now(),
        }
    }

    pub fn alert(alert: UserAlert) -> Self {
        Self::Alert {
            code: alert.code,
            message: alert.message,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }
}
