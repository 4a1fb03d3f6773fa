//! Server timestamps per ride status.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use ridelink_core::RideStatus;

/// Formats accepted for timestamps that carry no offset
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// When the server reported each status.
///
/// A recorded timestamp never moves backwards.
#[derive(Debug, Clone, Default)]
pub struct StatusHistory {
    entries: HashMap<RideStatus, DateTime<Utc>>,
}

impl StatusHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `at` for `status`. Returns true if the entry was added or
    /// moved forward; an earlier or equal timestamp is ignored.
    pub fn record(&mut self, status: &RideStatus, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(status) {
            Some(existing) if *existing >= at => false,
            Some(existing) => {
                *existing = at;
                true
            }
            None => {
                self.entries.insert(status.clone(), at);
                true
            }
        }
    }

    pub fn get(&self, status: &RideStatus) -> Option<DateTime<Utc>> {
        self.entries.get(status).copied()
    }

    /// Time spent since `status` was reached, never negative
    pub fn elapsed(&self, status: &RideStatus, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.get(status)
            .map(|at| (now - at).max(chrono::Duration::zero()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Parse an ISO-8601 server timestamp. A timestamp without an offset is
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
