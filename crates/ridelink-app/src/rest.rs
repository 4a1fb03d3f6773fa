//! REST fallback for the authoritative ride status.
//!
//! Used to seed the coordinator before the socket connects, and to resync
//! while the socket is down.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use ridelink_core::prelude::*;
use ridelink_core::RideStatus;
use ridelink_socket::TokenProvider;

/// Ride status as reported by `GET /match/get/{rideId}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideSnapshot {
    pub status: RideStatus,
    pub next_status: Option<String>,
}

/// Source of authoritative ride status snapshots
#[trait_variant::make(RideStatusSource: Send)]
pub trait LocalRideStatusSource {
    async fn fetch_status(&self, ride_id: &str) -> Result<RideSnapshot>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotBody {
    status: Option<String>,
    ride_status: Option<String>,
    next_status: Option<String>,
}

/// Accepts the snapshot fields at the top level or under `data`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotEnvelope {
    Wrapped { data: SnapshotBody },
    Bare(SnapshotBody),
}

impl SnapshotEnvelope {
    fn into_snapshot(self) -> Result<RideSnapshot> {
        let body = match self {
            SnapshotEnvelope::Wrapped { data } => data,
            SnapshotEnvelope::Bare(body) => body,
        };
        let raw = body
            .status
            .or(body.ride_status)
            .ok_or_else(|| Error::rest("snapshot has no status"))?;
        Ok(RideSnapshot {
            status: RideStatus::from_wire(&raw),
            next_status: body.next_status,
        })
    }
}

/// Parse a snapshot response body
pub fn parse_snapshot(body: &str) -> Result<RideSnapshot> {
    let envelope: SnapshotEnvelope = serde_json::from_str(body)?;
    envelope.into_snapshot()
}

/// [`RideStatusSource`] over HTTP with bearer auth
pub struct HttpRideStatusSource {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpRideStatusSource {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::invalid_endpoint(base_url, e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::invalid_endpoint(base_url.as_str(), "not a base URL"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::rest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    /// `{base}/match/get/{rideId}`
    pub fn snapshot_url(&self, ride_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid_endpoint(self.base_url.as_str(), "not a base URL"))?
            .pop_if_empty()
            .extend(["match", "get", ride_id]);
        Ok(url)
    }
}

impl RideStatusSource for HttpRideStatusSource {
    async fn fetch_status(&self, ride_id: &str) -> Result<RideSnapshot> {
        let token = self.tokens.bearer_token().ok_or(Error::MissingToken)?;
        let url = self.snapshot_url(ride_id)?;
        debug!("REST: fetching status for ride {}", ride_id);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::rest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::rest(format!("status request returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::rest(e.to_string()))?;
        parse_snapshot(&body)
    }
}
