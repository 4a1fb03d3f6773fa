//! Endpoint URL and handshake request construction.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use url::Url;

use ridelink_core::prelude::*;
use ridelink_core::Role;

/// Who is connecting to which ride.
///
/// Captured by the first `connect` and kept across reconnects until an
/// explicit disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub ride_id: String,
    pub participant_id: String,
    pub role: Role,
}

impl ConnectionParams {
    pub fn new(ride_id: impl Into<String>, participant_id: impl Into<String>, role: Role) -> Self {
        Self {
            ride_id: ride_id.into(),
            participant_id: participant_id.into(),
            role,
        }
    }
}

/// Build `{base}?role=..&rideId=..&{giverId|takerId}=..`.
///
/// `http`/`https` bases are mapped to `ws`/`wss`. Any existing query on the
/// base is replaced.
pub fn build_endpoint_url(base: &str, params: &ConnectionParams) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| Error::invalid_endpoint(base, e.to_string()))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(Error::invalid_endpoint(
                base,
                format!("unsupported scheme '{other}'"),
            ))
        }
    };
    if url.set_scheme(scheme).is_err() {
        return Err(Error::invalid_endpoint(base, "cannot switch to a websocket scheme"));
    }

    if params.ride_id.trim().is_empty() {
        return Err(Error::invalid_endpoint(base, "empty ride id"));
    }
    if params.participant_id.trim().is_empty() {
        return Err(Error::invalid_endpoint(base, "empty participant id"));
    }

    url.query_pairs_mut()
        .clear()
        .append_pair("role", params.role.as_query())
        .append_pair("rideId", &params.ride_id)
        .append_pair(params.role.participant_param(), &params.participant_id);

    Ok(url)
}

/// Handshake request carrying `Authorization: Bearer {token}`
pub fn build_request(url: &Url, token: &str) -> Result<Request> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::invalid_endpoint(redact(url), e.to_string()))?;

    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| Error::config("bearer token is not a valid header value"))?;
    request.headers_mut().insert(AUTHORIZATION, value);

    Ok(request)
}

/// URL without its query string, safe for logs
pub fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(role: Role) -> ConnectionParams {
        ConnectionParams::new("R1", "P9", role)
    }

    #[test]
    fn test_giver_url_carries_role_ride_and_giver_id() {
        let url = build_endpoint_url("wss://api.example.com/match/connect", &params(Role::Giver))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.example.com/match/connect?role=giver&rideId=R1&giverId=P9"
        );
    }

    #[test]
    fn test_taker_url_uses_taker_id() {
        let url = build_endpoint_url("wss://api.example.com/match/connect", &params(Role::Taker))
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("role".into(), "taker".into()),
                ("rideId".into(), "R1".into()),
                ("takerId".into(), "P9".into()),
            ]
        );
    }

    #[test]
    fn test_http_base_is_mapped_to_websocket_scheme() {
        let url = build_endpoint_url("http://127.0.0.1:9000/match/connect", &params(Role::Giver))
            .unwrap();
        assert_eq!(url.scheme(), "ws");
        let url = build_endpoint_url("https://example.com/match/connect", &params(Role::Giver))
            .unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn test_existing_query_is_replaced() {
        let url = build_endpoint_url("ws://h/match/connect?stale=1", &params(Role::Giver)).unwrap();
        assert!(!url.as_str().contains("stale"));
    }

    #[test]
    fn test_malformed_url_is_a_configuration_error() {
        for base in ["not a url", "ftp://example.com/x", "/match/connect"] {
            let err = build_endpoint_url(base, &params(Role::Giver)).unwrap_err();
            assert!(err.is_configuration(), "{base}: {err}");
        }
    }

    #[test]
    fn test_empty_ids_are_rejected() {
        let err = build_endpoint_url("wss://h/c", &ConnectionParams::new("", "P", Role::Giver))
            .unwrap_err();
        assert!(err.is_configuration());
        let err = build_endpoint_url("wss://h/c", &ConnectionParams::new("R", " ", Role::Taker))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_request_carries_bearer_header() {
        let url = build_endpoint_url("wss://h/match/connect", &params(Role::Giver)).unwrap();
        let request = build_request(&url, "tok123").unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer tok123"
        );
        assert_eq!(request.uri().query(), Some("role=giver&rideId=R1&giverId=P9"));
    }

    #[test]
    fn test_token_with_newline_is_a_configuration_error() {
        let url = build_endpoint_url("wss://h/match/connect", &params(Role::Giver)).unwrap();
        let err = build_request(&url, "bad\ntoken").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_redact_strips_query() {
        let url = build_endpoint_url("wss://h/match/connect", &params(Role::Giver)).unwrap();
        assert_eq!(redact(&url), "wss://h/match/connect");
    }
}
