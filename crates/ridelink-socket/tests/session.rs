//! Session manager against an in-process WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use ridelink_core::{ProtocolEvent, RideStatus, Role, Settings};
use ridelink_socket::{
    ConnectionParams, ConnectionState, SessionEvent, SessionHandle, SessionManager, StaticToken,
};

type ServerWs = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

struct Accepted {
    uri: String,
    authorization: Option<String>,
    ws: ServerWs,
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/match/connect", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> Accepted {
    let (tcp, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .unwrap();

    let mut uri = String::new();
    let mut authorization = None;
    let ws = accept_hdr_async(tcp, |req: &Request, resp: Response| {
        uri = req.uri().to_string();
        authorization = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(resp)
    })
    .await
    .unwrap();

    Accepted {
        uri,
        authorization,
        ws,
    }
}

/// Next application frame the server sees, skipping transport pings
async fn next_client_frame(ws: &mut ServerWs) -> Message {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no frame from client")
            .expect("client stream ended")
            .unwrap();
        if !matches!(frame, Message::Ping(_) | Message::Pong(_)) {
            return frame;
        }
    }
}

fn settings(url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.endpoint.socket_url = url.to_string();
    settings.session.request_timeout_secs = 2;
    settings.reconnect.initial_delay_ms = 20;
    settings.reconnect.max_delay_ms = 80;
    settings
}

fn start(settings: Settings) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
    SessionManager::spawn(settings, Arc::new(StaticToken::new("tok-1")))
}

fn giver() -> ConnectionParams {
    ConnectionParams::new("R1", "G7", Role::Giver)
}

async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    wanted: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for state")
            .expect("session task ended");
        if let SessionEvent::StateChanged(state) = event {
            if wanted(&state) {
                return state;
            }
        }
    }
}

async fn wait_for_message(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> ProtocolEvent {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for message")
            .expect("session task ended");
        if let SessionEvent::Message(message) = event {
            return message;
        }
    }
}

async fn connected(
    listener: &TcpListener,
    handle: &SessionHandle,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Accepted {
    handle.connect(giver()).await.unwrap();
    let accepted = accept(listener).await;
    wait_for_state(events, ConnectionState::is_connected).await;
    accepted
}

#[tokio::test]
async fn test_connect_carries_query_and_bearer_and_delivers_status() {
    let (listener, url) = listen().await;
    let (handle, mut events) = start(settings(&url));

    let mut server = connected(&listener, &handle, &mut events).await;
    assert_eq!(server.uri, "/match/connect?role=giver&rideId=R1&giverId=G7");
    assert_eq!(server.authorization.as_deref(), Some("Bearer tok-1"));
    assert!(handle.is_connected());

    server
        .ws
        .send(Message::Text(
            r#"{"socketEventType":"STATUS","rideStatus":"SCHEDULED","nextStatus":"rideStart","extra":1}"#
                .into(),
        ))
        .await
        .unwrap();

    match wait_for_message(&mut events).await {
        ProtocolEvent::Status {
            ride_status,
            next_status,
            ..
        } => {
            assert_eq!(ride_status, RideStatus::Scheduled);
            assert_eq!(next_status.as_deref(), Some("rideStart"));
        }
        other => panic!("expected status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_abnormal_close_schedules_attempt_one_after_one_second() {
    let (listener, url) = listen().await;
    let mut settings = settings(&url);
    settings.reconnect = Default::default();
    let (handle, mut events) = start(settings);

    let mut server = connected(&listener, &handle, &mut events).await;
    server
        .ws
        .close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "boom".into(),
        }))
        .await
        .unwrap();

    let state = wait_for_state(&mut events, |s| {
        matches!(s, ConnectionState::Reconnecting { .. })
    })
    .await;
    assert_eq!(
        state,
        ConnectionState::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );

    let _second = accept(&listener).await;
    wait_for_state(&mut events, ConnectionState::is_connected).await;
}

#[tokio::test]
async fn test_server_normal_close_still_reconnects() {
    let (listener, url) = listen().await;
    let (handle, mut events) = start(settings(&url));

    let mut server = connected(&listener, &handle, &mut events).await;
    server.ws.close(None).await.unwrap();

    wait_for_state(&mut events, |s| {
        matches!(s, ConnectionState::Reconnecting { attempt: 1, .. })
    })
    .await;
    let second = accept(&listener).await;
    assert_eq!(second.authorization.as_deref(), Some("Bearer tok-1"));
    wait_for_state(&mut events, ConnectionState::is_connected).await;
}

#[tokio::test]
async fn test_messages_sent_while_reconnecting_arrive_in_order() {
    let (listener, url) = listen().await;
    let mut settings = settings(&url);
    settings.reconnect.initial_delay_ms = 200;
    settings.reconnect.max_delay_ms = 200;
    let (handle, mut events) = start(settings);

    let server = connected(&listener, &handle, &mut events).await;
    drop(server);
    wait_for_state(&mut events, |s| {
        matches!(s, ConnectionState::Reconnecting { .. })
    })
    .await;

    for name in ["A", "B", "C"] {
        handle
            .send_event(&ProtocolEvent::Generic {
                event_type: name.to_string(),
                ride_id: Some("R1".into()),
                taker_id: None,
            })
            .await
            .unwrap();
    }

    let mut server = accept(&listener).await;
    let mut seen = Vec::new();
    for _ in 0..3 {
        match next_client_frame(&mut server.ws).await {
            Message::Text(text) => {
                let event = ProtocolEvent::decode(text.as_str()).unwrap();
                seen.push(event.event_type().to_string());
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!(seen, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_text_ping_is_answered_with_pong() {
    let (listener, url) = listen().await;
    let (handle, mut events) = start(settings(&url));

    let mut server = connected(&listener, &handle, &mut events).await;
    server.ws.send(Message::Text("ping".into())).await.unwrap();

    match next_client_frame(&mut server.ws).await {
        Message::Text(text) => assert_eq!(text.as_str(), "PONG"),
        other => panic!("expected PONG, got {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_frame_is_skipped() {
    let (listener, url) = listen().await;
    let (handle, mut events) = start(settings(&url));

    let mut server = connected(&listener, &handle, &mut events).await;
    server.ws.send(Message::Text("{not json".into())).await.unwrap();
    server
        .ws
        .send(Message::Text(r#"{"rideStatus":"STARTED"}"#.into()))
        .await
        .unwrap();
    server
        .ws
        .send(Message::Text(
            r#"{"socketEventType":"ERROR","errorCode":7007,"errorDescription":"invalid"}"#.into(),
        ))
        .await
        .unwrap();

    let message = wait_for_message(&mut events).await;
    assert!(message.is_recoverable_error(), "{message:?}");
    assert!(handle.is_connected());
}

#[tokio::test]
async fn test_disconnect_sends_normal_close_and_stops_reconnecting() {
    let (listener, url) = listen().await;
    let (handle, mut events) = start(settings(&url));

    let mut server = connected(&listener, &handle, &mut events).await;
    handle.disconnect().await.unwrap();
    assert_eq!(handle.connection_state(), ConnectionState::Disconnected);

    match next_client_frame(&mut server.ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected normal close, got {other:?}"),
    }

    let retry = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(retry.is_err(), "no reconnect after an explicit disconnect");
}

#[tokio::test]
async fn test_connect_replaces_existing_session() {
    let (listener, url) = listen().await;
    let (handle, mut events) = start(settings(&url));

    let mut first = connected(&listener, &handle, &mut events).await;
    handle
        .connect(ConnectionParams::new("R2", "T3", Role::Taker))
        .await
        .unwrap();

    match next_client_frame(&mut first.ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected normal close, got {other:?}"),
    }
    let second = accept(&listener).await;
    assert_eq!(second.uri, "/match/connect?role=taker&rideId=R2&takerId=T3");
}

#[tokio::test]
async fn test_silent_server_trips_idle_timeout() {
    let (listener, url) = listen().await;
    let mut settings = settings(&url);
    settings.session.resource_timeout_secs = 1;
    let (handle, mut events) = start(settings);

    let _server = connected(&listener, &handle, &mut events).await;
    wait_for_state(&mut events, |s| {
        matches!(s, ConnectionState::Reconnecting { attempt: 1, .. })
    })
    .await;
}

#[tokio::test]
async fn test_heartbeat_sends_transport_ping() {
    let (listener, url) = listen().await;
    let mut settings = settings(&url);
    settings.session.heartbeat_interval_secs = 1;
    let (handle, mut events) = start(settings);

    let mut server = connected(&listener, &handle, &mut events).await;
    let frame = tokio::time::timeout(WAIT, server.ws.next())
        .await
        .expect("no heartbeat")
        .unwrap()
        .unwrap();
    assert!(matches!(frame, Message::Ping(_)), "{frame:?}");
}

#[tokio::test]
async fn test_vanished_peer_with_heartbeat_running_reconnects() {
    let (listener, url) = listen().await;
    let mut settings = settings(&url);
    settings.session.heartbeat_interval_secs = 1;
    let (handle, mut events) = start(settings);

    let server = connected(&listener, &handle, &mut events).await;
    // Drop the TCP stream without a close frame.
    drop(server);

    wait_for_state(&mut events, |s| {
        matches!(s, ConnectionState::Reconnecting { attempt: 1, .. })
    })
    .await;
    let _second = accept(&listener).await;
    wait_for_state(&mut events, ConnectionState::is_connected).await;
}
