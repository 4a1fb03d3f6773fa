//! # ridelink-socket - Ride Socket Session
//!
//! Keeps one authenticated WebSocket session to the ride relay alive over an
//! unreliable network.
//!
//! - [`SessionManager`] / [`SessionHandle`] - the session actor and its handle
//! - [`OutboundQueue`] - ordered, at-least-once delivery of outbound frames
//! - [`ReconnectPolicy`] - exponential backoff with an attempt budget
//! - [`HeartbeatMonitor`] - periodic transport ping plus textual PING/PONG
//! - [`LifecycleAdapter`] - foreground/background handling
//! - [`TokenProvider`] - bearer token capability

pub mod auth;
pub mod endpoint;
pub mod heartbeat;
pub mod lifecycle;
pub mod manager;
pub mod queue;
pub mod reconnect;

use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub use auth::{EnvToken, StaticToken, TokenProvider, TOKEN_ENV_VAR};
pub use endpoint::{build_endpoint_url, build_request, ConnectionParams};
pub use heartbeat::HeartbeatMonitor;
pub use lifecycle::{ExecutionWindow, LifecycleAdapter, NoopExecutionWindow, WindowId};
pub use manager::{ConnectionState, SessionCommand, SessionEvent, SessionHandle, SessionManager};
pub use queue::{Completion, FrameSink, OutboundQueue, QueuedMessage};
pub use reconnect::{compute_backoff, ReconnectDecision, ReconnectPolicy, SkipReason};

#[cfg(any(test, feature = "test-helpers"))]
pub use manager::SessionProbe;
