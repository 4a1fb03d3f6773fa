//! Session manager: owns the ride socket and keeps it alive.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SessionManager                         │
//! │                                                               │
//! │  ┌───────────────┐        ┌────────────────────────────────┐  │
//! │  │ SessionHandle │        │ Background task (one actor)    │  │
//! │  │               │        │                                │  │
//! │  │ connect()   ──┼──cmd──▶│ select! over:                  │  │
//! │  │ send()        │  chan  │   commands, connect outcome,   │  │
//! │  │ disconnect()  │        │   socket frames, heartbeat,    │  │
//! │  │ resume_now()  │        │   reconnect timer, idle timer  │  │
//! │  │               │        │                                │  │
//! │  │ state     ◀───┼─watch──│ OutboundQueue, ReconnectPolicy │  │
//! │  └───────────────┘        │ HeartbeatMonitor               │  │
//! │   SessionEvent    ◀──evt──│                                │  │
//! │                           └────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All session state lives inside the background task, so no two handlers
//! ever run against it concurrently. Timers are futures polled by the same
//! `select!`, which means dropping them (on disconnect) is enough to make
//! sure they never fire.
//!
//! Every connect attempt gets a fresh generation number. A connect outcome
//! from an older generation is discarded, which covers the case of a
//! handshake that completes after `disconnect()` or a superseding
//! `connect()`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};

use ridelink_core::prelude::*;
use ridelink_core::{ControlFrame, ProtocolEvent, Settings};

use crate::auth::TokenProvider;
use crate::endpoint::{build_endpoint_url, build_request, redact, ConnectionParams};
use crate::heartbeat::HeartbeatMonitor;
use crate::queue::{FrameSink, OutboundQueue, QueuedMessage};
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::WsStream;

/// Capacity of the command channel
const CMD_CHANNEL_CAPACITY: usize = 32;

/// Upper bound on the close handshake during disconnect
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Connection state published by the session manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    /// Handshake in progress
    Connecting,
    /// Session open; queue draining
    Connected,
    /// Waiting out the backoff before retry `attempt`
    Reconnecting { attempt: u32, delay: Duration },
    /// Configuration error or reconnect budget exhausted. A fresh
    /// `connect()` is needed.
    Failed,
    /// Explicitly disconnected
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Notifications from the session task
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    /// A decoded inbound protocol message
    Message(ProtocolEvent),
    /// Terminal failure: configuration error or exhausted reconnect budget
    Error(Error),
}

/// Commands accepted by the session task
#[derive(Debug)]
pub enum SessionCommand {
    Connect(ConnectionParams),
    Disconnect { done: oneshot::Sender<()> },
    Send(QueuedMessage),
    ResumeNow,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Clonable handle to a running session task.
///
/// Calls return [`Error::ChannelClosed`] once the task has exited.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("connection_state", &*self.state_rx.borrow())
            .finish()
    }
}

impl SessionHandle {
    /// Open a session for `params`, replacing any current one.
    ///
    /// Returns once the request is queued; progress is reported through the
    /// state signal and [`SessionEvent`]s.
    pub async fn connect(&self, params: ConnectionParams) -> Result<()> {
        self.command(SessionCommand::Connect(params)).await
    }

    /// Close the session with a normal close code and drop all session
    /// state. Resolves after the task has finished tearing down.
    pub async fn disconnect(&self) -> Result<()> {
        let (done, done_rx) = oneshot::channel();
        self.command(SessionCommand::Disconnect { done }).await?;
        done_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Queue a serialized message. It is sent once the session is open.
    pub async fn send(&self, message: QueuedMessage) -> Result<()> {
        self.command(SessionCommand::Send(message)).await
    }

    /// Encode and queue a protocol event
    pub async fn send_event(&self, event: &ProtocolEvent) -> Result<()> {
        self.send(QueuedMessage::new(event.encode()?)).await
    }

    /// Retry now instead of waiting out the backoff
    pub async fn resume_now(&self) -> Result<()> {
        self.command(SessionCommand::ResumeNow).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// A receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn command(&self, cmd: SessionCommand) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::ChannelClosed)
    }

    /// Handle backed by plain channels instead of a session task.
    ///
    /// The probe receives every command and drives the published state.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn new_for_test() -> (Self, SessionProbe) {
        let (cmd_tx, commands) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (state, state_rx) = watch::channel(ConnectionState::Idle);
        (Self { cmd_tx, state_rx }, SessionProbe { commands, state })
    }
}

/// The other end of [`SessionHandle::new_for_test`]
#[cfg(any(test, feature = "test-helpers"))]
pub struct SessionProbe {
    pub commands: mpsc::Receiver<SessionCommand>,
    pub state: watch::Sender<ConnectionState>,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Spawns session tasks
pub struct SessionManager;

impl SessionManager {
    /// Start a session task. Must be called inside a Tokio runtime.
    ///
    /// The task exits when every [`SessionHandle`] has been dropped.
    pub fn spawn(
        settings: Settings,
        tokens: Arc<dyn TokenProvider>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let actor = SessionActor::new(settings, tokens, event_tx, state_tx);
        tokio::spawn(actor.run(cmd_rx));

        (SessionHandle { cmd_tx, state_rx }, event_rx)
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

struct LiveSession {
    sink: SplitSink<WsStream, WsMessage>,
    stream: SplitStream<WsStream>,
}

struct ConnectOutcome {
    generation: u64,
    result: Result<WsStream>,
}

type WsReadResult =
    Option<std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>;

struct SessionActor {
    settings: Settings,
    tokens: Arc<dyn TokenProvider>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<ConnectionState>,

    params: Option<ConnectionParams>,
    /// Bumped on every connect attempt and on disconnect
    generation: u64,
    live: Option<LiveSession>,
    connect_task: Option<JoinHandle<()>>,
    outcome_tx: mpsc::UnboundedSender<ConnectOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<ConnectOutcome>,
    last_frame_at: Instant,
    /// Set by `disconnect()`, cleared by the next `connect()`
    disconnecting: bool,

    queue: OutboundQueue,
    policy: ReconnectPolicy,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    heartbeat: HeartbeatMonitor,
}

impl SessionActor {
    fn new(
        settings: Settings,
        tokens: Arc<dyn TokenProvider>,
        events: mpsc::UnboundedSender<SessionEvent>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::new(settings.reconnect.clone());
        let heartbeat = HeartbeatMonitor::new(settings.session.heartbeat_interval());
        Self {
            settings,
            tokens,
            events,
            state,
            params: None,
            generation: 0,
            live: None,
            connect_task: None,
            outcome_tx,
            outcome_rx,
            last_frame_at: Instant::now(),
            disconnecting: false,
            queue: OutboundQueue::new(),
            policy,
            reconnect_timer: None,
            heartbeat,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        let idle_timeout = self.settings.session.resource_timeout();

        loop {
            let idle_deadline = self
                .live
                .as_ref()
                .map(|_| self.last_frame_at + idle_timeout);

            tokio::select! {
                // ── Command from a handle ───────────────────────────────
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("Session: all handles dropped, shutting down");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                // ── Handshake finished ──────────────────────────────────
                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_connect_outcome(outcome).await;
                }

                // ── Inbound frame ───────────────────────────────────────
                frame = next_frame(&mut self.live) => {
                    self.handle_frame(frame).await;
                }

                // ── Heartbeat probe ─────────────────────────────────────
                _ = self.heartbeat.tick() => {
                    self.send_heartbeat().await;
                }

                // ── Backoff elapsed ─────────────────────────────────────
                _ = wait_timer(&mut self.reconnect_timer) => {
                    self.fire_reconnect();
                }

                // ── No inbound frame for too long ───────────────────────
                _ = sleep_until(idle_deadline) => {
                    self.handle_failure(Error::IdleTimeout {
                        secs: idle_timeout.as_secs(),
                    })
                    .await;
                }
            }
        }

        debug!("Session background task exiting");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect(params) => self.connect(params).await,
            SessionCommand::Disconnect { done } => {
                self.disconnect().await;
                let _ = done.send(());
            }
            SessionCommand::Send(message) => self.enqueue(message).await,
            SessionCommand::ResumeNow => self.resume_now(),
        }
    }

    // ── connect / disconnect ────────────────────────────────────────────

    async fn connect(&mut self, params: ConnectionParams) {
        info!(
            "Session: connect requested (ride {}, role {})",
            params.ride_id, params.role
        );

        self.cancel_connect();
        self.heartbeat.stop();
        self.reconnect_timer = None;
        if let Some(live) = self.live.take() {
            close_gracefully(live, "superseded").await;
        }

        self.disconnecting = false;
        let dropped = self.queue.clear(&Error::Disconnected);
        if dropped > 0 {
            debug!("Session: dropped {} message(s) from previous session", dropped);
        }
        self.policy.reset();
        self.params = Some(params);

        self.begin_open();
    }

    async fn disconnect(&mut self) {
        info!("Session: disconnect requested");

        // Invalidate everything that could still fire before awaiting the
        // close handshake.
        self.disconnecting = true;
        self.generation += 1;
        self.reconnect_timer = None;
        self.policy.reset();
        self.heartbeat.stop();
        self.cancel_connect();

        if let Some(live) = self.live.take() {
            close_gracefully(live, "disconnect").await;
        }

        self.params = None;
        let dropped = self.queue.clear(&Error::Disconnected);
        if dropped > 0 {
            debug!("Session: flushed {} queued message(s) on disconnect", dropped);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn shutdown(&mut self) {
        self.disconnecting = true;
        self.reconnect_timer = None;
        self.heartbeat.stop();
        self.cancel_connect();
        if let Some(live) = self.live.take() {
            close_gracefully(live, "shutdown").await;
        }
        self.queue.clear(&Error::ChannelClosed);
    }

    fn cancel_connect(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }

    /// Start a handshake for the stored params.
    ///
    /// Token and URL problems are configuration errors: they are reported
    /// and never retried.
    fn begin_open(&mut self) {
        let Some(params) = self.params.as_ref() else {
            return;
        };

        let request = match self.prepare_request(params) {
            Ok(request) => request,
            Err(err) => {
                error!("Session: cannot connect: {}", err);
                self.set_state(ConnectionState::Failed);
                self.emit(SessionEvent::Error(err));
                return;
            }
        };

        self.generation += 1;
        let generation = self.generation;
        let timeout = self.settings.session.request_timeout();
        let outcome_tx = self.outcome_tx.clone();

        self.set_state(ConnectionState::Connecting);
        self.connect_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, connect_async(request)).await {
                Ok(Ok((stream, _response))) => Ok(stream),
                Ok(Err(err)) => Err(Error::connect(err.to_string())),
                Err(_) => Err(Error::ConnectTimeout {
                    secs: timeout.as_secs(),
                }),
            };
            let _ = outcome_tx.send(ConnectOutcome { generation, result });
        }));
    }

    fn prepare_request(
        &self,
        params: &ConnectionParams,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let token = self.tokens.bearer_token().ok_or(Error::MissingToken)?;
        let url = build_endpoint_url(&self.settings.endpoint.socket_url, params)?;
        info!("Session: connecting to {}", redact(&url));
        build_request(&url, &token)
    }

    async fn handle_connect_outcome(&mut self, outcome: ConnectOutcome) {
        if outcome.generation != self.generation || self.disconnecting {
            debug!(
                "Session: discarding stale connect outcome (generation {})",
                outcome.generation
            );
            return;
        }
        self.connect_task = None;

        match outcome.result {
            Ok(stream) => self.on_open(stream).await,
            Err(err) => self.handle_failure(err).await,
        }
    }

    async fn on_open(&mut self, stream: WsStream) {
        let (sink, stream) = stream.split();
        self.live = Some(LiveSession { sink, stream });
        self.last_frame_at = Instant::now();
        self.policy.reset();
        self.heartbeat.start();
        self.queue.rearm();

        info!("Session: connected");
        self.set_state(ConnectionState::Connected);
        self.drain_queue().await;
    }

    // ── failure and reconnection ────────────────────────────────────────

    /// Transport failure: drop the session and hand over to the policy
    async fn handle_failure(&mut self, err: Error) {
        if self.disconnecting {
            debug!("Session: ignoring failure during disconnect: {}", err);
            return;
        }

        warn!("Session: connection lost: {}", err);
        self.live = None;
        self.heartbeat.stop();
        self.queue.rearm();
        self.schedule_reconnect(false);
    }

    fn schedule_reconnect(&mut self, immediate: bool) {
        let decision =
            self.policy
                .schedule(self.disconnecting, self.params.is_some(), immediate);

        match decision {
            ReconnectDecision::Scheduled { attempt, delay } => {
                info!(
                    "Session: reconnecting in {:?} (attempt {}/{})",
                    delay,
                    attempt,
                    self.policy.max_attempts()
                );
                self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
                self.set_state(ConnectionState::Reconnecting { attempt, delay });
            }
            ReconnectDecision::Exhausted { attempts } => {
                error!("Session: giving up after {} reconnect attempts", attempts);
                self.set_state(ConnectionState::Failed);
                self.emit(SessionEvent::Error(Error::ReconnectExhausted { attempts }));
            }
            ReconnectDecision::Skipped(reason) => {
                debug!("Session: reconnect skipped ({:?})", reason);
            }
        }
    }

    fn fire_reconnect(&mut self) {
        self.reconnect_timer = None;
        self.policy.fire();

        // The user may have disconnected while the timer was pending.
        if self.disconnecting || self.params.is_none() {
            debug!("Session: reconnect timer fired after disconnect, ignoring");
            return;
        }
        self.begin_open();
    }

    fn resume_now(&mut self) {
        if self.live.is_some() || self.connect_task.is_some() {
            debug!("Session: resume requested while connected or connecting");
            return;
        }
        self.schedule_reconnect(true);
    }

    // ── outbound ────────────────────────────────────────────────────────

    async fn enqueue(&mut self, message: QueuedMessage) {
        if self.disconnecting || self.params.is_none() {
            debug!("Session: rejecting send without an active session");
            message.reject(&Error::Disconnected);
            return;
        }
        self.queue.push(message);
        self.drain_queue().await;
    }

    async fn drain_queue(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if self.queue.is_empty() {
            return;
        }

        match self.queue.process(&mut live.sink).await {
            Ok(sent) => debug!("Session: sent {} queued message(s)", sent),
            Err(err) => self.handle_failure(err).await,
        }
    }

    async fn send_heartbeat(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        trace!("Session: heartbeat ping");
        let pinged = self.heartbeat.ping(&mut live.sink).await;
        if let Err(err) = pinged {
            self.handle_failure(err).await;
        }
    }

    async fn send_control(&mut self, frame: ControlFrame) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if let Err(err) = live.sink.send_text(frame.as_str().to_string()).await {
            self.handle_failure(err).await;
        }
    }

    // ── inbound ─────────────────────────────────────────────────────────

    async fn handle_frame(&mut self, frame: WsReadResult) {
        self.last_frame_at = Instant::now();

        match frame {
            Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str()).await,
            Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.handle_text(text).await,
                Err(_) => warn!("Session: skipping non-UTF-8 binary frame"),
            },
            Some(Ok(WsMessage::Close(frame))) => {
                let code = frame.map(|f| u16::from(f.code));
                self.handle_failure(Error::ClosedByPeer { code }).await;
            }
            Some(Ok(_)) => {
                // Transport ping/pong; tungstenite answers pings itself.
            }
            Some(Err(err)) => self.handle_failure(Error::receive(err.to_string())).await,
            None => self.handle_failure(Error::receive("stream ended")).await,
        }
    }

    async fn handle_text(&mut self, text: &str) {
        if let Some(control) = ControlFrame::parse(text) {
            if let Some(reply) = self.heartbeat.on_control_frame(control) {
                self.send_control(reply).await;
            }
            return;
        }

        match ProtocolEvent::decode(text) {
            Ok(event) => {
                debug!("Session: received {}", event.event_type());
                self.emit(SessionEvent::Message(event));
            }
            Err(err) => warn!("Session: skipping undecodable frame: {}", err),
        }
    }

    // ── signals ─────────────────────────────────────────────────────────

    fn set_state(&mut self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if changed {
            debug!("Session: state -> {:?}", next);
            self.emit(SessionEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Next frame of the live session; pends forever without one
async fn next_frame(live: &mut Option<LiveSession>) -> WsReadResult {
    match live {
        Some(session) => session.stream.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Send a normal-closure Close frame, ignoring write errors
async fn close_gracefully(live: LiveSession, reason: &'static str) {
    let LiveSession { mut sink, stream } = live;
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    };
    let close = async {
        let _ = sink.send(WsMessage::Close(Some(frame))).await;
        let _ = sink.close().await;
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, close).await.is_err() {
        debug!("Session: close handshake timed out");
    }
    drop(stream);
}
