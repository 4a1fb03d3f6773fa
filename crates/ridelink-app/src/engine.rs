//! Ride session engine.
//!
//! [`RideSession`] runs the [`RideStatusCoordinator`] inside one task. That
//! task alone owns the coordinator, the debounce window, and the resync
//! timer. Inputs are socket session events, UI commands from
//! [`RideHandle`], and REST snapshots fetched in the background.
//!
//! Outputs are split the way the UI consumes them:
//! - debounced [`StatusUpdate`]s, plus an always-current status signal
//! - [`UiEffect`] prompts, delivered immediately
//! - [`UserAlert`]s, on a channel of their own

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use ridelink_core::prelude::*;
use ridelink_core::{GiverAction, ProtocolEvent, RideStatus, Settings};
use ridelink_socket::{ConnectionParams, ConnectionState, QueuedMessage, SessionEvent, SessionHandle};

use crate::coordinator::{CoordinatorAction, RideContext, RideStatusCoordinator, StatusUpdate, UserAlert};
use crate::debounce::Debouncer;
use crate::rest::{RideSnapshot, RideStatusSource};
use crate::resync::ResyncScheduler;
use crate::transitions::UiEffect;

const CMD_CHANNEL_CAPACITY: usize = 32;

/// UI requests accepted by the engine task
#[derive(Debug)]
pub enum RideCommand {
    /// Perform the giver's next action from the transition table
    PerformNext,
    /// Perform `action`, expecting the ride to be at `expected`
    Perform {
        action: GiverAction,
        expected: RideStatus,
    },
    Resync,
    Disconnect { done: oneshot::Sender<()> },
}

/// Receivers for everything the engine publishes
#[derive(Debug)]
pub struct RideSubscriptions {
    /// Debounced status changes
    pub statuses: mpsc::UnboundedReceiver<StatusUpdate>,
    pub effects: mpsc::UnboundedReceiver<UiEffect>,
    /// User-visible failures
    pub alerts: mpsc::UnboundedReceiver<UserAlert>,
}

/// Clonable handle to a running [`RideSession`]
#[derive(Debug, Clone)]
pub struct RideHandle {
    cmd_tx: mpsc::Sender<RideCommand>,
    status_rx: watch::Receiver<Option<StatusUpdate>>,
    session: SessionHandle,
}

impl RideHandle {
    pub async fn perform_next(&self) -> Result<()> {
        self.command(RideCommand::PerformNext).await
    }

    pub async fn perform(&self, action: GiverAction, expected: RideStatus) -> Result<()> {
        self.command(RideCommand::Perform { action, expected }).await
    }

    /// Ask for the authoritative status as soon as allowed
    pub async fn resync(&self) -> Result<()> {
        self.command(RideCommand::Resync).await
    }

    /// End the ride session. Resolves once the socket session is closed.
    pub async fn disconnect(&self) -> Result<()> {
        let (done, done_rx) = oneshot::channel();
        self.command(RideCommand::Disconnect { done }).await?;
        done_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Latest status, without waiting for the debounce window
    pub fn current_status(&self) -> Option<StatusUpdate> {
        self.status_rx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<Option<StatusUpdate>> {
        self.status_rx.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.session.watch_state()
    }

    /// The socket session this ride runs on
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    async fn command(&self, cmd: RideCommand) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::ChannelClosed)
    }
}

/// Spawns ride session tasks
pub struct RideSession;

impl RideSession {
    /// Start the engine for `ride` on top of an existing socket session.
    ///
    /// With a `source`, the coordinator is seeded from a REST snapshot before
    /// the socket connects, and resyncs fall back to REST while the socket
    /// is down. Must be called inside a Tokio runtime.
    pub fn spawn<S>(
        ride: RideContext,
        settings: &Settings,
        session: SessionHandle,
        session_events: mpsc::UnboundedReceiver<SessionEvent>,
        source: Option<Arc<S>>,
    ) -> (RideHandle, RideSubscriptions)
    where
        S: RideStatusSource + Sync + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(None);
        let (statuses_tx, statuses) = mpsc::unbounded_channel();
        let (effects_tx, effects) = mpsc::unbounded_channel();
        let (alerts_tx, alerts) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

        let engine = RideEngine {
            coordinator: RideStatusCoordinator::new(ride),
            session: session.clone(),
            source,
            fetch_timeout: settings.session.request_timeout(),
            debouncer: Debouncer::new(settings.coordinator.debounce()),
            resync: ResyncScheduler::new(&settings.coordinator),
            status_tx,
            statuses_tx,
            effects_tx,
            alerts_tx,
            snapshot_tx,
            snapshot_rx,
            finished: false,
        };
        tokio::spawn(engine.run(cmd_rx, session_events));

        let handle = RideHandle {
            cmd_tx,
            status_rx,
            session,
        };
        (
            handle,
            RideSubscriptions {
                statuses,
                effects,
                alerts,
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

struct RideEngine<S> {
    coordinator: RideStatusCoordinator,
    session: SessionHandle,
    source: Option<Arc<S>>,
    fetch_timeout: Duration,

    debouncer: Debouncer<StatusUpdate>,
    resync: ResyncScheduler,

    status_tx: watch::Sender<Option<StatusUpdate>>,
    statuses_tx: mpsc::UnboundedSender<StatusUpdate>,
    effects_tx: mpsc::UnboundedSender<UiEffect>,
    alerts_tx: mpsc::UnboundedSender<UserAlert>,
    snapshot_tx: mpsc::UnboundedSender<Result<RideSnapshot>>,
    snapshot_rx: mpsc::UnboundedReceiver<Result<RideSnapshot>>,

    /// Set once the ride completed and the session was closed
    finished: bool,
}

impl<S> RideEngine<S>
where
    S: RideStatusSource + Sync + 'static,
{
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<RideCommand>,
        mut session_events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        self.seed().await;

        if self.finished {
            info!("Ride: already completed, not opening a session");
        } else {
            let ride = self.coordinator.ride();
            let params =
                ConnectionParams::new(ride.ride_id.clone(), ride.participant_id.clone(), ride.role);
            if let Err(e) = self.session.connect(params).await {
                error!("Ride: session task unavailable: {}", e);
                self.alert(None, e.to_string());
                return;
            }
        }

        let mut session_open = true;
        loop {
            let debounce_at = self.debouncer.deadline();
            let resync_at = self.resync.deadline();

            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(RideCommand::Disconnect { done }) => {
                            self.finish().await;
                            cmd_rx.close();
                            let _ = done.send(());
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("Ride: all handles dropped, shutting down");
                            self.finish().await;
                            break;
                        }
                    }
                }

                event = session_events.recv(), if session_open => {
                    match event {
                        Some(event) => self.handle_session_event(event).await,
                        None => {
                            debug!("Ride: session event stream ended");
                            session_open = false;
                        }
                    }
                }

                Some(result) = self.snapshot_rx.recv() => {
                    self.handle_snapshot(result).await;
                }

                _ = sleep_until_opt(debounce_at) => {
                    if let Some(update) = self.debouncer.take_due(Instant::now()) {
                        self.deliver_status(update);
                    }
                }

                _ = sleep_until_opt(resync_at) => {
                    if self.resync.take_due(Instant::now()) {
                        self.run_resync().await;
                    }
                }
            }
        }
    }

    /// Apply a REST snapshot before the socket connects
    async fn seed(&mut self) {
        let Some(source) = self.source.clone() else {
            return;
        };
        let ride_id = self.coordinator.ride().ride_id.clone();
        match fetch_with_timeout(source.as_ref(), &ride_id, self.fetch_timeout).await {
            Ok(snapshot) => {
                info!("Ride: seeded with {}", snapshot.status);
                let actions = self.coordinator.apply_snapshot(snapshot);
                self.apply(actions).await;
            }
            Err(e) => warn!("Ride: could not seed status for {}: {}", ride_id, e),
        }
    }

    async fn handle_command(&mut self, cmd: RideCommand) {
        if self.finished {
            debug!("Ride: ride finished, ignoring {:?}", cmd);
            return;
        }
        let actions = match cmd {
            RideCommand::PerformNext => self.coordinator.perform_next(),
            RideCommand::Perform { action, expected } => self.coordinator.perform(action, &expected),
            RideCommand::Resync => vec![CoordinatorAction::ResyncNow],
            RideCommand::Disconnect { .. } => return,
        };
        self.apply(actions).await;
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StateChanged(state) => {
                debug!("Ride: connection {:?}", state);
                if state.is_connected() && !self.finished {
                    // Anything pushed while the socket was down is lost.
                    self.resync.request_now(Instant::now());
                }
            }
            SessionEvent::Message(event) => {
                if self.finished {
                    return;
                }
                let actions = self.coordinator.handle_event(event);
                self.apply(actions).await;
            }
            SessionEvent::Error(e) => {
                error!("Ride: session failed: {}", e);
                self.alert(None, e.to_string());
            }
        }
    }

    async fn handle_snapshot(&mut self, result: Result<RideSnapshot>) {
        if self.finished {
            return;
        }
        match result {
            Ok(snapshot) => {
                let actions = self.coordinator.apply_snapshot(snapshot);
                self.apply(actions).await;
            }
            Err(e) => warn!("Ride: REST resync failed: {}", e),
        }
    }

    async fn apply(&mut self, actions: Vec<CoordinatorAction>) {
        for action in actions {
            match action {
                CoordinatorAction::Send(event) => self.send(event).await,
                CoordinatorAction::PublishStatus(update) => {
                    self.status_tx.send_replace(Some(update.clone()));
                    self.debouncer.push(update);
                }
                CoordinatorAction::Effect(effect) => {
                    let _ = self.effects_tx.send(effect);
                }
                CoordinatorAction::Alert(alert) => {
                    let _ = self.alerts_tx.send(alert);
                }
                CoordinatorAction::ScheduleResync => {
                    self.resync.schedule_after_send(Instant::now());
                }
                CoordinatorAction::ResyncNow => {
                    self.resync.request_now(Instant::now());
                }
                CoordinatorAction::Disconnect => {
                    info!("Ride: ride completed, closing session");
                    self.finish().await;
                }
            }
        }
    }

    async fn send(&mut self, event: ProtocolEvent) {
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Ride: could not encode {} message: {}", event.event_type(), e);
                return;
            }
        };
        let event_type = event.event_type().to_string();
        let message = QueuedMessage::new(payload).with_completion(move |outcome| match outcome {
            Ok(()) => debug!("Ride: {} delivered", event_type),
            Err(e) => debug!("Ride: {} not delivered yet: {}", event_type, e),
        });
        if let Err(e) = self.session.send(message).await {
            warn!("Ride: session unavailable for send: {}", e);
        }
    }

    /// Resync over the socket when it is up, otherwise over REST
    async fn run_resync(&mut self) {
        if self.finished {
            return;
        }
        if self.session.is_connected() {
            debug!("Ride: resync over socket");
            let query = self.coordinator.resync_query();
            if let Err(e) = self.session.send_event(&query).await {
                warn!("Ride: resync query not queued: {}", e);
            }
            return;
        }

        let Some(source) = self.source.clone() else {
            debug!("Ride: socket down and no REST source, resync waits for reconnect");
            return;
        };
        let ride_id = self.coordinator.ride().ride_id.clone();
        let tx = self.snapshot_tx.clone();
        let timeout = self.fetch_timeout;
        debug!("Ride: resync over REST");
        tokio::spawn(async move {
            let result = fetch_with_timeout(source.as_ref(), &ride_id, timeout).await;
            let _ = tx.send(result);
        });
    }

    fn deliver_status(&self, update: StatusUpdate) {
        let _ = self.statuses_tx.send(update);
    }

    fn alert(&self, code: Option<i64>, message: String) {
        let _ = self.alerts_tx.send(UserAlert { code, message });
    }

    /// Close the session and drop everything learned about the ride
    async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(update) = self.debouncer.flush() {
            self.deliver_status(update);
        }
        self.resync.cancel();
        if let Err(e) = self.session.disconnect().await {
            debug!("Ride: session already gone: {}", e);
        }
        self.coordinator.reset();
    }
}

async fn fetch_with_timeout<S: RideStatusSource>(
    source: &S,
    ride_id: &str,
    timeout: Duration,
) -> Result<RideSnapshot> {
    match tokio::time::timeout(timeout, source.fetch_status(ride_id)).await {
        Ok(result) => result,
        Err(_) => Err(Error::rest(format!(
            "status request timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
