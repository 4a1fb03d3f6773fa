//! Headless runner - drives one ride session from stdin commands
//!
//! Ride output goes to stdout as [`HeadlessEvent`]s. Commands are read one
//! per line from stdin on a blocking thread.

use std::sync::Arc;

use tokio::sync::mpsc;

use ridelink_app::{HttpRideStatusSource, RideContext, RideHandle, RideSession, RideSubscriptions};
use ridelink_core::prelude::*;
use ridelink_core::Settings;
use ridelink_socket::{
    ConnectionState, LifecycleAdapter, NoopExecutionWindow, SessionManager, TokenProvider,
};

use super::HeadlessEvent;

/// Commands accepted on stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinCommand {
    /// Perform the giver's next action
    Next,
    Resync,
    Background,
    Foreground,
    Disconnect,
    Quit,
}

/// Parse one stdin line. Empty and unknown lines give `None`.
pub fn parse_command(line: &str) -> Option<StdinCommand> {
    match line.trim() {
        "n" | "next" => Some(StdinCommand::Next),
        "resync" => Some(StdinCommand::Resync),
        "background" => Some(StdinCommand::Background),
        "foreground" => Some(StdinCommand::Foreground),
        "disconnect" => Some(StdinCommand::Disconnect),
        "q" | "quit" => Some(StdinCommand::Quit),
        "" => None,
        other => {
            warn!("Unknown stdin command: {}", other);
            None
        }
    }
}

/// Run one ride session until it ends or stdin asks to quit
pub async fn run_headless(
    ride: RideContext,
    settings: Settings,
    tokens: Arc<dyn TokenProvider>,
) -> Result<()> {
    info!(
        "Headless: ride {} as {} ({} leg)",
        ride.ride_id, ride.role, ride.leg
    );

    let source = match settings.endpoint.rest_url.as_deref() {
        Some(url) => Some(Arc::new(
            HttpRideStatusSource::new(url, Arc::clone(&tokens), settings.session.request_timeout())
                .context("Headless: REST fallback unavailable")?,
        )),
        None => None,
    };

    let (session, session_events) = SessionManager::spawn(settings.clone(), tokens);
    let lifecycle = LifecycleAdapter::new(session.clone(), NoopExecutionWindow);
    let (handle, subs) = RideSession::spawn(ride, &settings, session, session_events, source);

    let (stdin_tx, stdin_rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        read_stdin_blocking(stdin_tx);
    });

    let result = event_loop(&handle, subs, stdin_rx, &lifecycle).await;

    if let Err(e) = &result {
        error!("Headless: {}", e);
        HeadlessEvent::error(e.to_string(), true).emit();
    }
    info!("Headless: exiting");
    result
}

async fn event_loop(
    ride: &RideHandle,
    mut subs: RideSubscriptions,
    mut stdin_rx: mpsc::Receiver<StdinCommand>,
    lifecycle: &LifecycleAdapter<NoopExecutionWindow>,
) -> Result<()> {
    let mut connection = ride.watch_connection();

    loop {
        tokio::select! {
            Some(update) = subs.statuses.recv() => {
                HeadlessEvent::status(&update).emit();
            }

            Some(effect) = subs.effects.recv() => {
                HeadlessEvent::effect(effect).emit();
            }

            Some(alert) = subs.alerts.recv() => {
                HeadlessEvent::alert(alert).emit();
            }

            changed = connection.changed() => {
                if changed.is_err() {
                    info!("Headless: session task ended");
                    break;
                }
                let state = connection.borrow_and_update().clone();
                HeadlessEvent::connection(&state).emit();
                if state == ConnectionState::Disconnected {
                    break;
                }
            }

            cmd = stdin_rx.recv() => {
                match cmd {
                    Some(StdinCommand::Next) => ride.perform_next().await?,
                    Some(StdinCommand::Resync) => ride.resync().await?,
                    Some(StdinCommand::Background) => lifecycle.did_enter_background(),
                    Some(StdinCommand::Foreground) => lifecycle.will_enter_foreground().await?,
                    Some(StdinCommand::Disconnect) => ride.disconnect().await?,
                    Some(StdinCommand::Quit) | None => {
                        info!("Headless: quit requested");
                        ride.disconnect().await?;
                        break;
                    }
                }
            }
        }
    }

    // Whatever the ride published before the session closed.
    while let Ok(update) = subs.statuses.try_recv() {
        HeadlessEvent::status(&update).emit();
    }
    while let Ok(effect) = subs.effects.try_recv() {
        HeadlessEvent::effect(effect).emit();
    }
    while let Ok(alert) = subs.alerts.try_recv() {
        HeadlessEvent::alert(alert).emit();
    }
    Ok(())
}

fn read_stdin_blocking(tx: mpsc::Sender<StdinCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                let Some(cmd) = parse_command(&line) else {
                    continue;
                };
                info!("Stdin: {:?}", cmd);
                if tx.blocking_send(cmd).is_err() || cmd == StdinCommand::Quit {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("n"), Some(StdinCommand::Next));
        assert_eq!(parse_command(" next \n"), Some(StdinCommand::Next));
        assert_eq!(parse_command("resync"), Some(StdinCommand::Resync));
        assert_eq!(parse_command("background"), Some(StdinCommand::Background));
        assert_eq!(parse_command("foreground"), Some(StdinCommand::Foreground));
        assert_eq!(parse_command("disconnect"), Some(StdinCommand::Disconnect));
        assert_eq!(parse_command("q"), Some(StdinCommand::Quit));
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("fly"), None);
    }
}
