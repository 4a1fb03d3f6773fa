//! Liveness probing for a connected session.
//!
//! While connected, [`HeartbeatMonitor::tick`] resolves once per interval and
//! the session actor calls [`HeartbeatMonitor::ping`]. A failed ping comes
//! back as [`Error::Heartbeat`] and goes through the same failure path as a
//! receive error.
//!
//! Servers that do not speak transport-level ping use the textual
//! `PING`/`PONG` handshake instead; [`HeartbeatMonitor::on_control_frame`]
//! decides the reply.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use ridelink_core::prelude::*;
use ridelink_core::ControlFrame;

use crate::queue::FrameSink;

#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    ticker: Option<Interval>,
}

impl HeartbeatMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start probing. The first ping fires one full period from now.
    pub fn start(&mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    pub fn stop(&mut self) {
        self.ticker = None;
    }

    /// Resolve when the next ping is due. Pends forever while stopped.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Send one transport ping over `sink`
    pub async fn ping<S: FrameSink>(&self, sink: &mut S) -> Result<()> {
        sink.send_ping()
            .await
            .map_err(|e| Error::heartbeat(e.to_string()))
    }

    /// Handle a textual control frame, returning the reply to send (if any)
    pub fn on_control_frame(&self, frame: ControlFrame) -> Option<ControlFrame> {
        match frame {
            ControlFrame::Ping => Some(ControlFrame::Pong),
            ControlFrame::Pong => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink whose pings succeed until `broken` is set
    #[derive(Default)]
    struct PingSink {
        pings: usize,
        broken: bool,
    }

    impl FrameSink for PingSink {
        async fn send_text(&mut self, _text: String) -> Result<()> {
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<()> {
            if self.broken {
                return Err(Error::send("connection reset by peer"));
            }
            self.pings += 1;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_fires_after_one_period() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        monitor.start();
        let started = Instant::now();

        monitor.tick().await;
        assert_eq!(started.elapsed(), Duration::from_secs(30));

        monitor.tick().await;
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_never_ticks() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        monitor.start();
        monitor.stop();
        assert!(!monitor.is_running());

        let result = tokio::time::timeout(Duration::from_secs(120), monitor.tick()).await;
        assert!(result.is_err(), "stopped heartbeat must not tick");
    }

    #[test]
    fn test_text_ping_is_answered_with_pong() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        assert_eq!(
            monitor.on_control_frame(ControlFrame::Ping),
            Some(ControlFrame::Pong)
        );
        assert_eq!(monitor.on_control_frame(ControlFrame::Pong), None);
    }

    #[tokio::test]
    async fn test_ping_goes_over_the_sink() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        let mut sink = PingSink::default();

        monitor.ping(&mut sink).await.unwrap();
        monitor.ping(&mut sink).await.unwrap();
        assert_eq!(sink.pings, 2);
    }

    #[tokio::test]
    async fn test_failed_ping_is_a_transport_error() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        let mut sink = PingSink {
            broken: true,
            ..Default::default()
        };

        let err = monitor.ping(&mut sink).await.unwrap_err();
        assert!(matches!(err, Error::Heartbeat { .. }), "{err:?}");
        assert!(err.is_transport());
        assert!(err.to_string().contains("connection reset by peer"));
    }
}
