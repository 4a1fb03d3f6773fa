//! Scheduling of status resync queries.
//!
//! Two triggers feed one timer: a deferred backstop after every
//! status-changing send, and an immediate request when local state looks
//! out of step with the server. Consecutive resyncs are spaced by a
//! minimum gap.

use std::time::Duration;

use tokio::time::Instant;

use ridelink_core::CoordinatorSettings;

#[derive(Debug)]
pub struct ResyncScheduler {
    delay: Duration,
    min_gap: Duration,
    due: Option<Instant>,
    last_sent: Option<Instant>,
}

impl ResyncScheduler {
    pub fn new(settings: &CoordinatorSettings) -> Self {
        Self {
            delay: settings.resync_delay(),
            min_gap: settings.resync_min_gap(),
            due: None,
            last_sent: None,
        }
    }

    /// Backstop after a send: due `delay` after the latest send
    pub fn schedule_after_send(&mut self, now: Instant) {
        let at = self.respect_gap(now + self.delay);
        self.due = Some(self.due.map_or(at, |due| due.max(at)));
    }

    /// Resync as soon as the minimum gap allows
    pub fn request_now(&mut self, now: Instant) {
        let at = self.respect_gap(now);
        self.due = Some(self.due.map_or(at, |due| due.min(at)));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    /// True if a resync is due by `now`; marks it as sent
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if due <= now => {
                self.due = None;
                self.last_sent = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    fn respect_gap(&self, at: Instant) -> Instant {
        match self.last_sent {
            Some(last) => at.max(last + self.min_gap),
            None => at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> ResyncScheduler {
        ResyncScheduler::new(&CoordinatorSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_schedules_resync_after_delay() {
        let mut resync = scheduler();
        let now = Instant::now();
        resync.schedule_after_send(now);
        assert_eq!(resync.deadline(), Some(now + Duration::from_millis(800)));
        assert!(!resync.take_due(now + Duration::from_millis(799)));
        assert!(resync.take_due(now + Duration::from_millis(800)));
        assert_eq!(resync.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_send_pushes_backstop_out() {
        let mut resync = scheduler();
        let now = Instant::now();
        resync.schedule_after_send(now);
        resync.schedule_after_send(now + Duration::from_millis(300));
        assert_eq!(resync.deadline(), Some(now + Duration::from_millis(1_100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_request_pulls_deadline_in() {
        let mut resync = scheduler();
        let now = Instant::now();
        resync.schedule_after_send(now);
        resync.request_now(now);
        assert_eq!(resync.deadline(), Some(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_gap_between_resyncs() {
        let mut resync = scheduler();
        let now = Instant::now();
        resync.request_now(now);
        assert!(resync.take_due(now));

        let soon = now + Duration::from_millis(100);
        resync.request_now(soon);
        assert_eq!(resync.deadline(), Some(now + Duration::from_millis(500)));
        assert!(!resync.take_due(soon));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_pending_resync() {
        let mut resync = scheduler();
        resync.request_now(Instant::now());
        resync.cancel();
        assert!(!resync.take_due(Instant::now()));
    }
}
