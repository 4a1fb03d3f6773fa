//! Single-flight debounce for status notifications.
//!
//! The first push opens a window; pushes inside the window replace the
//! payload without extending it. When the window closes the latest payload
//! is delivered once.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Queue `value`, replacing anything pending.
    ///
    /// Returns true if this push opened a new window.
    pub fn push(&mut self, value: T) -> bool {
        self.pending = Some(value);
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + self.window);
        true
    }

    /// When the open window closes, if one is open
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the payload if the window has closed by `now`
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Take the payload immediately and close the window
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_latest_payload() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        assert!(debouncer.push(1));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!debouncer.push(2));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!debouncer.push(3));

        assert_eq!(debouncer.take_due(Instant::now()), None);
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(debouncer.take_due(Instant::now()), Some(3));
        assert_eq!(debouncer.take_due(Instant::now()), None);
        assert!(debouncer.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_not_extended_by_later_pushes() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let opened = Instant::now();
        debouncer.push("a");
        tokio::time::advance(Duration::from_millis(250)).await;
        debouncer.push("b");
        assert_eq!(
            debouncer.deadline(),
            Some(opened + Duration::from_millis(300))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_after_delivery_opens_new_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.push(1);
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(debouncer.take_due(Instant::now()), Some(1));

        assert!(debouncer.push(2));
        assert!(debouncer.has_pending());
    }

    #[test]
    fn test_flush_delivers_immediately() {
        let mut debouncer = Debouncer::new(Duration::from_secs(60));
        debouncer.push("x");
        assert_eq!(debouncer.flush(), Some("x"));
        assert!(!debouncer.has_pending());
    }
}
