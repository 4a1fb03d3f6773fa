//! Foreground/background transitions.
//!
//! Going to the background asks the platform for a short execution window
//! so the session survives brief app switches. Coming back releases the
//! window and, if the session dropped meanwhile, retries immediately
//! instead of waiting out the backoff.

use std::sync::Mutex;

use ridelink_core::prelude::*;

use crate::manager::{ConnectionState, SessionHandle};

/// Platform token for a granted execution window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// OS grace-period capability. Platforms without one use
/// [`NoopExecutionWindow`].
pub trait ExecutionWindow: Send + Sync {
    /// Ask for extra run time; `None` if the platform refused
    fn request_execution_window(&self) -> Option<WindowId>;

    fn release_execution_window(&self, id: WindowId);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutionWindow;

impl ExecutionWindow for NoopExecutionWindow {
    fn request_execution_window(&self) -> Option<WindowId> {
        None
    }

    fn release_execution_window(&self, _id: WindowId) {}
}

pub struct LifecycleAdapter<W: ExecutionWindow> {
    session: SessionHandle,
    window: W,
    active: Mutex<Option<WindowId>>,
}

impl<W: ExecutionWindow> LifecycleAdapter<W> {
    pub fn new(session: SessionHandle, window: W) -> Self {
        Self {
            session,
            window,
            active: Mutex::new(None),
        }
    }

    pub fn did_enter_background(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.is_some() {
            return;
        }
        *active = self.window.request_execution_window();
        match *active {
            Some(id) => debug!("Lifecycle: background window {:?} granted", id),
            None => debug!("Lifecycle: no background window available"),
        }
    }

    /// Release the window, then reconnect right away if the session dropped
    pub async fn will_enter_foreground(&self) -> Result<()> {
        self.release();

        match self.session.connection_state() {
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Disconnected
            | ConnectionState::Idle => Ok(()),
            state => {
                info!("Lifecycle: foregrounded while {:?}, resuming now", state);
                self.session.resume_now().await
            }
        }
    }

    /// The platform is about to revoke the window
    pub fn window_expired(&self) {
        self.release();
    }

    pub fn has_window(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn release(&self) {
        let taken = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(id) = taken {
            debug!("Lifecycle: releasing background window {:?}", id);
            self.window.release_execution_window(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SessionCommand;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingWindow {
        next: AtomicU64,
        released: Mutex<Vec<WindowId>>,
    }

    impl ExecutionWindow for Arc<CountingWindow> {
        fn request_execution_window(&self) -> Option<WindowId> {
            Some(WindowId(self.next.fetch_add(1, Ordering::SeqCst) + 1))
        }

        fn release_execution_window(&self, id: WindowId) {
            self.released.lock().unwrap().push(id);
        }
    }

    #[tokio::test]
    async fn test_window_is_released_on_foreground() {
        let (session, mut probe) = SessionHandle::new_for_test();
        probe.state.send_replace(ConnectionState::Connected);
        let window = Arc::new(CountingWindow::default());
        let adapter = LifecycleAdapter::new(session, Arc::clone(&window));

        adapter.did_enter_background();
        adapter.did_enter_background();
        assert!(adapter.has_window());

        adapter.will_enter_foreground().await.unwrap();
        assert!(!adapter.has_window());
        assert_eq!(*window.released.lock().unwrap(), vec![WindowId(1)]);
        assert!(probe.commands.try_recv().is_err(), "connected: no resume");
    }

    #[tokio::test]
    async fn test_foreground_while_reconnecting_resumes_immediately() {
        let (session, mut probe) = SessionHandle::new_for_test();
        probe.state.send_replace(ConnectionState::Reconnecting {
            attempt: 3,
            delay: Duration::from_secs(4),
        });
        let adapter = LifecycleAdapter::new(session, NoopExecutionWindow);

        adapter.did_enter_background();
        adapter.will_enter_foreground().await.unwrap();

        assert!(matches!(
            probe.commands.recv().await,
            Some(SessionCommand::ResumeNow)
        ));
    }

    #[tokio::test]
    async fn test_foreground_after_explicit_disconnect_does_nothing() {
        let (session, mut probe) = SessionHandle::new_for_test();
        probe.state.send_replace(ConnectionState::Disconnected);
        let adapter = LifecycleAdapter::new(session, NoopExecutionWindow);

        adapter.will_enter_foreground().await.unwrap();
        assert!(probe.commands.try_recv().is_err());
    }

    #[test]
    fn test_expired_window_is_released() {
        let (session, _probe) = SessionHandle::new_for_test();
        let window = Arc::new(CountingWindow::default());
        let adapter = LifecycleAdapter::new(session, Arc::clone(&window));

        adapter.did_enter_background();
        adapter.window_expired();
        adapter.window_expired();
        assert_eq!(*window.released.lock().unwrap(), vec![WindowId(1)]);
    }
}
