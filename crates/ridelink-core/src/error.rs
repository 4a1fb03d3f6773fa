//! Error types for the ride session stack, grouped by failure class

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Session and protocol errors organized by layer
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors (fatal for the current connect, never retried)
    // ─────────────────────────────────────────────────────────────
    #[error("No bearer token available")]
    MissingToken,

    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Transport Errors (retried through the reconnection policy)
    // ─────────────────────────────────────────────────────────────
    #[error("Connection failed: {message}")]
    Connect { message: String },

    #[error("Connection timed out after {secs}s")]
    ConnectTimeout { secs: u64 },

    #[error("Send failed: {message}")]
    Send { message: String },

    #[error("Receive failed: {message}")]
    Receive { message: String },

    #[error("Heartbeat failed: {message}")]
    Heartbeat { message: String },

    #[error("Connection closed by peer (code {code:?})")]
    ClosedByPeer { code: Option<u16> },

    #[error("No frame received for {secs}s")]
    IdleTimeout { secs: u64 },

    #[error("failed to reconnect after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Session disconnected")]
    Disconnected,

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors (logged and skipped)
    // ─────────────────────────────────────────────────────────────
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ─────────────────────────────────────────────────────────────
    // Domain Errors
    // ─────────────────────────────────────────────────────────────
    #[error("REST request failed: {message}")]
    Rest { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }

    pub fn receive(message: impl Into<String>) -> Self {
        Self::Receive {
            message: message.into(),
        }
    }

    pub fn heartbeat(message: impl Into<String>) -> Self {
        Self::Heartbeat {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn rest(message: impl Into<String>) -> Self {
        Self::Rest {
            message: message.into(),
        }
    }

    /// Errors caused by local setup rather than the network. These end the
    /// current connect attempt and are never retried automatically.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingToken | Error::InvalidEndpoint { .. } | Error::Config { .. }
        )
    }

    /// Errors that the reconnection policy retries
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. }
                | Error::ConnectTimeout { .. }
                | Error::Send { .. }
                | Error::Receive { .. }
                | Error::Heartbeat { .. }
                | Error::ClosedByPeer { .. }
                | Error::IdleTimeout { .. }
        )
    }

    /// Check if this is a single-frame protocol error
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol { .. } | Error::Json(_))
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
