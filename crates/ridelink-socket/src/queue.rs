//! Outbound message queue.
//!
//! Messages are sent strictly in submission order. A message leaves the
//! queue only after the transport reports a successful send; a failed send
//! leaves it at the front so it is retried first once the session is back.

use std::collections::VecDeque;
use std::fmt;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use ridelink_core::prelude::*;

use crate::WsStream;

/// Callback invoked with the outcome of every send attempt for a message
pub type Completion = Box<dyn FnMut(std::result::Result<(), &Error>) + Send>;

/// Anything that can carry frames to the peer
#[trait_variant::make(FrameSink: Send)]
pub trait LocalFrameSink {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Transport-level liveness probe
    async fn send_ping(&mut self) -> Result<()>;
}

impl FrameSink for SplitSink<WsStream, WsMessage> {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| Error::send(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.send(WsMessage::Ping(Default::default()))
            .await
            .map_err(|e| Error::send(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// QueuedMessage
// ---------------------------------------------------------------------------

/// A serialized protocol message awaiting delivery
pub struct QueuedMessage {
    payload: String,
    completion: Option<Completion>,
}

impl QueuedMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            completion: None,
        }
    }

    /// Attach a callback that observes each send attempt.
    ///
    /// The callback may run more than once: once with `Err` for every failed
    /// attempt, and a final time with `Ok(())` when the message is sent.
    pub fn with_completion<F>(mut self, completion: F) -> Self
    where
        F: FnMut(std::result::Result<(), &Error>) + Send + 'static,
    {
        self.completion = Some(Box::new(completion));
        self
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Refuse the message without queueing it
    pub(crate) fn reject(mut self, reason: &Error) {
        self.notify(Err(reason));
    }

    fn notify(&mut self, outcome: std::result::Result<(), &Error>) {
        if let Some(completion) = self.completion.as_mut() {
            completion(outcome);
        }
    }
}

impl fmt::Debug for QueuedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedMessage")
            .field("payload", &self.payload)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// OutboundQueue
// ---------------------------------------------------------------------------

/// FIFO of messages waiting for an open session
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<QueuedMessage>,
    /// Set while a drain is running
    in_flight: bool,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: QueuedMessage) {
        self.pending.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Send queued messages in order until the queue is empty or a send fails.
    ///
    /// Returns the number of messages sent. A call made while a drain is
    /// already running is a no-op. On failure the failed message stays at the
    /// front, its completion observes the error, and the error is returned so
    /// the caller can run failure handling.
    pub async fn process<S: FrameSink>(&mut self, sink: &mut S) -> Result<usize> {
        if self.in_flight {
            return Ok(0);
        }
        self.in_flight = true;

        let mut sent = 0;
        loop {
            let Some(payload) = self.pending.front().map(|m| m.payload.clone()) else {
                break;
            };
            match sink.send_text(payload).await {
                Ok(()) => {
                    if let Some(mut message) = self.pending.pop_front() {
                        message.notify(Ok(()));
                    }
                    sent += 1;
                }
                Err(err) => {
                    if let Some(message) = self.pending.front_mut() {
                        message.notify(Err(&err));
                    }
                    self.in_flight = false;
                    return Err(err);
                }
            }
        }

        self.in_flight = false;
        Ok(sent)
    }

    /// Allow draining again after a drain was abandoned mid-send
    pub fn rearm(&mut self) {
        self.in_flight = false;
    }

    /// Drop every queued message, notifying each with `reason`.
    ///
    /// Returns the number of messages dropped.
    pub fn clear(&mut self, reason: &Error) -> usize {
        let dropped = self.pending.len();
        for mut message in self.pending.drain(..) {
            message.notify(Err(reason));
        }
        self.in_flight = false;
        dropped
    }
}
