//! Status events for observers of the forwarding pipeline.
//!
//! The pipeline and the connection supervisor report what they are doing
//! through a `StatusHandler` instead of writing to any display directly. An
//! observer (a log view, a status line, a test) subscribes by supplying a
//! handler.
//!
//! ```text
//! ┌──────────────┐   StatusEvent   ┌───────────────────────┐
//! │ Forwarder    │ ──────────────▶ │ MulticastStatusHandler│
//! │ Supervisor   │                 └───────────────────────┘
//! └──────────────┘                        │ fan-out
//!                                         ▼
//!                          ┌──────────────────────────────┐
//!                          │ BroadcastStatusHandler       │
//!                          │ (drops when nobody listens)  │
//!                          └──────────────────────────────┘
//! ```
//!
//! Delivery to observers is best-effort. Handlers never report errors back
//! and events published while nobody is subscribed are discarded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::ConnectionState;

/// Notifications published to status observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    /// The event source subscription became live.
    Connected,

    /// The event source subscription was lost.
    Disconnected,

    /// A notification passed the filter and is being forwarded.
    NotificationReceived {
        /// Notification title, empty if absent.
        title: String,
        /// Notification body, empty if absent.
        text: String,
    },

    /// Free-form operator log line.
    Log {
        /// Message text.
        message: String,
    },
}

impl StatusEvent {
    /// Creates a log line event.
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log { message: message.into() }
    }
}

impl From<ConnectionState> for StatusEvent {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Disconnected => Self::Disconnected,
        }
    }
}

/// Receives status events.
///
/// Implementations must not block the caller for long and must swallow
/// their own failures: the publisher is on the event path.
#[async_trait::async_trait]
pub trait StatusHandler: Send + Sync + std::fmt::Debug {
    /// Handles a status event.
    async fn handle_status(&self, event: StatusEvent);
}

/// Handler that discards every event.
#[derive(Debug, Default)]
pub struct NoOpStatusHandler;

impl NoOpStatusHandler {
    /// Creates a new no-op handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl StatusHandler for NoOpStatusHandler {
    async fn handle_status(&self, _event: StatusEvent) {}
}

/// Forwards each event to every registered subscriber concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastStatusHandler {
    handlers: Vec<Arc<dyn StatusHandler>>,
}

impl MulticastStatusHandler {
    /// Creates a multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Adds a subscriber.
    pub fn add_subscriber(&mut self, handler: Arc<dyn StatusHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl StatusHandler for MulticastStatusHandler {
    async fn handle_status(&self, event: StatusEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_status(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}

/// Publishes events on a `tokio::sync::broadcast` channel.
///
/// Observers call [`BroadcastStatusHandler::subscribe`] to get a receiver.
/// With no live receivers the event is dropped; a slow receiver that falls
/// more than `capacity` events behind skips the oldest ones.
#[derive(Debug, Clone)]
pub struct BroadcastStatusHandler {
    sender: broadcast::Sender<StatusEvent>,
}

impl BroadcastStatusHandler {
    /// Creates a broadcast handler buffering up to `capacity` events per
    /// receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Number of currently registered observers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait::async_trait]
impl StatusHandler for BroadcastStatusHandler {
    async fn handle_status(&self, event: StatusEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }
}
