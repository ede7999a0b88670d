//! Status observer that writes events to the tracing log.

use async_trait::async_trait;
use relay_core::{StatusEvent, StatusHandler};
use tracing::info;

/// Logs every status event at info level under the `notify_relay::status`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusHandler;

#[async_trait]
impl StatusHandler for LogStatusHandler {
    async fn handle_status(&self, event: StatusEvent) {
        match event {
            StatusEvent::Connected => info!(target: "notify_relay::status", "listener connected"),
            StatusEvent::Disconnected => {
                info!(target: "notify_relay::status", "listener disconnected");
            },
            StatusEvent::NotificationReceived { title, text } => {
                info!(target: "notify_relay::status", %title, %text, "notification received");
            },
            StatusEvent::Log { message } => info!(target: "notify_relay::status", "{message}"),
        }
    }
}
