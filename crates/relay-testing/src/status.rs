//! Status handler that records events for assertions.

use std::{sync::Arc, time::Duration};

use relay_core::{StatusEvent, StatusHandler};
use tokio::sync::{Mutex, Notify};

/// Records every status event it receives.
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatusHandler {
    events: Arc<Mutex<Vec<StatusEvent>>>,
    notify: Arc<Notify>,
}

impl RecordingStatusHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in publish order.
    pub async fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().await.clone()
    }

    /// Messages of recorded `Log` events.
    pub async fn log_lines(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                StatusEvent::Log { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Waits until a recorded event satisfies `predicate`.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: Fn(&StatusEvent) -> bool,
    {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.events.lock().await.iter().any(&predicate) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait::async_trait]
impl StatusHandler for RecordingStatusHandler {
    async fn handle_status(&self, event: StatusEvent) {
        self.events.lock().await.push(event);
        self.notify.notify_waiters();
    }
}
