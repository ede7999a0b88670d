//! Forwarding pipeline from the event channel to the webhook.
//!
//! The `Forwarder` receive loop does only cheap, synchronous work inline:
//! settings snapshot, filter decision, and payload encoding. Every accepted
//! event becomes its own delivery task on a `TaskTracker`, so a slow or
//! unreachable webhook delays nothing but that one delivery, bounded by the
//! client timeouts. Deliveries are not ordered with respect to each other.

use std::{sync::Arc, time::Duration};

use relay_core::{
    codec, Clock, FilterConfig, FilterDecision, FilterEngine, RawEvent, SettingsProvider,
    StatusEvent, StatusHandler,
};
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    client::{DeliveryClient, DeliveryOutcome},
    error::{DeliveryError, Result},
};

/// Counters for pipeline monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Events taken off the channel.
    pub events_received: u64,
    /// Events accepted by the filter.
    pub events_forwarded: u64,
    /// Events rejected by the filter.
    pub events_dropped: u64,
    /// Deliveries the webhook accepted.
    pub deliveries_succeeded: u64,
    /// Deliveries that failed (network, timeout, non-2xx).
    pub deliveries_failed: u64,
    /// Deliveries skipped for lack of a destination.
    pub deliveries_skipped: u64,
    /// Deliveries currently running.
    pub in_flight_deliveries: u64,
}

/// Consumes raw events and forwards the accepted ones.
///
/// Cheap to clone; clones share settings, client, stats, and the task
/// tracker.
#[derive(Debug, Clone)]
pub struct Forwarder {
    settings: Arc<dyn SettingsProvider>,
    filter: Arc<FilterEngine>,
    client: DeliveryClient,
    status: Arc<dyn StatusHandler>,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<ForwarderStats>>,
    tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl Forwarder {
    /// Creates a forwarder.
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        filter: Arc<FilterEngine>,
        client: DeliveryClient,
        status: Arc<dyn StatusHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            filter,
            client,
            status,
            clock,
            stats: Arc::new(RwLock::new(ForwarderStats::default())),
            tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Token that stops the receive loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Receives events until the channel closes or the forwarder is shut
    /// down. In-flight deliveries keep running after this returns.
    pub async fn run(&self, mut events: mpsc::Receiver<RawEvent>) {
        info!("forwarder starting");

        loop {
            let event = tokio::select! {
                () = self.cancellation_token.cancelled() => {
                    info!("forwarder received shutdown signal");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("event channel closed");
                        break;
                    }
                },
            };

            // Handle is dropped: the tracker owns the task.
            let _ = self.dispatch(event).await;
        }

        info!("forwarder stopped");
    }

    /// Filters one event and, if accepted, spawns its delivery.
    ///
    /// Returns the handle of the spawned delivery, or `None` if the event was
    /// dropped. Settings are read at this moment, so a change made before
    /// the call applies to this event.
    pub async fn dispatch(&self, event: RawEvent) -> Option<JoinHandle<DeliveryOutcome>> {
        let settings = self.settings.snapshot().await;
        self.stats.write().await.events_received += 1;

        if let FilterDecision::Drop(reason) = self.filter.evaluate(&event, &settings) {
            debug!(source_id = %event.source_id, reason = %reason, "notification dropped");
            self.stats.write().await.events_dropped += 1;
            return None;
        }

        info!(
            source_id = %event.source_id,
            observed_at = event.observed_at_millis,
            "notification matched, forwarding"
        );

        self.status
            .handle_status(StatusEvent::NotificationReceived {
                title: event.title_or_empty().to_string(),
                text: event.body_or_empty().to_string(),
            })
            .await;

        let payload = codec::encode(&event);

        {
            let mut stats = self.stats.write().await;
            stats.events_forwarded += 1;
            stats.in_flight_deliveries += 1;
        }

        let forwarder = self.clone();
        let source_id = event.source_id;
        Some(self.tracker.spawn(async move {
            let outcome = forwarder.client.deliver(payload, &settings).await;
            forwarder.record_outcome(&source_id, &settings, &outcome).await;
            outcome
        }))
    }

    /// Sends the diagnostic payload to the currently configured webhook.
    ///
    /// Bypasses the filter and the enable switch. Progress and result are
    /// reported to the status observer.
    pub async fn send_test(&self) -> DeliveryOutcome {
        let settings = self.settings.snapshot().await;

        if !settings.has_destination() {
            info!("test delivery aborted, no webhook URL configured");
            self.publish_log("Test aborted: webhook URL is empty").await;
            return DeliveryOutcome::Skipped;
        }

        self.publish_log(format!("TEST -> POST {}", settings.destination_url)).await;

        let outcome = self.client.send_test(&settings, self.clock.now_millis()).await;

        let message = match &outcome {
            DeliveryOutcome::Delivered { status_code } => format!("TEST OK: HTTP {status_code}"),
            DeliveryOutcome::Failed(error) => format!("TEST FAILED: {error}"),
            DeliveryOutcome::Skipped => "Test aborted: webhook URL is empty".to_string(),
        };
        info!(outcome = outcome.label(), "test delivery finished");
        self.publish_log(message).await;

        outcome
    }

    /// Returns a copy of the current counters.
    pub async fn stats(&self) -> ForwarderStats {
        self.stats.read().await.clone()
    }

    /// Stops receiving and waits up to `timeout` for in-flight deliveries.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShutdownTimeout` if deliveries are still
    /// running when the timeout expires. They are not aborted and finish on
    /// their own client timeouts.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        info!(
            in_flight = self.tracker.len(),
            timeout_seconds = timeout.as_secs(),
            "shutting down forwarder"
        );

        self.cancellation_token.cancel();
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            let in_flight = self.tracker.len();
            warn!(in_flight, "forwarder shutdown timed out with deliveries in flight");
            return Err(DeliveryError::ShutdownTimeout { timeout, in_flight });
        }

        info!("forwarder shutdown completed");
        Ok(())
    }

    async fn record_outcome(
        &self,
        source_id: &str,
        settings: &FilterConfig,
        outcome: &DeliveryOutcome,
    ) {
        {
            let mut stats = self.stats.write().await;
            stats.in_flight_deliveries = stats.in_flight_deliveries.saturating_sub(1);
            match outcome {
                DeliveryOutcome::Delivered { .. } => stats.deliveries_succeeded += 1,
                DeliveryOutcome::Failed(_) => stats.deliveries_failed += 1,
                DeliveryOutcome::Skipped => stats.deliveries_skipped += 1,
            }
        }

        let message = match outcome {
            DeliveryOutcome::Delivered { status_code } => {
                debug!(source_id, status = status_code, "delivery completed");
                format!("Webhook delivered: HTTP {status_code}")
            },
            DeliveryOutcome::Failed(error) => {
                warn!(
                    source_id,
                    url = %settings.destination_url,
                    category = %crate::error::ErrorCategory::from(error),
                    error = %error,
                    "delivery failed, event dropped"
                );
                format!("Webhook delivery failed: {error}")
            },
            DeliveryOutcome::Skipped => {
                warn!(source_id, "webhook URL not configured, event dropped");
                "Webhook URL is empty, delivery skipped".to_string()
            },
        };

        self.publish_log(message).await;
    }

    async fn publish_log(&self, message: impl Into<String>) {
        self.status.handle_status(StatusEvent::log(message)).await;
    }
}
