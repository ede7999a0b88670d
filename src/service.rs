//! Wiring of source, supervisor, and forwarder into a running service.

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_core::{
    BroadcastStatusHandler, Clock, FilterEngine, MulticastStatusHandler, RealClock,
    SettingsProvider, StatusEvent, StatusHandler,
};
use relay_delivery::{DeliveryClient, Forwarder};
use relay_supervisor::{AlwaysGranted, ConnectionSupervisor};
use tokio::{
    sync::{broadcast, mpsc},
    task::AbortHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};

use crate::{
    config::Config,
    source::{NdjsonSource, ReaderFactory},
    status::LogStatusHandler,
};

const STATUS_CHANNEL_CAPACITY: usize = 128;
const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// A running relay: event source, connection supervisor, and forwarder.
pub struct Service {
    config: Config,
    forwarder: Forwarder,
    supervisor: ConnectionSupervisor,
    source: Arc<NdjsonSource>,
    status: BroadcastStatusHandler,
    startup_rebind: AbortHandle,
    token: CancellationToken,
    tasks: TaskTracker,
}

impl Service {
    /// Builds every component and starts reading from `open`.
    ///
    /// The startup rebind is scheduled after `initial_rebind_delay_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules are invalid or the HTTP client cannot
    /// be built.
    pub async fn start(
        config: Config,
        settings: Arc<dyn SettingsProvider>,
        open: ReaderFactory,
    ) -> Result<Self> {
        let rules = config.rule_table()?;
        let client = DeliveryClient::new(config.to_client_config())
            .context("Failed to build delivery client")?;

        let broadcast = BroadcastStatusHandler::new(STATUS_CHANNEL_CAPACITY);
        let mut observers = MulticastStatusHandler::new();
        observers.add_subscriber(Arc::new(LogStatusHandler));
        observers.add_subscriber(Arc::new(broadcast.clone()));
        let status: Arc<dyn StatusHandler> = Arc::new(observers);
        let clock: Arc<dyn Clock> = Arc::new(RealClock::new());

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        let forwarder = Forwarder::new(
            settings.clone(),
            Arc::new(FilterEngine::new(rules)),
            client,
            status.clone(),
            clock.clone(),
        );
        let source = Arc::new(NdjsonSource::new(open, event_tx, signal_tx));
        let supervisor =
            ConnectionSupervisor::new(source.clone(), Arc::new(AlwaysGranted), status, clock)
                .with_cooldown(config.reconnect_cooldown());

        let token = CancellationToken::new();
        let tasks = TaskTracker::new();

        tasks.spawn({
            let supervisor = supervisor.clone();
            let token = token.clone();
            async move { supervisor.watch_signals(signal_rx, token).await }
        });
        tasks.spawn({
            let forwarder = forwarder.clone();
            async move { forwarder.run(event_rx).await }
        });

        tasks.spawn({
            let supervisor = supervisor.clone();
            let settings = settings.clone();
            let interval = config.settings_poll_interval();
            let token = token.clone();
            async move { supervisor.watch_enable_switch(settings, interval, token).await }
        });

        source.start().await;

        let rebind = supervisor.schedule_ensure_active(config.initial_rebind_delay(), settings);
        let startup_rebind = rebind.abort_handle();
        tasks.spawn(async move {
            match rebind.await {
                Ok(outcome) => info!(%outcome, "startup rebind finished"),
                Err(e) if e.is_cancelled() => {},
                Err(e) => warn!(error = %e, "startup rebind task failed"),
            }
        });

        info!(
            channel_capacity = config.event_channel_capacity,
            rules = config.rules.len(),
            "notify-relay started"
        );

        Ok(Self {
            config,
            forwarder,
            supervisor,
            source,
            status: broadcast,
            startup_rebind,
            token,
            tasks,
        })
    }

    /// The forwarding pipeline.
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// The connection supervisor.
    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Receives every status event published from now on.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Stops the source, then waits up to the configured timeout for
    /// in-flight deliveries.
    ///
    /// # Errors
    ///
    /// Returns an error if deliveries were still running at the timeout.
    pub async fn shutdown(self) -> Result<()> {
        info!("stopping notify-relay");

        self.startup_rebind.abort();
        self.source.stop().await;
        self.token.cancel();

        let result = self.forwarder.shutdown(self.config.shutdown_timeout()).await;

        self.tasks.close();
        self.tasks.wait().await;

        result.context("Forwarder shutdown incomplete")?;
        info!("notify-relay stopped");
        Ok(())
    }
}
