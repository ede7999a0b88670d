//! Connection state tracking and serialized reconnects.

use std::{
    any::Any,
    fmt,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::FutureExt;
use relay_core::{Clock, ConnectionState, FilterConfig, SettingsProvider, StatusEvent, StatusHandler};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::source::{AccessProbe, EventSource, SourceSignal};

/// Window after a finished reconnect during which new requests are coalesced.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(2);

/// Delay before the rebind attempted at service start.
pub const DEFAULT_INITIAL_REBIND_DELAY: Duration = Duration::from_millis(1200);

/// Result of a reconnect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The source was resubscribed.
    Reconnected,
    /// Another reconnect was running; this request did nothing.
    AlreadyInProgress,
    /// A reconnect finished within the cooldown; this request did nothing.
    Coalesced,
    /// Forwarding is disabled in settings.
    Disabled,
    /// Event access is not granted.
    AccessDenied,
    /// The source failed to resubscribe.
    Failed(String),
}

impl ReconnectOutcome {
    /// Whether a resubscribe was actually attempted.
    pub fn attempted(&self) -> bool {
        matches!(self, Self::Reconnected | Self::Failed(_))
    }
}

impl fmt::Display for ReconnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnected => write!(f, "reconnected"),
            Self::AlreadyInProgress => write!(f, "already_in_progress"),
            Self::Coalesced => write!(f, "coalesced"),
            Self::Disabled => write!(f, "disabled"),
            Self::AccessDenied => write!(f, "access_denied"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Supervises the event source connection.
///
/// Clones share state, so one clone can watch signals while another serves
/// reconnect requests.
#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    source: Arc<dyn EventSource>,
    access: Arc<dyn AccessProbe>,
    status: Arc<dyn StatusHandler>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    last_reconnect: Arc<Mutex<Option<Instant>>>,
}

impl ConnectionSupervisor {
    /// Creates a supervisor in the `Disconnected` state with the default
    /// cooldown.
    pub fn new(
        source: Arc<dyn EventSource>,
        access: Arc<dyn AccessProbe>,
        status: Arc<dyn StatusHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            source,
            access,
            status,
            clock,
            cooldown: DEFAULT_RECONNECT_COOLDOWN,
            state: Arc::new(state),
            last_reconnect: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets the reconnect cooldown window.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Records that the source is delivering events.
    pub async fn on_available(&self) {
        self.transition(ConnectionState::Connected).await;
    }

    /// Records that the source stopped delivering events.
    pub async fn on_lost(&self) {
        self.transition(ConnectionState::Disconnected).await;
    }

    /// Applies source signals until the channel closes or `token` is
    /// cancelled.
    pub async fn watch_signals(
        &self,
        mut signals: mpsc::Receiver<SourceSignal>,
        token: CancellationToken,
    ) {
        loop {
            let signal = tokio::select! {
                () = token.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            match signal {
                SourceSignal::Available => self.on_available().await,
                SourceSignal::Lost => self.on_lost().await,
            }
        }
        debug!("stopped watching source signals");
    }

    /// Resubscribes the source if forwarding is enabled and access is
    /// granted.
    pub async fn ensure_active(&self, settings: &FilterConfig) -> ReconnectOutcome {
        if !settings.enabled {
            debug!("forwarding disabled, not reconnecting");
            return ReconnectOutcome::Disabled;
        }

        if !self.access.has_access().await {
            warn!("event access not granted, not reconnecting");
            self.publish_log("Notification access not granted").await;
            return ReconnectOutcome::AccessDenied;
        }

        self.reconnect("ensure_active").await
    }

    /// Operator-initiated reconnect. Ignores the enable switch and the
    /// access probe.
    pub async fn request_reconnect(&self) -> ReconnectOutcome {
        self.reconnect("manual").await
    }

    /// Runs [`ensure_active`](Self::ensure_active) after `delay`, with the
    /// settings current at that moment.
    pub fn schedule_ensure_active(
        &self,
        delay: Duration,
        settings: Arc<dyn SettingsProvider>,
    ) -> JoinHandle<ReconnectOutcome> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let snapshot = settings.snapshot().await;
            supervisor.ensure_active(&snapshot).await
        })
    }

    /// Polls the settings every `interval` and runs
    /// [`ensure_active`](Self::ensure_active) whenever the enable switch
    /// turns on. Returns when `token` is cancelled.
    pub async fn watch_enable_switch(
        &self,
        settings: Arc<dyn SettingsProvider>,
        interval: Duration,
        token: CancellationToken,
    ) {
        let mut was_enabled = settings.snapshot().await.enabled;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(interval) => {},
            }

            let snapshot = settings.snapshot().await;
            if snapshot.enabled && !was_enabled {
                info!("forwarding enabled, reactivating listener");
                let outcome = self.ensure_active(&snapshot).await;
                debug!(%outcome, "enable switch reconnect finished");
            }
            was_enabled = snapshot.enabled;
        }
        debug!("stopped watching the enable switch");
    }

    async fn reconnect(&self, trigger: &'static str) -> ReconnectOutcome {
        let Ok(mut last_reconnect) = self.last_reconnect.try_lock() else {
            debug!(trigger, "reconnect already in progress");
            return ReconnectOutcome::AlreadyInProgress;
        };

        if let Some(finished_at) = *last_reconnect {
            let elapsed = self.clock.now().saturating_duration_since(finished_at);
            if elapsed < self.cooldown {
                debug!(
                    trigger,
                    elapsed_ms = elapsed.as_millis(),
                    cooldown_ms = self.cooldown.as_millis(),
                    "reconnect coalesced"
                );
                return ReconnectOutcome::Coalesced;
            }
        }

        info!(trigger, "resubscribing event source");
        let result = AssertUnwindSafe(self.source.resubscribe()).catch_unwind().await;
        *last_reconnect = Some(self.clock.now());
        drop(last_reconnect);

        match result {
            Ok(Ok(())) => {
                info!(trigger, "event source resubscribed");
                self.publish_log("Listener reconnect requested").await;
                ReconnectOutcome::Reconnected
            },
            Ok(Err(e)) => {
                let reason = e.to_string();
                warn!(trigger, error = %reason, "event source resubscribe failed");
                self.publish_log(format!("Reconnect failed: {reason}")).await;
                ReconnectOutcome::Failed(reason)
            },
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                error!(trigger, panic = %reason, "event source panicked during resubscribe");
                self.publish_log(format!("Reconnect failed: {reason}")).await;
                ReconnectOutcome::Failed(reason)
            },
        }
    }

    async fn transition(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if !changed {
            debug!(state = %next, "source signal matches current state");
            return;
        }

        info!(state = %next, "event source connection changed");
        self.status.handle_status(StatusEvent::from(next)).await;
    }

    async fn publish_log(&self, message: impl Into<String>) {
        self.status.handle_status(StatusEvent::log(message)).await;
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return format!("panic: {message}");
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return format!("panic: {message}");
    }
    "panic".to_string()
}
