//! Connection supervision for the notification event source.
//!
//! Tracks whether the platform source is delivering events and drives it
//! back to an active subscription on request.
//!
//! # State Machine
//!
//! ```text
//!                  on_available / Available
//!   ┌──────────────┐ ───────────────────────▶ ┌──────────────┐
//!   │ DISCONNECTED │                          │  CONNECTED   │
//!   │  (initial)   │ ◀─────────────────────── │              │
//!   └──────────────┘     on_lost / Lost       └──────────────┘
//! ```
//!
//! Reconnects run one at a time. A request that arrives while one is running
//! returns `AlreadyInProgress`; one that arrives within the cooldown after a
//! reconnect finished returns `Coalesced`.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relay_core::{FilterConfig, NoOpStatusHandler, RealClock};
//! use relay_supervisor::{AlwaysGranted, ConnectionSupervisor, EventSource};
//!
//! # async fn example(source: Arc<dyn EventSource>) {
//! let supervisor = ConnectionSupervisor::new(
//!     source,
//!     Arc::new(AlwaysGranted),
//!     Arc::new(NoOpStatusHandler::new()),
//!     Arc::new(RealClock::new()),
//! );
//!
//! let outcome = supervisor.ensure_active(&FilterConfig::default()).await;
//! println!("reconnect: {outcome}");
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod source;
pub mod supervisor;

pub use error::{Result, SupervisorError};
pub use source::{AccessProbe, AlwaysGranted, EventSource, SourceSignal};
pub use supervisor::{
    ConnectionSupervisor, ReconnectOutcome, DEFAULT_INITIAL_REBIND_DELAY,
    DEFAULT_RECONNECT_COOLDOWN,
};
