//! Webhook delivery for accepted notifications.
//!
//! This crate owns the outbound half of the relay: the HTTP client that posts
//! one payload to the configured webhook, and the `Forwarder` that consumes
//! raw events from a channel, runs them through the filter and codec, and
//! dispatches each accepted event as an independent delivery task.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   mpsc   ┌───────────┐  spawn  ┌────────────────┐
//! │ Event Source │ ───────▶ │ Forwarder │ ──────▶ │ DeliveryClient │ ──▶ webhook
//! └──────────────┘          └───────────┘         └────────────────┘
//!                                 │ snapshot per event
//!                                 ▼
//!                         ┌──────────────────┐
//!                         │ SettingsProvider │
//!                         └──────────────────┘
//! ```
//!
//! Deliveries are fire-and-forget: there is no retry and no backlog. A failed
//! delivery is logged and reported to the status observer, and the pipeline
//! moves on to the next event immediately because deliveries never run on
//! the receive loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relay_core::{FilterConfig, FilterEngine, MemorySettings, NoOpStatusHandler, RealClock};
//! use relay_delivery::{client::DeliveryClient, Forwarder};
//!
//! # async fn example() -> relay_delivery::Result<()> {
//! let settings = Arc::new(MemorySettings::new(FilterConfig::new("https://example.test/hook", "s3cr3t")));
//! let forwarder = Forwarder::new(
//!     settings,
//!     Arc::new(FilterEngine::default()),
//!     DeliveryClient::with_defaults()?,
//!     Arc::new(NoOpStatusHandler::new()),
//!     Arc::new(RealClock::new()),
//! );
//!
//! let (sender, receiver) = tokio::sync::mpsc::channel(256);
//! tokio::spawn({
//!     let forwarder = forwarder.clone();
//!     async move { forwarder.run(receiver).await }
//! });
//! # drop(sender);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod pipeline;

pub use client::{ClientConfig, DeliveryClient, DeliveryOutcome, LISTENER_TOKEN_HEADER};
pub use error::{DeliveryError, Result, TimeoutPhase};
pub use pipeline::{Forwarder, ForwarderStats};

/// Default capacity of the event channel feeding the forwarder.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
