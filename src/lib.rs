//! notify-relay: filters platform notification events and forwards the
//! matching ones to a webhook.
//!
//! The binary reads events as newline-delimited JSON from standard input.
//! The building blocks live in the workspace crates:
//!
//! - `relay-core`: models, filter rules, payload codec, settings, status bus
//! - `relay-delivery`: webhook client and forwarding pipeline
//! - `relay-supervisor`: source connection state and reconnects
//!
//! This crate adds service configuration, the NDJSON source, and the wiring
//! in [`service::Service`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod service;
pub mod source;
pub mod status;

pub use config::Config;
pub use service::Service;
pub use source::{BoxedReader, NdjsonSource, ReaderFactory};
pub use status::LogStatusHandler;
