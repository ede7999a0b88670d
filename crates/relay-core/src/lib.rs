//! Core domain models and pure pipeline stages.
//!
//! Provides the event and configuration types shared by every other crate,
//! the filter engine that decides which notifications are forwarded, the
//! canonical payload codec, the settings provider abstraction, and the
//! status event bus used to report pipeline activity to an observer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod events;
pub mod filter;
pub mod models;
pub mod settings;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{
    BroadcastStatusHandler, MulticastStatusHandler, NoOpStatusHandler, StatusEvent,
    StatusHandler,
};
pub use filter::{DropReason, FilterDecision, FilterEngine, RuleSpec, RuleTable, TriggerRule};
pub use models::{ConnectionState, FilterConfig, OutboundPayload, RawEvent, TestPayload};
pub use settings::{JsonFileSettings, MemorySettings, SettingsProvider};
pub use time::{Clock, RealClock, TestClock};
