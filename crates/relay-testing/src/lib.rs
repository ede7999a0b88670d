//! Test infrastructure shared by the relay crates.
//!
//! Provides a wiremock-backed webhook, event and settings fixtures, and a
//! status handler that records what the pipeline reported so tests can
//! assert on observer output.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod http;
pub mod status;

pub use fixtures::{payment_event, promo_event, settings_for, EventBuilder};
pub use http::{unreachable_url, MockResponse, RecordedRequest, WebhookMock};
pub use status::RecordingStatusHandler;
