//! Canonical JSON encoding of forwarded notifications.
//!
//! Webhook consumers parse these bytes, so the key names and order are a
//! stable contract:
//!
//! ```json
//! {"event_type":"notification_posted","package":"id.dana","title":"Pembayaran","text":"Anda berhasil menerima Rp50.000","posted_at":1000}
//! ```
//!
//! `posted_at` is the time the notification was observed, not the send time,
//! so consumers can reason about ordering even when deliveries overlap.

use bytes::Bytes;
use serde::Serialize;
use tracing::error;

use crate::{
    error::Result,
    models::{OutboundPayload, RawEvent, TestPayload, EVENT_TYPE_TEST},
};

/// Message carried by diagnostic test sends.
pub const TEST_MESSAGE: &str = "Hello from notify-relay";

/// Encodes an accepted event into its wire payload.
///
/// Absent title or body become empty strings rather than `null`.
pub fn encode(event: &RawEvent) -> Bytes {
    to_json_bytes(&OutboundPayload::from(event))
}

/// Encodes the diagnostic payload sent by a test delivery.
pub fn encode_test(ts_millis: i64) -> Bytes {
    to_json_bytes(&TestPayload {
        event_type: EVENT_TYPE_TEST.to_string(),
        message: TEST_MESSAGE.to_string(),
        ts: ts_millis,
    })
}

/// Parses a notification payload.
///
/// # Errors
///
/// Returns `CoreError::Codec` if the bytes are not a payload document.
pub fn decode(bytes: &[u8]) -> Result<OutboundPayload> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Parses a diagnostic payload.
///
/// # Errors
///
/// Returns `CoreError::Codec` if the bytes are not a test payload document.
pub fn decode_test(bytes: &[u8]) -> Result<TestPayload> {
    Ok(serde_json::from_slice(bytes)?)
}

// Payload types contain only strings and integers, which always serialize.
fn to_json_bytes<T: Serialize>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            error!(error = %e, "payload serialization failed");
            Bytes::from_static(b"{}")
        },
    }
}
