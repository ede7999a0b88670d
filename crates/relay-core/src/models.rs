//! Domain models for notification forwarding.
//!
//! `RawEvent` is what the event source produces, `FilterConfig` is the
//! externally owned settings snapshot, and `OutboundPayload` / `TestPayload`
//! are the JSON documents a webhook consumer parses.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// `event_type` value for forwarded notifications.
pub const EVENT_TYPE_NOTIFICATION_POSTED: &str = "notification_posted";

/// `event_type` value for diagnostic test sends.
pub const EVENT_TYPE_TEST: &str = "test";

/// A notification observed by the event source.
///
/// Title and body are optional because platform notifications frequently omit
/// one or both; consumers of the event treat an absent value as the empty
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Identifier of the application that posted the notification.
    pub source_id: String,
    /// Notification title, if any.
    pub title: Option<String>,
    /// Notification body text, if any.
    pub body: Option<String>,
    /// Capture time in milliseconds since the Unix epoch.
    pub observed_at_millis: i64,
}

impl RawEvent {
    /// Creates an event with both title and body present.
    pub fn new(
        source_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        observed_at_millis: i64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            title: Some(title.into()),
            body: Some(body.into()),
            observed_at_millis,
        }
    }

    /// Title, or `""` when absent.
    pub fn title_or_empty(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    /// Body, or `""` when absent.
    pub fn body_or_empty(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Snapshot of the forwarding settings.
///
/// Serialized field names are the settings store keys, so the same type is
/// used for the in-memory snapshot and the persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Master switch; nothing is forwarded while disabled.
    #[serde(rename = "listener_enabled", default = "default_enabled")]
    pub enabled: bool,
    /// Sources permitted to produce forwarded events. Empty means unrestricted.
    #[serde(rename = "allowed_packages", default)]
    pub allowed_source_ids: BTreeSet<String>,
    /// Webhook URL. Empty means deliveries are skipped.
    #[serde(rename = "webhook_url", default)]
    pub destination_url: String,
    /// Value sent in the listener token header.
    #[serde(rename = "webhook_secret", default)]
    pub shared_secret: String,
}

fn default_enabled() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            allowed_source_ids: BTreeSet::new(),
            destination_url: String::new(),
            shared_secret: String::new(),
        }
    }
}

impl FilterConfig {
    /// Creates an enabled, unrestricted config pointing at `destination_url`.
    pub fn new(destination_url: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            destination_url: destination_url.into(),
            shared_secret: shared_secret.into(),
            ..Self::default()
        }
    }

    /// Whether a webhook destination is configured.
    pub fn has_destination(&self) -> bool {
        !self.destination_url.trim().is_empty()
    }

    /// Whether the allow-list admits `source_id`.
    pub fn allows_source(&self, source_id: &str) -> bool {
        self.allowed_source_ids.is_empty() || self.allowed_source_ids.contains(source_id)
    }
}

/// Wire payload for a forwarded notification.
///
/// Field order is part of the contract: `event_type`, `package`, `title`,
/// `text`, `posted_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    /// Always `notification_posted`.
    pub event_type: String,
    /// Source identifier of the notification.
    pub package: String,
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub text: String,
    /// Capture time in milliseconds since the Unix epoch.
    pub posted_at: i64,
}

impl From<&RawEvent> for OutboundPayload {
    fn from(event: &RawEvent) -> Self {
        Self {
            event_type: EVENT_TYPE_NOTIFICATION_POSTED.to_string(),
            package: event.source_id.clone(),
            title: event.title_or_empty().to_string(),
            text: event.body_or_empty().to_string(),
            posted_at: event.observed_at_millis,
        }
    }
}

/// Wire payload for a diagnostic test send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPayload {
    /// Always `test`.
    pub event_type: String,
    /// Fixed diagnostic message.
    pub message: String,
    /// Send time in milliseconds since the Unix epoch.
    pub ts: i64,
}

/// Connection state of the event source subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No live subscription. Initial state on process start.
    #[default]
    Disconnected,
    /// The source has signalled availability.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_read_as_empty() {
        let event = RawEvent {
            source_id: "id.dana".to_string(),
            title: None,
            body: None,
            observed_at_millis: 0,
        };

        assert_eq!(event.title_or_empty(), "");
        assert_eq!(event.body_or_empty(), "");
    }

    #[test]
    fn settings_document_uses_store_keys() {
        let config: FilterConfig = serde_json::from_str(
            r#"{
                "listener_enabled": false,
                "webhook_url": "https://example.test/hook",
                "webhook_secret": "s3cr3t",
                "allowed_packages": ["id.dana"]
            }"#,
        )
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.destination_url, "https://example.test/hook");
        assert_eq!(config.shared_secret, "s3cr3t");
        assert!(config.allowed_source_ids.contains("id.dana"));
    }

    #[test]
    fn missing_keys_take_defaults() {
        let config: FilterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FilterConfig::default());
        assert!(config.enabled);
        assert!(!config.has_destination());
    }

    #[test]
    fn empty_allow_list_admits_everything() {
        let mut config = FilterConfig::default();
        assert!(config.allows_source("com.example"));

        config.allowed_source_ids.insert("id.dana".to_string());
        assert!(config.allows_source("id.dana"));
        assert!(!config.allows_source("com.example"));
    }

    #[test]
    fn connection_state_starts_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}
