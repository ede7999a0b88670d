//! Event and settings fixtures.

use relay_core::{FilterConfig, RawEvent};

/// Builder for test notification events.
///
/// Defaults describe a DANA payment-received notification observed at
/// timestamp 1000.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    source_id: String,
    title: Option<String>,
    body: Option<String>,
    observed_at_millis: i64,
}

impl EventBuilder {
    /// Creates a builder with payment-received defaults.
    pub fn new() -> Self {
        Self {
            source_id: "id.dana".to_string(),
            title: Some("Pembayaran".to_string()),
            body: Some("Anda berhasil menerima Rp50.000".to_string()),
            observed_at_millis: 1000,
        }
    }

    /// Sets the source identifier.
    pub fn source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Removes the title.
    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    /// Removes the body.
    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }

    /// Sets the observation timestamp.
    pub fn observed_at(mut self, millis: i64) -> Self {
        self.observed_at_millis = millis;
        self
    }

    /// Builds the event.
    pub fn build(self) -> RawEvent {
        RawEvent {
            source_id: self.source_id,
            title: self.title,
            body: self.body,
            observed_at_millis: self.observed_at_millis,
        }
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Payment-received event from `source_id` that passes the default rule.
pub fn payment_event(source_id: &str) -> RawEvent {
    EventBuilder::new().source(source_id).build()
}

/// Event from `source_id` that no default rule matches.
pub fn promo_event(source_id: &str) -> RawEvent {
    EventBuilder::new().source(source_id).title("Promo").body("Cashback 10% hari ini").build()
}

/// Enabled, unrestricted settings pointing at `url`.
pub fn settings_for(url: impl Into<String>, secret: impl Into<String>) -> FilterConfig {
    FilterConfig::new(url, secret)
}
