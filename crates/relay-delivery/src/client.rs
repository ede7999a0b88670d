//! HTTP client for webhook delivery with bounded timeouts.
//!
//! One call to [`DeliveryClient::deliver`] is one POST attempt. The client
//! never retries; the caller gets a `DeliveryOutcome` and decides what to
//! log. The underlying `reqwest::Client` holds the connection pool and is
//! shared by every clone, so concurrent deliveries reuse connections without
//! any other shared state.

use std::time::{Duration, Instant};

use bytes::Bytes;
use relay_core::{codec, FilterConfig};
use reqwest::{header::CONTENT_TYPE, Response};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::error::{DeliveryError, Result, TimeoutPhase};

/// Header carrying the shared secret.
pub const LISTENER_TOKEN_HEADER: &str = "X-Listener-Token";

/// Upper bound on the total duration of one delivery.
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on establishing the connection.
pub const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single read from the response.
pub const MAX_READ_TIMEOUT: Duration = Duration::from_secs(15);

const MAX_LOGGED_BODY: usize = 1024;

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Budget for the whole request, connect to last byte.
    pub call_timeout: Duration,
    /// Budget for establishing the connection.
    pub connect_timeout: Duration,
    /// Budget for each read of the response.
    pub read_timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: MAX_CALL_TIMEOUT,
            connect_timeout: MAX_CONNECT_TIMEOUT,
            read_timeout: MAX_READ_TIMEOUT,
            user_agent: concat!("notify-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Returns the config with every timeout capped at its upper bound.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            call_timeout: self.call_timeout.min(MAX_CALL_TIMEOUT),
            connect_timeout: self.connect_timeout.min(MAX_CONNECT_TIMEOUT),
            read_timeout: self.read_timeout.min(MAX_READ_TIMEOUT),
            user_agent: self.user_agent,
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The webhook accepted the payload with a 2xx status.
    Delivered {
        /// HTTP status code
        status_code: u16,
    },
    /// The attempt failed; no retry follows.
    Failed(DeliveryError),
    /// No destination configured, nothing was sent.
    Skipped,
}

impl DeliveryOutcome {
    /// Whether the webhook accepted the payload.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Short label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Response from the webhook.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated for logging.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the status was 2xx.
    pub is_success: bool,
}

/// HTTP client for posting payloads to the configured webhook.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client. Timeouts are clamped to the delivery
    /// bounds.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = config.clamped();
        let client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Effective configuration after clamping.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Posts an encoded payload to the destination in `settings`.
    ///
    /// Returns `Skipped` without touching the network when no destination is
    /// configured. Never returns an error; failures are reported as
    /// `DeliveryOutcome::Failed`.
    pub async fn deliver(&self, payload: Bytes, settings: &FilterConfig) -> DeliveryOutcome {
        if !settings.has_destination() {
            tracing::debug!("no webhook URL configured, skipping delivery");
            return DeliveryOutcome::Skipped;
        }

        match self.post(settings.destination_url.trim(), &settings.shared_secret, payload).await {
            Ok(response) if response.is_success => {
                DeliveryOutcome::Delivered { status_code: response.status_code }
            },
            Ok(response) => DeliveryOutcome::Failed(DeliveryError::http_status(
                response.status_code,
                response.body,
            )),
            Err(error) => DeliveryOutcome::Failed(error),
        }
    }

    /// Sends the diagnostic test payload stamped with `ts_millis`.
    ///
    /// Bypasses the filter but otherwise follows the same rules as
    /// [`deliver`](Self::deliver).
    pub async fn send_test(&self, settings: &FilterConfig, ts_millis: i64) -> DeliveryOutcome {
        self.deliver(codec::encode_test(ts_millis), settings).await
    }

    async fn post(&self, url: &str, secret: &str, body: Bytes) -> Result<DeliveryResponse> {
        let start_time = Instant::now();
        let span = info_span!("webhook_delivery", delivery_id = %Uuid::new_v4(), url = %url);

        async move {
            tracing::debug!(payload_size = body.len(), "starting webhook delivery");

            let request = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(LISTENER_TOKEN_HEADER, secret)
                .body(body);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);
                    return Err(self.categorize(&e));
                },
            };

            let delivery_response = Self::parse_response(response, start_time).await;

            if delivery_response.is_success {
                tracing::info!(
                    status = delivery_response.status_code,
                    duration_ms = delivery_response.duration.as_millis(),
                    "webhook delivered"
                );
            } else {
                tracing::warn!(
                    status = delivery_response.status_code,
                    duration_ms = delivery_response.duration.as_millis(),
                    "webhook rejected delivery"
                );
            }

            Ok(delivery_response)
        }
        .instrument(span)
        .await
    }

    fn categorize(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_builder() {
            return DeliveryError::configuration(format!("invalid webhook request: {error}"));
        }
        if error.is_timeout() {
            return self.timeout_error(error.is_connect());
        }
        if error.is_connect() {
            return DeliveryError::network(format!("connection failed: {error}"));
        }
        DeliveryError::network(error.to_string())
    }

    /// The budget that fires first for the failing stage.
    fn timeout_error(&self, during_connect: bool) -> DeliveryError {
        let config = &self.config;
        if during_connect {
            DeliveryError::timeout(
                TimeoutPhase::Connect,
                config.connect_timeout.min(config.call_timeout),
            )
        } else {
            DeliveryError::timeout(TimeoutPhase::Request, config.read_timeout.min(config.call_timeout))
        }
    }

    async fn parse_response(response: Response, start_time: Instant) -> DeliveryResponse {
        let status_code = response.status().as_u16();
        let is_success = response.status().is_success();

        let body = match response.bytes().await {
            Ok(bytes) => truncate_body(&bytes),
            Err(e) => {
                tracing::warn!("failed to read response body: {}", e);
                format!("[failed to read response body: {e}]")
            },
        };

        DeliveryResponse { status_code, body, duration: start_time.elapsed(), is_success }
    }
}

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_LOGGED_BODY {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let truncated = String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY]);
    format!("{truncated}... (truncated)")
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings_for(server: &MockServer) -> FilterConfig {
        FilterConfig::new(format!("{}/hook", server.uri()), "s3cr3t")
    }

    #[test]
    fn timeout_reports_the_budget_that_fired() {
        let client = DeliveryClient::new(ClientConfig {
            call_timeout: Duration::from_millis(800),
            connect_timeout: Duration::from_millis(300),
            read_timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        })
        .unwrap();

        assert_eq!(
            client.timeout_error(true),
            DeliveryError::timeout(TimeoutPhase::Connect, Duration::from_millis(300))
        );
        assert_eq!(
            client.timeout_error(false),
            DeliveryError::timeout(TimeoutPhase::Request, Duration::from_millis(800))
        );
        assert_eq!(client.timeout_error(false).to_string(), "request timeout after 800ms");
    }

    #[tokio::test]
    async fn successful_delivery() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let outcome = client.deliver(Bytes::from_static(b"{}"), &settings_for(&server)).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { status_code: 200 });
    }

    #[tokio::test]
    async fn sends_content_type_and_token_headers() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::header(LISTENER_TOKEN_HEADER, "s3cr3t"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let outcome = client.deliver(Bytes::from_static(b"{}"), &settings_for(&server)).await;

        assert!(outcome.is_delivered());
    }

    #[tokio::test]
    async fn non_success_status_is_a_failed_attempt() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let outcome = client.deliver(Bytes::from_static(b"{}"), &settings_for(&server)).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(DeliveryError::http_status(500, "Internal Server Error"))
        );
    }

    #[tokio::test]
    async fn empty_destination_skips_without_request() {
        let client = DeliveryClient::with_defaults().unwrap();
        let outcome = client.deliver(Bytes::from_static(b"{}"), &FilterConfig::default()).await;

        assert_eq!(outcome, DeliveryOutcome::Skipped);
        assert_eq!(outcome.label(), "skipped");
    }

    #[test]
    fn timeouts_clamped_to_bounds() {
        let config = ClientConfig {
            call_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(90),
            ..ClientConfig::default()
        }
        .clamped();

        assert_eq!(config.call_timeout, MAX_CALL_TIMEOUT);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, MAX_READ_TIMEOUT);
    }

    #[test]
    fn long_bodies_truncated() {
        let body = vec![b'a'; MAX_LOGGED_BODY * 2];
        let truncated = truncate_body(&body);

        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncated.len(), MAX_LOGGED_BODY + "... (truncated)".len());
        assert_eq!(truncate_body(b"short"), "short");
    }
}
