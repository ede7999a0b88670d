//! HTTP mocking utilities for webhook testing.

use std::time::Duration;

use serde_json::Value;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Path the mock webhook listens on.
pub const HOOK_PATH: &str = "/hook";

/// Webhook stand-in that records every POST it receives.
pub struct WebhookMock {
    server: MockServer,
}

impl WebhookMock {
    /// Starts a mock webhook on a random port.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// URL to configure as the webhook destination.
    pub fn url(&self) -> String {
        format!("{}{HOOK_PATH}", self.server.uri())
    }

    /// Answers every POST to the hook path with `response`.
    pub async fn respond_with(&self, response: MockResponse) {
        Mock::given(method("POST"))
            .and(path(HOOK_PATH))
            .respond_with(response.into_template())
            .mount(&self.server)
            .await;
    }

    /// Answers with `response` only when the listener token matches; other
    /// requests fall through to wiremock's default 404.
    pub async fn respond_with_token(&self, token: &str, response: MockResponse) {
        Mock::given(method("POST"))
            .and(path(HOOK_PATH))
            .and(header("X-Listener-Token", token))
            .respond_with(response.into_template())
            .mount(&self.server)
            .await;
    }

    /// Returns all requests received so far, in arrival order.
    pub async fn received_requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| RecordedRequest {
                method: request.method.as_str().to_string(),
                path: request.url.path().to_string(),
                content_type: header_value(&request, "content-type"),
                token: header_value(&request, "x-listener-token"),
                body: request.body,
            })
            .collect()
    }

    /// Polls until at least `count` requests arrived or `timeout` elapses.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let requests = self.received_requests().await;
            if requests.len() >= count || tokio::time::Instant::now() >= deadline {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let requests = self.received_requests().await;
        assert_eq!(
            requests.len(),
            expected,
            "expected {} requests, received {}",
            expected,
            requests.len()
        );
    }
}

fn header_value(request: &wiremock::Request, name: &str) -> Option<String> {
    request.headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

/// Canned webhook behaviours.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Respond immediately with `status` and a short body.
    Status(u16),
    /// Respond with `status` after `delay`, to exercise client timeouts.
    Delayed {
        /// HTTP status code
        status: u16,
        /// Time before the response is sent
        delay: Duration,
    },
}

impl MockResponse {
    fn into_template(self) -> ResponseTemplate {
        match self {
            Self::Status(status) => ResponseTemplate::new(status).set_body_string("ok"),
            Self::Delayed { status, delay } => ResponseTemplate::new(status).set_delay(delay),
        }
    }
}

/// A request captured by the mock webhook.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// `Content-Type` header, if sent.
    pub content_type: Option<String>,
    /// `X-Listener-Token` header, if sent.
    pub token: Option<String>,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Body parsed as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the body is not valid JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// URL of a local port with nothing listening, for connection failures.
pub fn unreachable_url() -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("should bind an ephemeral port");
    format!("http://127.0.0.1:{port}{HOOK_PATH}")
}
