//! HTTP mock server helpers for testing outbound HTTP calls.
//!
//! This module provides a thin wrapper around `wiremock` for declarative
//! HTTP stubbing. Use it to mock district lookup, geocoder, form-fill and
//! webhook responses in integration tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use crate::common::http_mock::MockHttpServer;
//!
//! #[tokio::test]
//! async fn test_external_api_call() {
//!     let server = MockHttpServer::start().await;
//!
//!     server
//!         .expect_get("/districts/locate")
//!         .with_query("zip", "22201")
//!         .respond_with_json(json!({"results": []}))
//!         .mount()
//!         .await;
//!
//!     // Point the client at server.url()
//! }
//! ```
//!
//! # Patterns
//!
//! - **Success response**: `.respond_with_json(value)` or `.respond_with_body(string)`
//! - **Error response**: `.respond_with_status(500)`
//! - **Timeout simulation**: `.with_delay(Duration::from_secs(30))`
//! - **Request verification**: `.expect_times(1)` to assert call count

use std::time::Duration;

use serde_json::Value;
pub use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, Request, ResponseTemplate};

/// A running stub server.
pub struct MockHttpServer {
    inner: MockServer,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        Self {
            inner: MockServer::start().await,
        }
    }

    /// Base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        self.inner.uri()
    }

    pub fn expect_get(&self, route: &str) -> Stub<'_> {
        Stub::new(self, Mock::given(method("GET")).and(path(route)))
    }

    pub fn expect_post(&self, route: &str) -> Stub<'_> {
        Stub::new(self, Mock::given(method("POST")).and(path(route)))
    }

    /// Requests received so far, in arrival order.
    #[allow(clippy::expect_used)]
    pub async fn requests(&self) -> Vec<Request> {
        self.inner
            .received_requests()
            .await
            .expect("request recording is enabled by default")
    }
}

/// One stubbed route under construction.
pub struct Stub<'a> {
    server: &'a MockHttpServer,
    builder: MockBuilder,
    response: ResponseTemplate,
    times: Option<u64>,
}

impl<'a> Stub<'a> {
    fn new(server: &'a MockHttpServer, builder: MockBuilder) -> Self {
        Self {
            server,
            builder,
            response: ResponseTemplate::new(200),
            times: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.builder = self.builder.and(header(name, value));
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: &'static str, value: &'static str) -> Self {
        self.builder = self.builder.and(query_param(name, value));
        self
    }

    #[must_use]
    pub fn with_json_body(mut self, body: Value) -> Self {
        self.builder = self.builder.and(body_json(body));
        self
    }

    #[must_use]
    pub fn respond_with_json(mut self, body: Value) -> Self {
        self.response = self.response.set_body_json(body);
        self
    }

    #[must_use]
    pub fn respond_with_body(mut self, body: &str) -> Self {
        self.response = self.response.set_body_string(body);
        self
    }

    #[must_use]
    pub fn respond_with_status(mut self, status: u16) -> Self {
        self.response = ResponseTemplate::new(status);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.response = self.response.set_delay(delay);
        self
    }

    #[must_use]
    pub const fn expect_times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    pub async fn mount(self) {
        let mut mock = self.builder.respond_with(self.response);
        if let Some(times) = self.times {
            mock = mock.expect(times);
        }
        mock.mount(&self.server.inner).await;
    }
}
