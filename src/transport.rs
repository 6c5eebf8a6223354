//! HTTP transport abstraction.
//!
//! The grant and resource layers issue requests through the [`HttpTransport`]
//! trait rather than a concrete client, so protocol logic can be exercised
//! against a scripted transport in tests. [`ReqwestTransport`] is the
//! production implementation; it retries connection and timeout failures with
//! a bounded backoff, at this boundary only — orchestration steps above it
//! are never retried.

use crate::errors::{OpError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;

/// A request descriptor, independent of any HTTP client.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// Optional request body
    pub body: Option<String>,
}

impl HttpRequest {
    /// Creates a request with no headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response reduced to what the protocol layers consume.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for sending HTTP requests.
///
/// Implementations must be shareable across concurrent flows.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and returns the response.
    ///
    /// Network-level failures (connect, timeout) surface as
    /// `OpError::HttpError` after any implementation-level retries are
    /// exhausted. Non-2xx statuses are returned as responses, not errors;
    /// status mapping belongs to the caller.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport backed by [`reqwest::Client`].
pub struct ReqwestTransport {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl ReqwestTransport {
    /// Creates a transport with a 30 second request timeout and up to two
    /// retries of connection/timeout failures.
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
        }
    }

    /// Uses a custom `reqwest::Client`.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Sets how many times a connection/timeout failure is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn attempt(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, reqwest::Error> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(url = %request.url, attempt, "retrying after network failure: {}", e);
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => return Err(OpError::HttpError(e)),
            }
        }
    }
}

pub mod mock {
    //! Scripted transport for tests.
    //!
    //! Responses are queued ahead of time and popped in order; every sent
    //! request is recorded with its timestamp, which lets tests assert both
    //! request contents and the spacing between continuation polls.

    use super::{HttpRequest, HttpResponse, HttpTransport};
    use crate::errors::{OpError, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    /// A request captured by [`MockTransport`], with the instant it was sent.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        /// The request as handed to the transport
        pub request: HttpRequest,
        /// When the transport received it
        pub sent_at: Instant,
    }

    /// An [`HttpTransport`] that replays a scripted list of responses.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        recorded: Mutex<Vec<RecordedRequest>>,
    }

    impl MockTransport {
        /// Creates an empty mock with no scripted responses.
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a response with the given status and body.
        pub fn push_response(&self, status: u16, body: impl Into<String>) {
            self.responses
                .lock()
                .expect("mock lock poisoned")
                .push_back(HttpResponse {
                    status,
                    body: body.into(),
                });
        }

        /// Queues a response with a JSON body.
        pub fn push_json(&self, status: u16, body: &serde_json::Value) {
            self.push_response(status, body.to_string());
        }

        /// Returns all requests recorded so far.
        pub fn recorded(&self) -> Vec<RecordedRequest> {
            self.recorded.lock().expect("mock lock poisoned").clone()
        }

        /// Returns how many requests were sent.
        pub fn request_count(&self) -> usize {
            self.recorded.lock().expect("mock lock poisoned").len()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            let url = request.url.clone();
            self.recorded
                .lock()
                .expect("mock lock poisoned")
                .push(RecordedRequest {
                    request,
                    sent_at: Instant::now(),
                });
            self.responses
                .lock()
                .expect("mock lock poisoned")
                .pop_front()
                .ok_or(OpError::UnexpectedStatus {
                    status: 0,
                    url,
                    body: "mock transport: no scripted response left".to_string(),
                })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use reqwest::Method;

        #[tokio::test]
        async fn test_mock_replays_in_order() {
            let mock = MockTransport::new();
            mock.push_response(200, "first");
            mock.push_response(404, "second");

            let r1 = mock
                .send(HttpRequest::new(Method::GET, "https://a.example/"))
                .await
                .unwrap();
            let r2 = mock
                .send(HttpRequest::new(Method::GET, "https://b.example/"))
                .await
                .unwrap();

            assert_eq!(r1.status, 200);
            assert_eq!(r1.body, "first");
            assert_eq!(r2.status, 404);
            assert_eq!(mock.request_count(), 2);
            assert_eq!(mock.recorded()[1].request.url, "https://b.example/");
        }

        #[tokio::test]
        async fn test_mock_exhausted_script_errors() {
            let mock = MockTransport::new();
            let err = mock
                .send(HttpRequest::new(Method::GET, "https://a.example/"))
                .await
                .unwrap_err();
            assert!(matches!(err, OpError::UnexpectedStatus { status: 0, .. }));
        }
    }
}
