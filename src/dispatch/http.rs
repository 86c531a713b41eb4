//! HTTP sandbox client (`POST /execute`, `GET /test`).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{HealthStatus, SandboxClient, SandboxRequest, SandboxResponse, TransportFailure};

/// Default sandbox base URL.
pub const DEFAULT_SANDBOX_URL: &str = "http://127.0.0.1:8080";

/// reqwest-backed [`SandboxClient`].
#[derive(Debug, Clone)]
pub struct HttpSandboxClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSandboxClient {
    /// Create a client for the sandbox at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SandboxClient for HttpSandboxClient {
    async fn execute(&self, request: &SandboxRequest) -> Result<SandboxResponse, TransportFailure> {
        let url = format!("{}/execute", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportFailure::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify)?;
        parse_response(&body)
    }

    async fn health_check(&self) -> Result<HealthStatus, TransportFailure> {
        let url = format!("{}/test", self.base_url);
        let response = self.client.get(&url).send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            Ok(HealthStatus::Healthy {
                details: format!("sandbox reachable at {}", self.base_url),
            })
        } else {
            Ok(HealthStatus::Unavailable {
                details: format!("sandbox health probe returned HTTP {}", status.as_u16()),
            })
        }
    }
}

/// Map a reqwest error onto the transport taxonomy.
fn classify(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::RequestTimeout
    } else if err.is_connect() {
        TransportFailure::Connect(err.to_string())
    } else if err.is_decode() {
        TransportFailure::Malformed(err.to_string())
    } else {
        TransportFailure::Io(err.to_string())
    }
}

/// Parse a `POST /execute` response body.
///
/// # Errors
///
/// Returns [`TransportFailure::Malformed`] unless the body is a JSON object
/// whose known fields have the expected types.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<SandboxResponse, TransportFailure> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| TransportFailure::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(TransportFailure::Malformed(
            "expected a JSON object".to_owned(),
        ));
    }
    serde_json::from_value(value).map_err(|e| TransportFailure::Malformed(e.to_string()))
}
