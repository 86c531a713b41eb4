//! Outbound dispatch to the remote execution sandbox.
//!
//! [`SandboxClient`] is the seam to the black-box backend; [`http`] holds the
//! reqwest implementation. [`Dispatcher`] wraps a client with the
//! concurrency cap, retry policy and wall-clock budget.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod http;
mod retry;

pub use retry::{DispatchPolicy, Dispatcher};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxRequest {
    /// Canonical language key.
    pub language: String,
    /// Decoded, validated source.
    pub code: String,
}

/// Payload returned by the sandbox.
///
/// The schema belongs to the backend and is not guaranteed complete, so
/// every field is optional. `output` and `error` are kept as raw JSON values
/// and interpreted by [`crate::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SandboxResponse {
    /// Program output.
    #[serde(default)]
    pub output: Option<Value>,
    /// Runtime error reported by the sandbox.
    #[serde(default)]
    pub error: Option<Value>,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: Option<String>,
    /// Process exit code.
    #[serde(default, alias = "exitCode")]
    pub exit_code: Option<i64>,
    /// Whether the program hit the sandbox's own time limit.
    #[serde(default, alias = "timedOut")]
    pub timed_out: Option<bool>,
}

impl SandboxResponse {
    /// Response carrying only textual output.
    pub fn with_output(output: &str) -> Self {
        Self {
            output: Some(Value::String(output.to_owned())),
            ..Self::default()
        }
    }

    /// Response carrying a runtime error message.
    pub fn with_error(output: &str, error: &str) -> Self {
        Self {
            output: Some(Value::String(output.to_owned())),
            error: Some(Value::String(error.to_owned())),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Connectivity status of the sandbox backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend answered the health probe.
    Healthy {
        /// Human-readable diagnostics.
        details: String,
    },
    /// Backend is unreachable or answered with an error.
    Unavailable {
        /// Human-readable diagnostics.
        details: String,
    },
}

impl HealthStatus {
    /// Returns `true` when the backend is reachable.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }

    /// Diagnostics text.
    pub fn details(&self) -> &str {
        match self {
            Self::Healthy { details } | Self::Unavailable { details } => details,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a single outbound attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    /// Connection could not be established (refused, DNS, unreachable).
    #[error("could not connect to sandbox: {0}")]
    Connect(String),
    /// Connection dropped or the body could not be read.
    #[error("sandbox connection failed: {0}")]
    Io(String),
    /// The HTTP client's own request timeout fired.
    #[error("sandbox request timed out")]
    RequestTimeout,
    /// Non-success HTTP status.
    #[error("sandbox returned HTTP status {0}")]
    Status(u16),
    /// Body was not an interpretable response object.
    #[error("sandbox returned a malformed response: {0}")]
    Malformed(String),
    /// The concurrency limiter was shut down.
    #[error("dispatcher is closed")]
    Closed,
}

impl TransportFailure {
    /// Whether another attempt could reasonably succeed.
    ///
    /// Connection problems and 5xx statuses are transient. Client errors,
    /// malformed payloads and a closed limiter are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Io(_) | Self::RequestTimeout => true,
            Self::Status(code) => (500..600).contains(code),
            Self::Malformed(_) | Self::Closed => false,
        }
    }
}

/// Terminal failure of a whole dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Retries exhausted, or a non-retryable transport failure.
    #[error("sandbox transport failed after {attempts} attempt(s): {failure}")]
    Transport {
        /// Outbound attempts made.
        attempts: u32,
        /// The last failure observed.
        failure: TransportFailure,
    },
    /// The wall-clock budget ran out.
    #[error("dispatch exceeded its budget of {budget:?}")]
    Timeout {
        /// The configured budget.
        budget: Duration,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Client for the remote execution sandbox.
///
/// Implementations make exactly one outbound call per invocation; retrying
/// is the [`Dispatcher`]'s job. Dropping the returned future must cancel the
/// in-flight call.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Run `request` on the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`TransportFailure`] when the sandbox cannot be reached or its
    /// reply cannot be read.
    async fn execute(&self, request: &SandboxRequest) -> Result<SandboxResponse, TransportFailure>;

    /// Probe backend connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`TransportFailure`] when the probe cannot be sent.
    async fn health_check(&self) -> Result<HealthStatus, TransportFailure>;
}
