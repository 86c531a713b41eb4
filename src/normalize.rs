//! Maps sandbox responses and pipeline failures onto one result envelope.
//!
//! Callers only ever see [`ExecutionResult`]. Policy messages and sandbox
//! runtime errors are surfaced verbatim; transport problems and timeouts get
//! fixed messages so backend internals never leak.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::dispatch::SandboxResponse;
use crate::error::GatewayError;

/// Shown when the sandbox cannot be reached or its reply cannot be read.
pub const TRANSPORT_FAILURE_MESSAGE: &str =
    "The code execution service is unavailable right now. Please try again later.";

/// Shown when the dispatch budget runs out.
pub const TIMEOUT_MESSAGE: &str = "Code execution took too long and was stopped.";

/// Shown when the sandbox reports that the program hit its own time limit.
pub const SANDBOX_TIMEOUT_MESSAGE: &str = "Execution timed out inside the sandbox.";

/// Terminal state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Program ran and succeeded.
    Success,
    /// Program ran and failed.
    RuntimeError,
    /// Sandbox unreachable or unreadable.
    TransportError,
    /// Dispatch budget exhausted.
    Timeout,
    /// Rejected by a policy rule.
    Blocked,
    /// No policy for the requested language.
    UnsupportedLanguage,
}

/// Uniform `{ success, output, error }` envelope.
///
/// `success` is `true` exactly when `error` is `None`; the constructors are
/// the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    success: bool,
    output: String,
    error: Option<String>,
    #[serde(skip)]
    outcome: Outcome,
}

impl ExecutionResult {
    /// Successful run with its output.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            outcome: Outcome::Success,
        }
    }

    /// Program failed inside the sandbox.
    pub fn runtime_error(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(Outcome::RuntimeError, output.into(), message.into())
    }

    /// Submission rejected by a policy rule.
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::failure(Outcome::Blocked, String::new(), message.into())
    }

    /// Submission named a language with no policy.
    pub fn unsupported_language(language: &str) -> Self {
        Self::failure(
            Outcome::UnsupportedLanguage,
            String::new(),
            format!("Language '{language}' is not supported."),
        )
    }

    /// Sandbox unreachable or its reply unusable.
    pub fn transport_error() -> Self {
        Self::failure(
            Outcome::TransportError,
            String::new(),
            TRANSPORT_FAILURE_MESSAGE.to_owned(),
        )
    }

    /// Dispatch budget exhausted.
    pub fn timeout() -> Self {
        Self::failure(Outcome::Timeout, String::new(), TIMEOUT_MESSAGE.to_owned())
    }

    fn failure(outcome: Outcome, output: String, error: String) -> Self {
        Self {
            success: false,
            output,
            error: Some(error),
            outcome,
        }
    }

    /// Whether the program ran successfully.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Program output (possibly empty).
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Error message, present exactly when the run did not succeed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Terminal state tag.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }
}

/// Collapse a pipeline result into the caller-facing envelope.
pub fn normalize(result: Result<SandboxResponse, GatewayError>) -> ExecutionResult {
    match result {
        Ok(response) => from_response(response),
        Err(err) => from_error(&err),
    }
}

/// Map a pipeline failure.
pub fn from_error(err: &GatewayError) -> ExecutionResult {
    match err {
        GatewayError::UnsupportedLanguage(unsupported) => {
            ExecutionResult::unsupported_language(&unsupported.0)
        }
        GatewayError::PolicyViolation { message, .. } => ExecutionResult::blocked(message.clone()),
        GatewayError::Transport { .. } => ExecutionResult::transport_error(),
        GatewayError::Timeout { .. } => ExecutionResult::timeout(),
    }
}

/// Interpret a sandbox payload.
///
/// Missing `output` becomes the empty string and missing `error` means no
/// error. Shapes that cannot be read as text become a transport error.
pub fn from_response(response: SandboxResponse) -> ExecutionResult {
    let Ok(output) = text_field(response.output) else {
        warn!("sandbox output field has an unexpected shape");
        return ExecutionResult::transport_error();
    };
    let Ok(error) = error_field(response.error) else {
        warn!("sandbox error field has an unexpected shape");
        return ExecutionResult::transport_error();
    };
    let output = output.unwrap_or_default();

    if let Some(message) = error.filter(|m| !m.trim().is_empty()) {
        return ExecutionResult::runtime_error(output, message);
    }
    if response.timed_out == Some(true) {
        return ExecutionResult::runtime_error(output, SANDBOX_TIMEOUT_MESSAGE);
    }
    match response.exit_code {
        Some(code) if code != 0 => {
            let message = response
                .stderr
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("Process exited with status {code}."));
            ExecutionResult::runtime_error(output, message)
        }
        _ => ExecutionResult::success(output),
    }
}

struct Uninterpretable;

fn text_field(value: Option<Value>) -> Result<Option<String>, Uninterpretable> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Array(_) | Value::Object(_)) => Err(Uninterpretable),
    }
}

fn error_field(value: Option<Value>) -> Result<Option<String>, Uninterpretable> {
    match value {
        Some(Value::Object(mut fields)) => match fields.remove("message") {
            Some(Value::String(message)) => Ok(Some(message)),
            _ => Err(Uninterpretable),
        },
        // `false` is a common "no error" marker.
        Some(Value::Bool(false)) => Ok(None),
        other => text_field(other),
    }
}
