//! The submission pipeline: decode, validate, dispatch, normalize.
//!
//! Per-request states: `Received -> Sanitized -> Validated{Blocked | Passed}`;
//! `Passed -> Dispatched -> Completed`. Every state after `Received` is
//! reached at most once and the pipeline never goes back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::dispatch::{Dispatcher, HealthStatus, SandboxResponse};
use crate::error::GatewayError;
use crate::normalize::{normalize, ExecutionResult, Outcome};
use crate::policy::{Language, PolicyRegistry, UnsupportedLanguage};
use crate::sanitize;
use crate::validator::{ValidationResult, Validator};

/// Inbound `{ language, code }` request; `code` may be entity-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Submission {
    /// Requested language key (canonical or alias).
    pub language: String,
    /// Source text as delivered by the editor.
    pub code: String,
}

impl Submission {
    /// Build a submission.
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }
}

/// A submission that passed validation and is ready to dispatch.
///
/// `source_code` is always fully decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Canonical language.
    pub language: Language,
    /// Decoded source.
    pub source_code: String,
    /// When the submission entered the gateway.
    pub submitted_at: DateTime<Utc>,
}

/// Pipeline position of a request, used in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted from the caller.
    Received,
    /// Transport encoding removed.
    Sanitized,
    /// Rejected by policy. Terminal.
    Blocked,
    /// Passed policy.
    Passed,
    /// Sent to the sandbox.
    Dispatched,
    /// Terminal with the given outcome.
    Completed(Outcome),
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::Sanitized => f.write_str("sanitized"),
            Self::Blocked => f.write_str("blocked"),
            Self::Passed => f.write_str("passed"),
            Self::Dispatched => f.write_str("dispatched"),
            Self::Completed(outcome) => write!(f, "completed:{outcome:?}"),
        }
    }
}

/// Validation and execution dispatch gateway.
#[derive(Debug, Clone)]
pub struct Gateway {
    validator: Validator,
    dispatcher: Arc<Dispatcher>,
    budget: Duration,
}

impl Gateway {
    /// Assemble a gateway from its registry, dispatcher and per-call budget.
    pub fn new(registry: Arc<PolicyRegistry>, dispatcher: Arc<Dispatcher>, budget: Duration) -> Self {
        Self {
            validator: Validator::new(registry),
            dispatcher,
            budget,
        }
    }

    /// The policy registry in use.
    pub fn registry(&self) -> &PolicyRegistry {
        self.validator.registry()
    }

    /// The dispatcher in use.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Per-call dispatch budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run a submission end to end and return the caller-facing result.
    ///
    /// Never fails: every terminal state is folded into [`ExecutionResult`].
    /// Dropping the future cancels any in-flight sandbox call.
    pub async fn submit(&self, submission: Submission) -> ExecutionResult {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "submission",
            %request_id,
            language = %submission.language.trim()
        );
        async move {
            let result = normalize(self.process(submission).await);
            let state = RequestState::Completed(result.outcome());
            match result.outcome() {
                Outcome::Success | Outcome::RuntimeError | Outcome::Blocked => {
                    info!(%state, output_len = result.output().len(), "submission finished");
                }
                Outcome::TransportError | Outcome::Timeout | Outcome::UnsupportedLanguage => {
                    warn!(%state, "submission failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline and return the raw sandbox response or the failure.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] for unsupported languages, policy violations,
    /// transport failures and timeouts. Policy decisions never touch the
    /// network.
    pub async fn process(&self, submission: Submission) -> Result<SandboxResponse, GatewayError> {
        debug!(state = %RequestState::Received, code_len = submission.code.len());
        let request = self.admit(&submission)?;

        debug!(
            state = %RequestState::Dispatched,
            submitted_at = %request.submitted_at,
            budget_ms = self.budget.as_millis()
        );
        let response = self
            .dispatcher
            .execute(&request.language, &request.source_code, self.budget)
            .await?;
        Ok(response)
    }

    /// Decode and validate without dispatching.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedLanguage`] if the language is not registered.
    pub fn check(&self, language: &str, code: &str) -> Result<ValidationResult, UnsupportedLanguage> {
        self.validator.check(language, code)
    }

    /// Probe the sandbox.
    pub async fn health(&self) -> HealthStatus {
        match self.dispatcher.health_check().await {
            Ok(status) => status,
            Err(failure) => HealthStatus::Unavailable {
                details: failure.to_string(),
            },
        }
    }

    fn admit(&self, submission: &Submission) -> Result<ExecutionRequest, GatewayError> {
        let language = self.registry().resolve(&submission.language)?;

        let source = sanitize::decode(&submission.code);
        debug!(state = %RequestState::Sanitized, decoded_len = source.len());

        match self.validator.validate(language.as_str(), &source)? {
            ValidationResult::Blocked(rule) => {
                info!(state = %RequestState::Blocked, rule = rule.id(), "policy rule matched");
                Err(GatewayError::PolicyViolation {
                    language: language.to_string(),
                    rule_id: rule.id().to_owned(),
                    message: rule.message().to_owned(),
                })
            }
            ValidationResult::Valid => {
                debug!(state = %RequestState::Passed);
                Ok(ExecutionRequest {
                    language,
                    source_code: source.into_owned(),
                    submitted_at: Utc::now(),
                })
            }
        }
    }
}
