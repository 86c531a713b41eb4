//! Failure taxonomy threaded through the submission pipeline.

use std::time::Duration;

use crate::dispatch::{DispatchError, TransportFailure};
use crate::policy::UnsupportedLanguage;

/// Every way a submission can end short of a sandbox response.
///
/// Sandbox-reported runtime errors are not here: they arrive as a normal
/// [`crate::dispatch::SandboxResponse`] and are classified by
/// [`crate::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No policy is registered for the requested language.
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),

    /// A policy rule matched the decoded source.
    #[error("policy violation for {language} ({rule_id}): {message}")]
    PolicyViolation {
        /// Canonical language key.
        language: String,
        /// Identifier of the matching rule.
        rule_id: String,
        /// The rule's message, surfaced verbatim.
        message: String,
    },

    /// The sandbox could not be reached or answered unusably.
    #[error("sandbox transport failed after {attempts} attempt(s): {failure}")]
    Transport {
        /// Outbound attempts made.
        attempts: u32,
        /// Last failure observed.
        failure: TransportFailure,
    },

    /// The dispatch budget ran out.
    #[error("dispatch exceeded its budget of {budget:?}")]
    Timeout {
        /// The configured budget.
        budget: Duration,
    },
}

impl From<DispatchError> for GatewayError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Transport { attempts, failure } => Self::Transport { attempts, failure },
            DispatchError::Timeout { budget } => Self::Timeout { budget },
        }
    }
}
