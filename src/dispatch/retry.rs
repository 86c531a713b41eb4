//! Bounded, budgeted, retrying dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    DispatchError, HealthStatus, SandboxClient, SandboxRequest, SandboxResponse, TransportFailure,
};
use crate::policy::Language;

/// Concurrency and retry limits for outbound calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Maximum outbound calls in flight at once (N).
    pub max_concurrent: usize,
    /// Retries after the first attempt on transient failures (K).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between retries.
    pub max_backoff: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Sends validated code to the sandbox under a concurrency cap.
///
/// A slot is held only while one outbound attempt is in flight. Slots are
/// RAII permits, so they are released on success, failure, timeout, and when
/// the caller drops the future.
pub struct Dispatcher {
    client: Arc<dyn SandboxClient>,
    slots: Arc<Semaphore>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    /// Create a dispatcher. A `max_concurrent` of zero is raised to one.
    pub fn new(client: Arc<dyn SandboxClient>, policy: DispatchPolicy) -> Self {
        let slots = Arc::new(Semaphore::new(policy.max_concurrent.max(1)));
        Self {
            client,
            slots,
            policy,
        }
    }

    /// The limits this dispatcher enforces.
    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Concurrency slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Probe the sandbox without taking a slot.
    ///
    /// # Errors
    ///
    /// Returns [`TransportFailure`] when the probe cannot be sent.
    pub async fn health_check(&self) -> Result<HealthStatus, TransportFailure> {
        self.client.health_check().await
    }

    /// Run already-validated `source` on the sandbox within `budget`.
    ///
    /// Retries transient failures up to `max_retries` times with exponential
    /// backoff. Sandbox-reported runtime errors come back as `Ok`; they are
    /// the program's outcome, not a transport problem.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Timeout`] once the budget is exhausted (the
    /// in-flight call is dropped), or [`DispatchError::Transport`] when
    /// retries run out or the failure is not retryable.
    pub async fn execute(
        &self,
        language: &Language,
        source: &str,
        budget: Duration,
    ) -> Result<SandboxResponse, DispatchError> {
        let request = SandboxRequest {
            language: language.as_str().to_owned(),
            code: source.to_owned(),
        };
        let started = Instant::now();

        match tokio::time::timeout(budget, self.attempt_loop(&request, started, budget)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(budget_ms = budget.as_millis(), "dispatch budget exhausted");
                Err(DispatchError::Timeout { budget })
            }
        }
    }

    async fn attempt_loop(
        &self,
        request: &SandboxRequest,
        started: Instant,
        budget: Duration,
    ) -> Result<SandboxResponse, DispatchError> {
        let mut attempts: u32 = 0;
        let mut backoff = self.policy.initial_backoff;

        loop {
            attempts = attempts.saturating_add(1);

            let outcome = {
                let _permit = self.slots.acquire().await.map_err(|_| {
                    DispatchError::Transport {
                        attempts,
                        failure: TransportFailure::Closed,
                    }
                })?;
                debug!(attempt = attempts, "dispatching to sandbox");
                self.client.execute(request).await
            };

            let failure = match outcome {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if !failure.is_transient() || attempts > self.policy.max_retries {
                warn!(attempts, error = %failure, "sandbox dispatch failed");
                return Err(DispatchError::Transport { attempts, failure });
            }

            let remaining = budget.saturating_sub(started.elapsed());
            if backoff >= remaining {
                warn!(
                    attempts,
                    backoff_ms = backoff.as_millis(),
                    "next retry would exceed dispatch budget"
                );
                return Err(DispatchError::Timeout { budget });
            }

            warn!(
                attempts,
                error = %failure,
                backoff_ms = backoff.as_millis(),
                "transient sandbox failure, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2).min(self.policy.max_backoff);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.policy)
            .field("available_slots", &self.available_slots())
            .finish_non_exhaustive()
    }
}
