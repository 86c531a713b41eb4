//! Instrumented in-memory sandbox used by dispatcher and gateway tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use snippet_gate::dispatch::{
    HealthStatus, SandboxClient, SandboxRequest, SandboxResponse, TransportFailure,
};

/// What the fake does when its script runs out.
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Answer with this response.
    Respond(SandboxResponse),
    /// Fail with this error.
    Fail(TransportFailure),
    /// Never answer.
    Hang,
}

/// Scripted sandbox that records calls and peak concurrency.
pub struct FakeSandbox {
    script: Mutex<VecDeque<Result<SandboxResponse, TransportFailure>>>,
    fallback: Fallback,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<SandboxRequest>>,
}

impl FakeSandbox {
    pub fn new(fallback: Fallback) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `output`.
    pub fn echo(output: &str) -> Self {
        Self::new(Fallback::Respond(SandboxResponse::with_output(output)))
    }

    /// Answer these results in order before falling back.
    pub fn scripted(
        results: Vec<Result<SandboxResponse, TransportFailure>>,
        fallback: Fallback,
    ) -> Self {
        let fake = Self::new(fallback);
        *fake.script.lock().unwrap_or_else(|e| e.into_inner()) = results.into();
        fake
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SandboxRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_result(&self) -> Option<Result<SandboxResponse, TransportFailure>> {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.or_else(|| match &self.fallback {
            Fallback::Respond(response) => Some(Ok(response.clone())),
            Fallback::Fail(failure) => Some(Err(failure.clone())),
            Fallback::Hang => None,
        })
    }
}

/// Decrements the in-flight counter even when the call is cancelled.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SandboxClient for FakeSandbox {
    async fn execute(&self, request: &SandboxRequest) -> Result<SandboxResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let _guard = InFlight(Arc::clone(&self.in_flight));
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.next_result() {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn health_check(&self) -> Result<HealthStatus, TransportFailure> {
        Ok(HealthStatus::Healthy {
            details: "fake sandbox".to_owned(),
        })
    }
}
