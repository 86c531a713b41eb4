//! snippet-gate: validation and execution dispatch gateway.
//!
//! Learner code arrives as `{ language, code }`, possibly HTML-entity-encoded.
//! It is decoded, checked against per-language policy rules, forwarded to a
//! remote execution sandbox under a concurrency cap and time budget, and the
//! result is folded into one `{ success, output, error }` envelope.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod normalize;
pub mod policy;
pub mod sanitize;
pub mod validator;

use std::sync::Arc;

use anyhow::Context;

use crate::config::GatewayConfig;
use crate::dispatch::http::HttpSandboxClient;
use crate::dispatch::Dispatcher;
use crate::gateway::Gateway;
use crate::policy::PolicyRegistry;

/// Build the policy registry described by `config`.
///
/// # Errors
///
/// Returns an error if a rule file cannot be loaded or a pattern is invalid.
pub fn build_registry(config: &GatewayConfig) -> anyhow::Result<PolicyRegistry> {
    let mut builder = PolicyRegistry::builder();
    if config.policy.include_defaults {
        builder = builder.with_defaults()?;
    }
    if let Some(path) = &config.policy.rules_file {
        builder = builder
            .with_rules_file(path)
            .with_context(|| format!("failed to load policy rules from {}", path.display()))?;
    }
    let registry = builder.build()?;
    if registry.languages().next().is_none() {
        anyhow::bail!("policy registry is empty: enable include_defaults or set rules_file");
    }
    Ok(registry)
}

/// Build a gateway talking HTTP to the configured sandbox.
///
/// # Errors
///
/// Returns an error if the registry or HTTP client cannot be built.
pub fn build_gateway(config: &GatewayConfig) -> anyhow::Result<Gateway> {
    let registry = Arc::new(build_registry(config)?);
    let client = HttpSandboxClient::new(&config.sandbox.base_url, config.sandbox.connect_timeout())
        .context("failed to build HTTP client")?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(client),
        config.sandbox.dispatch_policy(),
    ));
    tracing::info!(
        languages = registry.languages().count(),
        sandbox = %config.sandbox.base_url,
        max_concurrent = config.sandbox.max_concurrent,
        max_retries = config.sandbox.max_retries,
        "gateway ready"
    );
    Ok(Gateway::new(registry, dispatcher, config.sandbox.budget()))
}
