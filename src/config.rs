//! Configuration loading and validation.
//!
//! Loads from `./snippet-gate.toml` (or `$SNIPPET_GATE_CONFIG`, or an explicit
//! path). Environment variables override file values; file values override
//! defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dispatch::http::DEFAULT_SANDBOX_URL;
use crate::dispatch::DispatchPolicy;

/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "snippet-gate.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Sandbox endpoint and dispatch limits.
    pub sandbox: SandboxConfig,
    /// Policy rule sources.
    pub policy: PolicyConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load with precedence env vars > TOML file > defaults.
    ///
    /// `explicit` wins over `$SNIPPET_GATE_CONFIG`. A missing file at the
    /// default location yields defaults; a missing explicit file is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting config is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// [`Self::load`] with a custom env resolver.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let (path, required) = match (explicit, env("SNIPPET_GATE_CONFIG")) {
            (Some(path), _) => (path.to_path_buf(), true),
            (None, Some(path)) => (PathBuf::from(path), true),
            (None, None) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config at {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!("no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read config at {}: {e}",
                    path.display()
                ))
            }
        };

        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string (no env overrides, no validation).
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or unknown keys.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Invalid numeric values are ignored with a warning.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SNIPPET_GATE_SANDBOX_URL") {
            self.sandbox.base_url = v;
        }
        override_number(&env, "SNIPPET_GATE_TIMEOUT_MS", &mut self.sandbox.timeout_ms);
        override_number(
            &env,
            "SNIPPET_GATE_MAX_CONCURRENT",
            &mut self.sandbox.max_concurrent,
        );
        override_number(&env, "SNIPPET_GATE_MAX_RETRIES", &mut self.sandbox.max_retries);
        if let Some(v) = env("SNIPPET_GATE_POLICY_FILE") {
            self.policy.rules_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env("SNIPPET_GATE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Reject configurations the gateway cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.sandbox.base_url)
            .with_context(|| format!("invalid sandbox base_url {:?}", self.sandbox.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("sandbox base_url must use http or https, got {}", url.scheme());
        }
        if self.sandbox.max_concurrent == 0 {
            anyhow::bail!("sandbox.max_concurrent must be at least 1");
        }
        if self.sandbox.timeout_ms == 0 {
            anyhow::bail!("sandbox.timeout_ms must be greater than zero");
        }
        if self.sandbox.initial_backoff_ms > self.sandbox.max_backoff_ms {
            anyhow::bail!("sandbox.initial_backoff_ms must not exceed sandbox.max_backoff_ms");
        }
        Ok(())
    }
}

fn override_number<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(v) = env(key) {
        match v.trim().parse() {
            Ok(n) => *slot = n,
            Err(_) => tracing::warn!(var = key, value = %v, "ignoring invalid env override"),
        }
    }
}

// ── Sandbox ─────────────────────────────────────────────────────

/// Sandbox endpoint and dispatch limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    /// Base URL of the sandbox service.
    pub base_url: String,
    /// Wall-clock budget for one dispatch, in milliseconds.
    pub timeout_ms: u64,
    /// TCP connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Concurrency cap on outbound calls.
    pub max_concurrent: usize,
    /// Retries after the first attempt on transient failures.
    pub max_retries: u32,
    /// First retry delay, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Retry delay ceiling, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SANDBOX_URL.to_owned(),
            timeout_ms: 10_000,
            connect_timeout_ms: 2_000,
            max_concurrent: 8,
            max_retries: 2,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

impl SandboxConfig {
    /// Per-call dispatch budget.
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect timeout for the HTTP client.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Dispatcher limits derived from this section.
    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            max_concurrent: self.max_concurrent,
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

// ── Policy ──────────────────────────────────────────────────────

/// Policy rule sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Load the built-in rule sets.
    pub include_defaults: bool,
    /// Optional TOML rule file appended after the built-ins.
    pub rules_file: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            include_defaults: true,
            rules_file: None,
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}
