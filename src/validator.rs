//! First-match policy evaluation over decoded source.

use std::sync::Arc;

use crate::policy::{PolicyRegistry, PolicyRule, UnsupportedLanguage};
use crate::sanitize;

/// Outcome of checking one snippet against its language's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// No rule matched.
    Valid,
    /// The first matching rule, in registry order.
    Blocked(PolicyRule),
}

impl ValidationResult {
    /// Returns `true` when no rule matched.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Stateless validator over a shared, immutable [`PolicyRegistry`].
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<PolicyRegistry>,
}

impl Validator {
    /// Create a validator over a registry.
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this validator reads from.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Check already-decoded source against the rules for `language`.
    ///
    /// Stops at the first matching rule. Pure: identical inputs always give
    /// identical results.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedLanguage`] if `language` is not registered.
    pub fn validate(
        &self,
        language: &str,
        source: &str,
    ) -> Result<ValidationResult, UnsupportedLanguage> {
        let rules = self.registry.rules_for(language)?;
        Ok(first_violation(rules, source))
    }

    /// Decode transport-encoded `code`, then [`validate`](Self::validate) it.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedLanguage`] if `language` is not registered.
    pub fn check(&self, language: &str, code: &str) -> Result<ValidationResult, UnsupportedLanguage> {
        self.validate(language, &sanitize::decode(code))
    }
}

fn first_violation(rules: &[PolicyRule], source: &str) -> ValidationResult {
    rules
        .iter()
        .find(|rule| rule.matches(source))
        .map_or(ValidationResult::Valid, |rule| {
            ValidationResult::Blocked(rule.clone())
        })
}
