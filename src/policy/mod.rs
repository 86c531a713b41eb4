//! Per-language policy rules and the immutable registry that holds them.
//!
//! A [`PolicyRegistry`] is built once at startup (built-in rule sets, plus an
//! optional TOML rule file) and shared read-only for the process lifetime.
//! Rule order within a language is significant: validation is
//! first-match-wins.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use regex::Regex;

pub mod defaults;
pub mod file;

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Canonical language key used to select a rule set.
///
/// Keys are lowercased and trimmed on construction, so `" Python "` and
/// `"python"` name the same language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Language(String);

impl Language {
    /// Create a language key, normalizing case and surrounding whitespace.
    pub fn new(key: &str) -> Self {
        Self(key.trim().to_lowercase())
    }

    /// The canonical key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A forbidden construct for one language: compiled pattern plus the message
/// shown to the learner when it matches.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    id: String,
    language: Language,
    pattern: Regex,
    message: String,
}

impl PolicyRule {
    /// Compile a rule.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] if `pattern` is not a valid regex.
    pub fn new(
        id: impl Into<String>,
        language: Language,
        pattern: &str,
        message: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let id = id.into();
        let compiled = Regex::new(pattern).map_err(|source| PolicyError::InvalidPattern {
            rule: id.clone(),
            source,
        })?;
        Ok(Self {
            id,
            language,
            pattern: compiled,
            message: message.into(),
        })
    }

    /// Stable rule identifier, used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The language that owns this rule.
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Human-readable explanation surfaced to the caller on a match.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source text of the compiled pattern.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether the pattern matches anywhere in `source`.
    pub fn matches(&self, source: &str) -> bool {
        self.pattern.is_match(source)
    }
}

impl PartialEq for PolicyRule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.language == other.language
            && self.pattern.as_str() == other.pattern.as_str()
            && self.message == other.message
    }
}

impl Eq for PolicyRule {}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Requested language has no registered policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

/// Errors raised while building a [`PolicyRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A rule pattern failed to compile.
    #[error("invalid pattern in rule {rule}: {source}")]
    InvalidPattern {
        /// Identifier of the offending rule.
        rule: String,
        /// Underlying regex error.
        source: regex::Error,
    },
    /// A rule file could not be read.
    #[error("failed to read rule file {path}: {source}")]
    Read {
        /// Path of the rule file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A rule file is not valid TOML or has the wrong shape.
    #[error("failed to parse rule file: {0}")]
    Parse(String),
    /// An alias points at a language with no rule set.
    #[error("alias {alias} targets unknown language {target}")]
    DanglingAlias {
        /// Alias key.
        alias: String,
        /// Missing canonical key.
        target: String,
    },
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable per-language ordered rule sets.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    rules: BTreeMap<Language, Vec<PolicyRule>>,
    aliases: HashMap<String, Language>,
}

impl PolicyRegistry {
    /// Start building a registry.
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Registry holding only the built-in rule sets.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if a built-in pattern fails to compile.
    pub fn with_defaults() -> Result<Self, PolicyError> {
        Self::builder().with_defaults()?.build()
    }

    /// Resolve a raw language key (canonical or alias) to its canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedLanguage`] if neither a rule set nor an alias matches.
    pub fn resolve(&self, key: &str) -> Result<Language, UnsupportedLanguage> {
        let language = Language::new(key);
        if self.rules.contains_key(&language) {
            return Ok(language);
        }
        self.aliases
            .get(language.as_str())
            .cloned()
            .ok_or_else(|| UnsupportedLanguage(key.trim().to_owned()))
    }

    /// Ordered rules for a language key (canonical or alias).
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedLanguage`] if the key is not registered.
    pub fn rules_for(&self, key: &str) -> Result<&[PolicyRule], UnsupportedLanguage> {
        let language = self.resolve(key)?;
        self.rules
            .get(&language)
            .map(Vec::as_slice)
            .ok_or_else(|| UnsupportedLanguage(key.trim().to_owned()))
    }

    /// Canonical language keys, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &Language> {
        self.rules.keys()
    }

    /// Whether the key (canonical or alias) is supported.
    pub fn supports(&self, key: &str) -> bool {
        self.resolve(key).is_ok()
    }
}

/// Accumulates rules and aliases before freezing them into a [`PolicyRegistry`].
#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    rules: BTreeMap<Language, Vec<PolicyRule>>,
    aliases: HashMap<String, Language>,
}

impl PolicyRegistryBuilder {
    /// Add the built-in rule sets and aliases.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if a built-in pattern fails to compile.
    pub fn with_defaults(mut self) -> Result<Self, PolicyError> {
        for spec in defaults::RULES {
            let language = Language::new(spec.language);
            let rule = PolicyRule::new(spec.id, language.clone(), spec.pattern, spec.message)?;
            self.rules.entry(language).or_default().push(rule);
        }
        for (alias, target) in defaults::ALIASES {
            self.aliases.insert((*alias).to_owned(), Language::new(target));
        }
        Ok(self)
    }

    /// Append rules from a TOML rule file after any rules already present.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the file cannot be read, parsed, or compiled.
    pub fn with_rules_file(self, path: &Path) -> Result<Self, PolicyError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.with_rules_toml(&contents)
    }

    /// Append rules from TOML text (same format as [`Self::with_rules_file`]).
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the text cannot be parsed or a pattern fails to compile.
    pub fn with_rules_toml(mut self, contents: &str) -> Result<Self, PolicyError> {
        let parsed = file::parse(contents)?;
        for (index, entry) in parsed.rules.into_iter().enumerate() {
            let language = Language::new(&entry.language);
            let id = entry
                .id
                .unwrap_or_else(|| format!("{language}/file-{index}"));
            let rule = PolicyRule::new(id, language.clone(), &entry.pattern, entry.message)?;
            self.rules.entry(language).or_default().push(rule);
        }
        for (alias, target) in parsed.aliases {
            self.aliases
                .insert(Language::new(&alias).as_str().to_owned(), Language::new(&target));
        }
        Ok(self)
    }

    /// Append a single pre-compiled rule.
    pub fn rule(mut self, rule: PolicyRule) -> Self {
        self.rules
            .entry(rule.language().clone())
            .or_default()
            .push(rule);
        self
    }

    /// Freeze into an immutable registry.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::DanglingAlias`] if an alias targets a language
    /// with no rules.
    pub fn build(self) -> Result<PolicyRegistry, PolicyError> {
        for (alias, target) in &self.aliases {
            if !self.rules.contains_key(target) {
                return Err(PolicyError::DanglingAlias {
                    alias: alias.clone(),
                    target: target.to_string(),
                });
            }
        }
        Ok(PolicyRegistry {
            rules: self.rules,
            aliases: self.aliases,
        })
    }
}
