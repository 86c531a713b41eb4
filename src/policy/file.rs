//! TOML rule file format.
//!
//! ```toml
//! [aliases]
//! golang = "go"
//!
//! [[rules]]
//! language = "python"
//! pattern = '\bsocket\b'
//! message = "Network access is not allowed."
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use super::PolicyError;

/// Parsed rule file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    /// Rules in file order.
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
    /// Extra alias keys mapped to canonical language keys.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// One `[[rules]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    /// Optional stable identifier; generated from position when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Language key the rule belongs to.
    pub language: String,
    /// Regex source.
    pub pattern: String,
    /// Message shown on match.
    pub message: String,
}

/// Parse rule file contents.
///
/// # Errors
///
/// Returns [`PolicyError::Parse`] on invalid TOML or unknown keys.
pub fn parse(contents: &str) -> Result<RuleFile, PolicyError> {
    toml::from_str(contents).map_err(|e| PolicyError::Parse(e.to_string()))
}
