//! Analysis type identifiers
//!
//! The set of valid types is configuration (see `config::AnalysisTypeConfig`);
//! this type only guarantees a normalized, well-formed name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized analysis type name (lowercase, `_` separated)
///
/// `"Invoice-Reconciliation"` and `"invoice_reconciliation"` name the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnalysisType(String);

impl AnalysisType {
    /// Type used when a submission does not name one
    pub const DEFAULT: &'static str = "plan_review";

    /// Parse and normalize a type name
    pub fn new(name: &str) -> Result<Self, String> {
        let normalized: String = name.trim().to_ascii_lowercase().replace('-', "_");

        if normalized.is_empty() {
            return Err("analysis type must not be empty".to_string());
        }
        if normalized.len() > 64 {
            return Err(format!("analysis type too long: {}", name));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(format!("invalid analysis type: {}", name));
        }

        Ok(Self(normalized))
    }

    /// Name known to be normalized already (built-in catalog entries)
    pub(crate) fn builtin(name: &'static str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AnalysisType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AnalysisType> for String {
    fn from(value: AnalysisType) -> Self {
        value.0
    }
}
