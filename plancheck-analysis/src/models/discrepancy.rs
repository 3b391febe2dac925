//! Discrepancy model
//!
//! A discrepancy is owned by exactly one analysis record and stored inline
//! with it; it is never referenced from anywhere else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Discrepancy severity, ordered `Info < Warning < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Map a provider-reported severity label onto the closed set
    ///
    /// Accepts the canonical names plus the `low`/`medium`/`high` vocabulary.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "info" | "low" | "minor" => Some(Severity::Info),
            "warning" | "medium" | "moderate" => Some(Severity::Warning),
            "critical" | "high" | "severe" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::from_label(s).ok_or_else(|| format!("unknown severity: {}", s))
    }
}

/// What kind of mismatch was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Numeric values differ beyond tolerance
    QuantityMismatch,
    /// Non-numeric values differ
    ValueMismatch,
    /// Expected value has no counterpart in the document
    MissingFromActual,
    /// Document contains a value nothing expected
    ExtraInActual,
    /// Passed through from the provider's own findings
    Reported,
}

/// A single detected mismatch between expected and actual document content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    /// Item or location within the document
    pub location: String,
    /// Compared attribute of that item, when the rule names one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub actual: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difference_percent: Option<f64>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Output of discrepancy extraction for one provider result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub discrepancies: Vec<Discrepancy>,
    /// Items visited by comparison rules
    pub items_compared: u32,
    /// Compared items no comparison rule flagged
    pub items_matched: u32,
}

/// Count discrepancies at or above `min`
pub fn count_at_least(discrepancies: &[Discrepancy], min: Severity) -> usize {
    discrepancies.iter().filter(|d| d.severity >= min).count()
}
