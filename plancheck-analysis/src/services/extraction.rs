//! Rule-driven discrepancy extraction
//!
//! Comparison rules are configuration data attached to each analysis type.
//! `extract` is a pure function of (result, rules): rules are evaluated in
//! declared order and array items in array order, so identical input always
//! yields an identical discrepancy sequence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalysisType, Discrepancy, DiscrepancyKind, Extraction, Severity};

fn default_warning_percent() -> f64 {
    10.0
}

fn default_critical_percent() -> f64 {
    20.0
}

fn default_warning() -> Severity {
    Severity::Warning
}

fn default_info() -> Severity {
    Severity::Info
}

fn default_location_key() -> String {
    "item".to_string()
}

fn default_expected_key() -> String {
    "expected".to_string()
}

fn default_actual_key() -> String {
    "actual".to_string()
}

fn default_severity_key() -> String {
    "severity".to_string()
}

fn default_recommendation_key() -> String {
    "recommendation".to_string()
}

/// One comparison rule
///
/// `items` is a JSON pointer (RFC 6901) to an array of objects inside the
/// provider result; `key` names the field identifying each item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonRule {
    /// Relative difference of two numeric fields against tolerance bands
    NumericTolerance {
        items: String,
        key: String,
        expected: String,
        actual: String,
        #[serde(default = "default_warning_percent")]
        warning_percent: f64,
        #[serde(default = "default_critical_percent")]
        critical_percent: f64,
    },

    /// Two fields must be equal
    ExactMatch {
        items: String,
        key: String,
        expected: String,
        actual: String,
        #[serde(default = "default_warning")]
        severity: Severity,
    },

    /// A value present on one side only
    Presence {
        items: String,
        key: String,
        expected: String,
        actual: String,
        #[serde(default = "default_warning")]
        missing_severity: Severity,
        #[serde(default = "default_info")]
        extra_severity: Severity,
    },

    /// Findings the provider already reported, passed through
    Reported {
        items: String,
        #[serde(default = "default_location_key")]
        location: String,
        #[serde(default = "default_expected_key")]
        expected: String,
        #[serde(default = "default_actual_key")]
        actual: String,
        #[serde(default = "default_severity_key")]
        severity: String,
        #[serde(default = "default_recommendation_key")]
        recommendation: String,
        #[serde(default = "default_warning")]
        default_severity: Severity,
    },
}

impl ComparisonRule {
    fn items_pointer(&self) -> &str {
        match self {
            ComparisonRule::NumericTolerance { items, .. }
            | ComparisonRule::ExactMatch { items, .. }
            | ComparisonRule::Presence { items, .. }
            | ComparisonRule::Reported { items, .. } => items,
        }
    }

    /// Reject rules that can never evaluate correctly
    pub fn validate(&self) -> Result<(), String> {
        let pointer = self.items_pointer();
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(format!("items pointer must start with '/': {}", pointer));
        }

        if let ComparisonRule::NumericTolerance {
            warning_percent,
            critical_percent,
            ..
        } = self
        {
            if *warning_percent < 0.0 || *critical_percent < 0.0 {
                return Err("tolerance percentages must be non-negative".to_string());
            }
            if warning_percent > critical_percent {
                return Err(format!(
                    "warning_percent ({}) exceeds critical_percent ({})",
                    warning_percent, critical_percent
                ));
            }
        }

        Ok(())
    }
}

/// Tracks which items comparison rules looked at and flagged
#[derive(Default)]
struct Coverage {
    compared: BTreeSet<(String, usize)>,
    flagged: BTreeSet<(String, usize)>,
}

impl Coverage {
    fn compared(&mut self, pointer: &str, index: usize) {
        self.compared.insert((pointer.to_string(), index));
    }

    fn flagged(&mut self, pointer: &str, index: usize) {
        self.flagged.insert((pointer.to_string(), index));
    }
}

/// Derive discrepancies from a provider result
pub fn extract(result: &Value, rules: &[ComparisonRule]) -> AnalysisResult<Extraction> {
    if !result.is_object() {
        return Err(AnalysisError::MalformedResult(
            "provider result is not a JSON object".to_string(),
        ));
    }

    let mut discrepancies = Vec::new();
    let mut coverage = Coverage::default();

    for rule in rules {
        let pointer = rule.items_pointer();
        let Some(items) = item_array(result, pointer)? else {
            continue;
        };

        for (index, item) in items.iter().enumerate() {
            let item = item.as_object().ok_or_else(|| {
                AnalysisError::MalformedResult(format!("{}[{}] is not an object", pointer, index))
            })?;

            let found = evaluate(rule, pointer, index, item, &mut coverage)?;
            discrepancies.extend(found);
        }
    }

    let items_compared = coverage.compared.len() as u32;
    let items_matched = coverage
        .compared
        .iter()
        .filter(|entry| !coverage.flagged.contains(*entry))
        .count() as u32;

    Ok(Extraction {
        discrepancies,
        items_compared,
        items_matched,
    })
}

fn evaluate(
    rule: &ComparisonRule,
    pointer: &str,
    index: usize,
    item: &Map<String, Value>,
    coverage: &mut Coverage,
) -> AnalysisResult<Vec<Discrepancy>> {
    let mut found = Vec::new();

    match rule {
        ComparisonRule::NumericTolerance {
            key,
            expected,
            actual,
            warning_percent,
            critical_percent,
            ..
        } => {
            let (Some(exp_value), Some(act_value)) = (present(item, expected), present(item, actual))
            else {
                return Ok(found);
            };
            coverage.compared(pointer, index);

            let exp = numeric(exp_value, pointer, index, expected)?;
            let act = numeric(act_value, pointer, index, actual)?;
            if exp == act {
                return Ok(found);
            }

            let diff = if exp == 0.0 {
                None
            } else {
                Some(round2((act - exp) / exp.abs() * 100.0)).filter(|d| d.is_finite())
            };

            let (severity, difference_percent, recommendation) = match diff {
                None if exp == 0.0 => (
                    Severity::Critical,
                    None,
                    format!("Expected none, found {}", act),
                ),
                // Relative difference too large to represent
                None => (
                    Severity::Critical,
                    None,
                    format!("Verify quantities - expected {}, found {}", exp, act),
                ),
                Some(diff) => {
                    let severity = if diff.abs() > *critical_percent {
                        Severity::Critical
                    } else if diff.abs() > *warning_percent {
                        Severity::Warning
                    } else {
                        return Ok(found);
                    };
                    (
                        severity,
                        Some(diff),
                        format!(
                            "Verify quantities - {}% difference detected",
                            diff.abs().round()
                        ),
                    )
                }
            };

            coverage.flagged(pointer, index);
            found.push(Discrepancy {
                kind: DiscrepancyKind::QuantityMismatch,
                location: location_of(item, key, pointer, index),
                field: Some(expected.clone()),
                expected: exp_value.clone(),
                actual: act_value.clone(),
                difference_percent,
                severity,
                recommendation: Some(recommendation),
            });
        }

        ComparisonRule::ExactMatch {
            key,
            expected,
            actual,
            severity,
            ..
        } => {
            let (Some(exp_value), Some(act_value)) = (present(item, expected), present(item, actual))
            else {
                return Ok(found);
            };
            coverage.compared(pointer, index);

            if exp_value != act_value {
                coverage.flagged(pointer, index);
                found.push(Discrepancy {
                    kind: DiscrepancyKind::ValueMismatch,
                    location: location_of(item, key, pointer, index),
                    field: Some(expected.clone()),
                    expected: exp_value.clone(),
                    actual: act_value.clone(),
                    difference_percent: None,
                    severity: *severity,
                    recommendation: None,
                });
            }
        }

        ComparisonRule::Presence {
            key,
            expected,
            actual,
            missing_severity,
            extra_severity,
            ..
        } => {
            let exp_value = present(item, expected);
            let act_value = present(item, actual);

            let (kind, severity, recommendation) = match (exp_value, act_value) {
                (None, None) => return Ok(found),
                (Some(_), Some(_)) => {
                    coverage.compared(pointer, index);
                    return Ok(found);
                }
                (Some(_), None) => (
                    DiscrepancyKind::MissingFromActual,
                    *missing_severity,
                    "Expected value not found in document",
                ),
                (None, Some(_)) => (
                    DiscrepancyKind::ExtraInActual,
                    *extra_severity,
                    "Confirm whether this value is required",
                ),
            };

            coverage.compared(pointer, index);
            coverage.flagged(pointer, index);
            found.push(Discrepancy {
                kind,
                location: location_of(item, key, pointer, index),
                field: Some(expected.clone()),
                expected: exp_value.cloned().unwrap_or(Value::Null),
                actual: act_value.cloned().unwrap_or(Value::Null),
                difference_percent: None,
                severity,
                recommendation: Some(recommendation.to_string()),
            });
        }

        ComparisonRule::Reported {
            location,
            expected,
            actual,
            severity,
            recommendation,
            default_severity,
            ..
        } => {
            let severity = item
                .get(severity)
                .and_then(Value::as_str)
                .and_then(Severity::from_label)
                .unwrap_or(*default_severity);

            found.push(Discrepancy {
                kind: DiscrepancyKind::Reported,
                location: location_of(item, location, pointer, index),
                field: None,
                expected: present(item, expected).cloned().unwrap_or(Value::Null),
                actual: present(item, actual).cloned().unwrap_or(Value::Null),
                difference_percent: item
                    .get("difference_percent")
                    .and_then(Value::as_f64)
                    .map(round2)
                    .filter(|d| d.is_finite()),
                severity,
                recommendation: item
                    .get(recommendation)
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }

    Ok(found)
}

/// Resolve the item array a rule iterates; an absent pointer means no items
fn item_array<'a>(result: &'a Value, pointer: &str) -> AnalysisResult<Option<&'a Vec<Value>>> {
    match result.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(AnalysisError::MalformedResult(format!(
            "{} is not an array",
            if pointer.is_empty() { "/" } else { pointer }
        ))),
    }
}

/// Field value, treating JSON null as absent
fn present<'a>(item: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    item.get(field).filter(|v| !v.is_null())
}

fn numeric(value: &Value, pointer: &str, index: usize, field: &str) -> AnalysisResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite());

    parsed.ok_or_else(|| {
        AnalysisError::MalformedResult(format!(
            "{}[{}].{} is not numeric: {}",
            pointer, index, field, value
        ))
    })
}

fn location_of(item: &Map<String, Value>, key: &str, pointer: &str, index: usize) -> String {
    match item.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Null) | None | Some(Value::String(_)) => format!("{}[{}]", pointer, index),
        Some(other) => other.to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Configured analysis type with its rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTypeConfig {
    pub name: AnalysisType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<ComparisonRule>,
}

/// The configured set of analysis types
///
/// Built once from configuration; lookups never allocate a new type set.
#[derive(Debug, Clone)]
pub struct AnalysisCatalog {
    types: Vec<AnalysisTypeConfig>,
}

impl AnalysisCatalog {
    pub fn new(types: Vec<AnalysisTypeConfig>) -> Self {
        Self { types }
    }

    pub fn types(&self) -> &[AnalysisTypeConfig] {
        &self.types
    }

    pub fn get(&self, analysis_type: &AnalysisType) -> Option<&AnalysisTypeConfig> {
        self.types.iter().find(|t| &t.name == analysis_type)
    }

    /// Parse a requested type name and check it is configured
    pub fn resolve(&self, name: &str) -> AnalysisResult<AnalysisType> {
        let analysis_type =
            AnalysisType::new(name).map_err(|_| AnalysisError::UnknownAnalysisType(name.to_string()))?;

        if self.get(&analysis_type).is_some() {
            Ok(analysis_type)
        } else {
            Err(AnalysisError::UnknownAnalysisType(name.to_string()))
        }
    }

    /// `extract(result, analysis_type)` using the type's configured rules
    pub fn extract(&self, result: &Value, analysis_type: &AnalysisType) -> AnalysisResult<Extraction> {
        let config = self
            .get(analysis_type)
            .ok_or_else(|| AnalysisError::UnknownAnalysisType(analysis_type.to_string()))?;
        extract(result, &config.rules)
    }
}

fn builtin(name: &'static str, description: &str, rules: Vec<ComparisonRule>) -> AnalysisTypeConfig {
    AnalysisTypeConfig {
        name: AnalysisType::builtin(name),
        description: description.to_string(),
        rules,
    }
}

fn s(value: &str) -> String {
    value.to_string()
}

/// Built-in analysis types used when configuration defines none
pub fn default_analysis_types() -> Vec<AnalysisTypeConfig> {
    vec![
        builtin(
            "plan_review",
            "Compare estimate quantities against quantities read from construction plans",
            vec![
                ComparisonRule::NumericTolerance {
                    items: s("/items"),
                    key: s("item"),
                    expected: s("estimate_quantity"),
                    actual: s("plan_quantity"),
                    warning_percent: 10.0,
                    critical_percent: 20.0,
                },
                ComparisonRule::Presence {
                    items: s("/items"),
                    key: s("item"),
                    expected: s("estimate_quantity"),
                    actual: s("plan_quantity"),
                    missing_severity: Severity::Info,
                    extra_severity: Severity::Warning,
                },
                ComparisonRule::Reported {
                    items: s("/discrepancies"),
                    location: default_location_key(),
                    expected: s("estimate_quantity"),
                    actual: s("plan_quantity"),
                    severity: default_severity_key(),
                    recommendation: default_recommendation_key(),
                    default_severity: Severity::Warning,
                },
            ],
        ),
        builtin(
            "contract_terms",
            "Check contract terms against the agreed values",
            vec![
                ComparisonRule::ExactMatch {
                    items: s("/terms"),
                    key: s("term"),
                    expected: s("expected"),
                    actual: s("actual"),
                    severity: Severity::Critical,
                },
                ComparisonRule::Presence {
                    items: s("/terms"),
                    key: s("term"),
                    expected: s("expected"),
                    actual: s("actual"),
                    missing_severity: Severity::Critical,
                    extra_severity: Severity::Info,
                },
                ComparisonRule::Reported {
                    items: s("/findings"),
                    location: s("term"),
                    expected: default_expected_key(),
                    actual: default_actual_key(),
                    severity: default_severity_key(),
                    recommendation: default_recommendation_key(),
                    default_severity: Severity::Warning,
                },
            ],
        ),
        builtin(
            "invoice_reconciliation",
            "Reconcile invoiced line items against purchase order quantities and amounts",
            vec![
                ComparisonRule::NumericTolerance {
                    items: s("/line_items"),
                    key: s("description"),
                    expected: s("expected_quantity"),
                    actual: s("invoiced_quantity"),
                    warning_percent: 10.0,
                    critical_percent: 20.0,
                },
                ComparisonRule::NumericTolerance {
                    items: s("/line_items"),
                    key: s("description"),
                    expected: s("expected_amount"),
                    actual: s("invoiced_amount"),
                    warning_percent: 1.0,
                    critical_percent: 5.0,
                },
                ComparisonRule::Presence {
                    items: s("/line_items"),
                    key: s("description"),
                    expected: s("expected_quantity"),
                    actual: s("invoiced_quantity"),
                    missing_severity: Severity::Warning,
                    extra_severity: Severity::Warning,
                },
            ],
        ),
        builtin(
            "schedule_consistency",
            "Compare planned and documented task dates",
            vec![
                ComparisonRule::ExactMatch {
                    items: s("/tasks"),
                    key: s("task"),
                    expected: s("planned_start"),
                    actual: s("actual_start"),
                    severity: Severity::Warning,
                },
                ComparisonRule::ExactMatch {
                    items: s("/tasks"),
                    key: s("task"),
                    expected: s("planned_finish"),
                    actual: s("actual_finish"),
                    severity: Severity::Warning,
                },
                ComparisonRule::NumericTolerance {
                    items: s("/tasks"),
                    key: s("task"),
                    expected: s("planned_duration_days"),
                    actual: s("actual_duration_days"),
                    warning_percent: 10.0,
                    critical_percent: 25.0,
                },
            ],
        ),
        builtin(
            "safety_checklist",
            "Verify required safety checklist items are present and satisfied",
            vec![
                ComparisonRule::ExactMatch {
                    items: s("/checks"),
                    key: s("check"),
                    expected: s("required"),
                    actual: s("observed"),
                    severity: Severity::Critical,
                },
                ComparisonRule::Presence {
                    items: s("/checks"),
                    key: s("check"),
                    expected: s("required"),
                    actual: s("observed"),
                    missing_severity: Severity::Critical,
                    extra_severity: Severity::Info,
                },
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> AnalysisCatalog {
        AnalysisCatalog::new(default_analysis_types())
    }

    fn invoice() -> AnalysisType {
        AnalysisType::new("invoice-reconciliation").unwrap()
    }

    #[test]
    fn test_invoice_tolerance_bands() {
        let result = json!({
            "line_items": [
                {"description": "Timber 90x45", "expected_quantity": 100, "invoiced_quantity": 105},
                {"description": "Plasterboard", "expected_quantity": 40, "invoiced_quantity": 46},
                {"description": "Water Tank 400L", "expected_quantity": 2, "invoiced_quantity": 3}
            ]
        });

        let extraction = catalog().extract(&result, &invoice()).unwrap();

        assert_eq!(extraction.discrepancies.len(), 2);
        assert_eq!(extraction.discrepancies[0].location, "Plasterboard");
        assert_eq!(extraction.discrepancies[0].severity, Severity::Warning);
        assert_eq!(extraction.discrepancies[0].difference_percent, Some(15.0));
        assert_eq!(extraction.discrepancies[1].location, "Water Tank 400L");
        assert_eq!(extraction.discrepancies[1].severity, Severity::Critical);
        assert_eq!(extraction.discrepancies[1].difference_percent, Some(50.0));
        assert_eq!(extraction.items_compared, 3);
        assert_eq!(extraction.items_matched, 1);
    }

    #[test]
    fn test_expected_zero_is_critical() {
        let rules = vec![ComparisonRule::NumericTolerance {
            items: s("/rows"),
            key: s("name"),
            expected: s("e"),
            actual: s("a"),
            warning_percent: 10.0,
            critical_percent: 20.0,
        }];
        let extraction = extract(&json!({"rows": [{"name": "x", "e": 0, "a": 1}]}), &rules).unwrap();

        assert_eq!(extraction.discrepancies.len(), 1);
        assert_eq!(extraction.discrepancies[0].severity, Severity::Critical);
        assert_eq!(extraction.discrepancies[0].difference_percent, None);
    }

    #[test]
    fn test_non_finite_quantities_are_malformed() {
        let result = json!({
            "line_items": [
                {"description": "Rebar", "expected_quantity": 10, "invoiced_quantity": "1e400"}
            ]
        });

        let err = catalog().extract(&result, &invoice()).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedResult(_)), "{}", err);
    }

    #[test]
    fn test_overflowing_difference_is_critical_without_percent() {
        let result = json!({
            "line_items": [
                {"description": "Rebar", "expected_quantity": 1e-300, "invoiced_quantity": 1e300}
            ]
        });

        let extraction = catalog().extract(&result, &invoice()).unwrap();
        assert_eq!(extraction.discrepancies.len(), 1);
        let d = &extraction.discrepancies[0];
        assert_eq!(d.severity, Severity::Critical);
        assert_eq!(d.difference_percent, None);
        assert!(!d.recommendation.as_deref().unwrap().contains("inf"));

        // Survives the JSON column unchanged
        let stored = serde_json::to_string(&extraction.discrepancies).unwrap();
        let restored: Vec<Discrepancy> = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, extraction.discrepancies);
    }

    #[test]
    fn test_presence_missing_and_extra() {
        let result = json!({
            "line_items": [
                {"description": "Scaffold hire", "expected_quantity": 1},
                {"description": "Skip bin", "invoiced_quantity": 2}
            ]
        });

        let extraction = catalog().extract(&result, &invoice()).unwrap();
        let kinds: Vec<_> = extraction.discrepancies.iter().map(|d| d.kind).collect();

        assert_eq!(
            kinds,
            vec![DiscrepancyKind::MissingFromActual, DiscrepancyKind::ExtraInActual]
        );
        assert_eq!(extraction.discrepancies[0].actual, Value::Null);
        assert_eq!(extraction.items_matched, 0);
    }

    #[test]
    fn test_reported_findings_pass_through() {
        let result = json!({
            "items": [],
            "discrepancies": [
                {"item": "Smoke Detector", "plan_quantity": 8, "severity": "medium",
                 "recommendation": "Add to estimate - required by building code"},
                {"item": "Downlight", "severity": "HIGH", "difference_percent": 33.333}
            ]
        });

        let plan_review = AnalysisType::new("plan_review").unwrap();
        let extraction = catalog().extract(&result, &plan_review).unwrap();

        assert_eq!(extraction.discrepancies.len(), 2);
        let first = &extraction.discrepancies[0];
        assert_eq!(first.kind, DiscrepancyKind::Reported);
        assert_eq!(first.severity, Severity::Warning);
        assert_eq!(first.actual, json!(8));
        assert_eq!(
            first.recommendation.as_deref(),
            Some("Add to estimate - required by building code")
        );
        assert_eq!(extraction.discrepancies[1].severity, Severity::Critical);
        assert_eq!(extraction.discrepancies[1].difference_percent, Some(33.33));
        assert_eq!(extraction.items_compared, 0);
    }

    #[test]
    fn test_exact_match_for_schedule_dates() {
        let result = json!({
            "tasks": [
                {"task": "Frame inspection", "planned_start": "2025-04-01", "actual_start": "2025-04-03"},
                {"task": "Roofing", "planned_start": "2025-04-10", "actual_start": "2025-04-10"}
            ]
        });
        let schedule = AnalysisType::new("schedule_consistency").unwrap();

        let extraction = catalog().extract(&result, &schedule).unwrap();

        assert_eq!(extraction.discrepancies.len(), 1);
        assert_eq!(extraction.discrepancies[0].kind, DiscrepancyKind::ValueMismatch);
        assert_eq!(extraction.discrepancies[0].field.as_deref(), Some("planned_start"));
        assert_eq!(extraction.items_compared, 2);
        assert_eq!(extraction.items_matched, 1);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let result = json!({
            "line_items": [
                {"description": "A", "expected_quantity": 10, "invoiced_quantity": 30,
                 "expected_amount": 100.0, "invoiced_amount": 103.0},
                {"description": "B", "expected_quantity": 5},
                {"description": "C", "invoiced_quantity": "7"}
            ]
        });

        let first = catalog().extract(&result, &invoice()).unwrap();
        for _ in 0..10 {
            assert_eq!(catalog().extract(&result, &invoice()).unwrap(), first);
        }
    }

    #[test]
    fn test_absent_items_yield_nothing() {
        let extraction = catalog().extract(&json!({"summary": "ok"}), &invoice()).unwrap();
        assert!(extraction.discrepancies.is_empty());
        assert_eq!(extraction.items_compared, 0);
    }

    #[test]
    fn test_malformed_results_rejected() {
        let c = catalog();
        for bad in [
            json!([1, 2, 3]),
            json!("text"),
            json!({"line_items": {"description": "not an array"}}),
            json!({"line_items": [42]}),
            json!({"line_items": [{"description": "x", "expected_quantity": "lots", "invoiced_quantity": 1}]}),
        ] {
            let err = c.extract(&bad, &invoice()).unwrap_err();
            assert!(matches!(err, AnalysisError::MalformedResult(_)), "{}", bad);
        }
    }

    #[test]
    fn test_catalog_resolve() {
        let c = catalog();
        assert_eq!(
            c.resolve("Invoice-Reconciliation").unwrap().as_str(),
            "invoice_reconciliation"
        );
        assert!(matches!(
            c.resolve("roof_inspection"),
            Err(AnalysisError::UnknownAnalysisType(_))
        ));
        assert!(matches!(
            c.resolve("bad name"),
            Err(AnalysisError::UnknownAnalysisType(_))
        ));
    }

    #[test]
    fn test_rule_validation() {
        let bad_band = ComparisonRule::NumericTolerance {
            items: s("/x"),
            key: s("k"),
            expected: s("e"),
            actual: s("a"),
            warning_percent: 30.0,
            critical_percent: 20.0,
        };
        assert!(bad_band.validate().is_err());

        let bad_pointer = ComparisonRule::ExactMatch {
            items: s("x"),
            key: s("k"),
            expected: s("e"),
            actual: s("a"),
            severity: Severity::Info,
        };
        assert!(bad_pointer.validate().is_err());

        for t in default_analysis_types() {
            for rule in &t.rules {
                assert!(rule.validate().is_ok());
            }
        }
    }

    #[test]
    fn test_rules_parse_from_toml() {
        let toml_src = r#"
            name = "roof_inspection"
            description = "Roof sheet counts"

            [[rules]]
            kind = "numeric_tolerance"
            items = "/sheets"
            key = "profile"
            expected = "ordered"
            actual = "installed"

            [[rules]]
            kind = "reported"
            items = "/notes"
        "#;

        let parsed: AnalysisTypeConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.name.as_str(), "roof_inspection");
        assert_eq!(parsed.rules.len(), 2);
        match &parsed.rules[0] {
            ComparisonRule::NumericTolerance {
                warning_percent,
                critical_percent,
                ..
            } => {
                assert_eq!(*warning_percent, 10.0);
                assert_eq!(*critical_percent, 20.0);
            }
            other => panic!("unexpected rule {:?}", other),
        }
    }
}
