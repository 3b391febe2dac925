//! Summary counts and per-record derived metrics
//!
//! Nothing here is stored; every value is recomputed from committed state at
//! read time, so it can never drift from the records it describes.

use serde::{Deserialize, Serialize};

use crate::db::AnalysisStore;
use crate::error::AnalysisResult;
use crate::models::{AnalysisRecord, AnalysisStatus, Severity};

/// Points deducted from the confidence score per discrepancy
const CRITICAL_PENALTY: f64 = 5.0;
const WARNING_PENALTY: f64 = 3.0;
const INFO_PENALTY: f64 = 2.0;

/// Per-status counts for one project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Completed records with at least one discrepancy
    pub with_discrepancies: u64,
}

impl Summary {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn count(&self, status: AnalysisStatus) -> u64 {
        match status {
            AnalysisStatus::Pending => self.pending,
            AnalysisStatus::Processing => self.processing,
            AnalysisStatus::Completed => self.completed,
            AnalysisStatus::Failed => self.failed,
        }
    }
}

/// Counts for a project, taken from one consistent snapshot
pub async fn summary(store: &AnalysisStore, project_id: i64) -> AnalysisResult<Summary> {
    store.summary(project_id).await
}

/// Time spent processing, absent while in flight or never started
pub fn processing_duration(record: &AnalysisRecord) -> Option<std::time::Duration> {
    record
        .processing_duration()
        .and_then(|d| d.to_std().ok())
}

pub fn processing_duration_ms(record: &AnalysisRecord) -> Option<i64> {
    record.processing_duration().map(|d| d.num_milliseconds())
}

/// Share of compared items that matched, less a penalty per discrepancy
///
/// Only defined for completed records that compared at least one item.
/// Floored at 0 and rounded to two decimals.
pub fn confidence_score(record: &AnalysisRecord) -> Option<f64> {
    if record.status != AnalysisStatus::Completed {
        return None;
    }

    let compared = record.items_compared.filter(|n| *n > 0)?;
    let matched = record.items_matched.unwrap_or(0).min(compared);

    let penalty: f64 = record
        .discrepancies
        .iter()
        .map(|d| match d.severity {
            Severity::Critical => CRITICAL_PENALTY,
            Severity::Warning => WARNING_PENALTY,
            Severity::Info => INFO_PENALTY,
        })
        .sum();

    let score = f64::from(matched) / f64::from(compared) * 100.0 - penalty;
    Some((score.max(0.0) * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisType, Discrepancy, DiscrepancyKind, Extraction, Transition};
    use chrono::{Duration, Utc};
    use serde_json::Value;

    fn completed(compared: u32, matched: u32, severities: &[Severity]) -> AnalysisRecord {
        let mut record = AnalysisRecord::new(1, 1, AnalysisType::new("plan_review").unwrap(), Utc::now());
        let started = Utc::now();
        record.apply(Transition::Start { at: started }).unwrap();
        record
            .apply(Transition::Complete {
                result: Value::Null,
                extraction: Extraction {
                    discrepancies: severities
                        .iter()
                        .map(|s| Discrepancy {
                            kind: DiscrepancyKind::QuantityMismatch,
                            location: "x".into(),
                            field: None,
                            expected: Value::Null,
                            actual: Value::Null,
                            difference_percent: None,
                            severity: *s,
                            recommendation: None,
                        })
                        .collect(),
                    items_compared: compared,
                    items_matched: matched,
                },
                at: started + Duration::milliseconds(1500),
            })
            .unwrap();
        record
    }

    #[test]
    fn test_confidence_score() {
        // 8/10 matched = 80, minus 5 + 3 = 72
        let r = completed(10, 8, &[Severity::Critical, Severity::Warning]);
        assert_eq!(confidence_score(&r), Some(72.0));

        let perfect = completed(4, 4, &[]);
        assert_eq!(confidence_score(&perfect), Some(100.0));

        let floor = completed(3, 0, &[Severity::Critical; 3]);
        assert_eq!(confidence_score(&floor), Some(0.0));

        let thirds = completed(3, 2, &[Severity::Info]);
        assert_eq!(confidence_score(&thirds), Some(64.67));
    }

    #[test]
    fn test_confidence_absent_without_comparisons() {
        assert_eq!(confidence_score(&completed(0, 0, &[Severity::Info])), None);

        let pending = AnalysisRecord::new(1, 1, AnalysisType::new("plan_review").unwrap(), Utc::now());
        assert_eq!(confidence_score(&pending), None);
    }

    #[test]
    fn test_processing_duration() {
        let r = completed(1, 1, &[]);
        assert_eq!(processing_duration_ms(&r), Some(1500));
        assert_eq!(
            processing_duration(&r),
            Some(std::time::Duration::from_millis(1500))
        );

        let pending = AnalysisRecord::new(1, 1, AnalysisType::new("plan_review").unwrap(), Utc::now());
        assert_eq!(processing_duration(&pending), None);
    }

    #[test]
    fn test_summary_total_and_count() {
        let s = Summary {
            pending: 1,
            processing: 2,
            completed: 3,
            failed: 4,
            with_discrepancies: 2,
        };
        assert_eq!(s.total(), 10);
        let by_status: u64 = AnalysisStatus::ALL.iter().map(|st| s.count(*st)).sum();
        assert_eq!(by_status, s.total());
    }
}
