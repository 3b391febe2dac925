//! Filtered, recency-ordered listing of a project's analyses

use crate::db::AnalysisStore;
use crate::error::AnalysisResult;
use crate::models::{discrepancy::count_at_least, AnalysisRecord, AnalysisStatus, AnalysisType, Severity};
use crate::services::aggregator::Summary;

/// Conjunctive listing filters; `None` means unfiltered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFilter {
    pub status: Option<AnalysisStatus>,
    pub analysis_type: Option<AnalysisType>,
    pub document_id: Option<i64>,
    /// Keep only records with a discrepancy at or above this severity
    pub min_severity: Option<Severity>,
}

impl AnalysisFilter {
    pub fn matches(&self, record: &AnalysisRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self
                .analysis_type
                .as_ref()
                .map_or(true, |t| &record.analysis_type == t)
            && self.document_id.map_or(true, |d| record.document_id == d)
            && self
                .min_severity
                .map_or(true, |min| count_at_least(&record.discrepancies, min) > 0)
    }
}

/// Records of a project matching `filter`, newest first
///
/// Status, type and document are filtered in SQL; the severity filter needs
/// the decoded discrepancy list and is applied afterwards, keeping order.
/// No match is an empty list, never an error.
pub async fn list_analyses(
    store: &AnalysisStore,
    project_id: i64,
    filter: &AnalysisFilter,
) -> AnalysisResult<Vec<AnalysisRecord>> {
    let records = store.list(project_id, filter).await?;
    Ok(retain_severity(records, filter))
}

/// `list_analyses` plus the project summary, both from one read snapshot
pub async fn list_with_summary(
    store: &AnalysisStore,
    project_id: i64,
    filter: &AnalysisFilter,
) -> AnalysisResult<(Vec<AnalysisRecord>, Summary)> {
    let (records, summary) = store.list_with_summary(project_id, filter).await?;
    Ok((retain_severity(records, filter), summary))
}

fn retain_severity(mut records: Vec<AnalysisRecord>, filter: &AnalysisFilter) -> Vec<AnalysisRecord> {
    if let Some(min) = filter.min_severity {
        records.retain(|r| count_at_least(&r.discrepancies, min) > 0);
    }
    records
}
