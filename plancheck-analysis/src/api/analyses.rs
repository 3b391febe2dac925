//! Analysis submission, listing and detail endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{AnalysisRecord, AnalysisStatus, AnalysisType, Severity};
use crate::services::{aggregator, query, AnalysisFilter, DocumentInfo, Summary};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    pub analysis_type: Option<String>,
}

/// Raw list query; every value is optional and empty strings mean "unset"
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub analysis_type: Option<String>,
    pub document_id: Option<String>,
    pub min_severity: Option<String>,
}

impl ListParams {
    fn into_filter(self) -> ApiResult<AnalysisFilter> {
        let status = non_empty(self.status)
            .map(|s| s.parse::<AnalysisStatus>())
            .transpose()
            .map_err(ApiError::BadRequest)?;

        let analysis_type = non_empty(self.analysis_type)
            .map(|t| AnalysisType::new(&t))
            .transpose()
            .map_err(ApiError::BadRequest)?;

        let document_id = non_empty(self.document_id)
            .map(|d| parse_id("document_id", &d))
            .transpose()?;

        let min_severity = non_empty(self.min_severity)
            .map(|s| s.parse::<Severity>())
            .transpose()
            .map_err(ApiError::BadRequest)?;

        Ok(AnalysisFilter {
            status,
            analysis_type,
            document_id,
            min_severity,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// Path segments are taken as strings so a malformed id gets the JSON error
// envelope instead of axum's plain-text rejection.
fn parse_id(name: &str, raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid {}: {}", name, raw)))
}

fn parse_uuid(name: &str, raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("invalid {}: {}", name, raw)))
}

/// Record plus derived fields
#[derive(Debug, Serialize)]
pub struct AnalysisView {
    #[serde(flatten)]
    pub record: AnalysisRecord,
    pub discrepancy_count: usize,
    pub processing_duration_ms: Option<i64>,
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentInfo>,
}

impl AnalysisView {
    pub fn new(record: AnalysisRecord) -> Self {
        Self {
            discrepancy_count: record.discrepancy_count(),
            processing_duration_ms: aggregator::processing_duration_ms(&record),
            confidence_score: aggregator::confidence_score(&record),
            document: None,
            record,
        }
    }

    pub fn with_document(mut self, document: Option<DocumentInfo>) -> Self {
        self.document = document;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryView {
    #[serde(flatten)]
    pub counts: Summary,
    pub total: u64,
}

impl From<Summary> for SummaryView {
    fn from(counts: Summary) -> Self {
        Self {
            total: counts.total(),
            counts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<AnalysisView>,
    pub summary: SummaryView,
}

/// POST /projects/:project_id/documents/:document_id/analyses
///
/// 201 with the new record, or 200 with the record already in flight for
/// this document and type. The body may be empty.
pub async fn submit_analysis(
    State(state): State<AppState>,
    Path((project_id, document_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AnalysisView>)> {
    let project_id = parse_id("project_id", &project_id)?;
    let document_id = parse_id("document_id", &document_id)?;

    let request: SubmitRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SubmitRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?
    };

    let analysis_type = non_empty(request.analysis_type)
        .unwrap_or_else(|| AnalysisType::DEFAULT.to_string());

    let outcome = state
        .dispatcher
        .submit(project_id, document_id, &analysis_type)
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(AnalysisView::new(outcome.record))))
}

/// GET /projects/:project_id/analyses
pub async fn list_analyses(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<AnalysisListResponse>> {
    let project_id = parse_id("project_id", &project_id)?;
    let filter = params.into_filter()?;
    let dispatcher = &state.dispatcher;

    if !dispatcher.documents().project_exists(project_id).await? {
        return Err(ApiError::NotFound(format!("project {}", project_id)));
    }

    let (records, summary) =
        query::list_with_summary(dispatcher.store(), project_id, &filter).await?;

    Ok(Json(AnalysisListResponse {
        analyses: records.into_iter().map(AnalysisView::new).collect(),
        summary: summary.into(),
    }))
}

/// GET /projects/:project_id/analyses/:analysis_id
pub async fn get_analysis(
    State(state): State<AppState>,
    Path((project_id, analysis_id)): Path<(String, String)>,
) -> ApiResult<Json<AnalysisView>> {
    let project_id = parse_id("project_id", &project_id)?;
    let analysis_id = parse_uuid("analysis_id", &analysis_id)?;
    let dispatcher = &state.dispatcher;

    let record = dispatcher
        .store()
        .find(analysis_id)
        .await?
        .filter(|r| r.project_id == project_id)
        .ok_or_else(|| {
            ApiError::NotFound(format!("analysis {} in project {}", analysis_id, project_id))
        })?;

    let document = dispatcher.documents().find_document(record.document_id).await?;

    Ok(Json(AnalysisView::new(record).with_document(document)))
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:project_id/documents/:document_id/analyses",
            post(submit_analysis),
        )
        .route("/projects/:project_id/analyses", get(list_analyses))
        .route("/projects/:project_id/analyses/:analysis_id", get(get_analysis))
}
