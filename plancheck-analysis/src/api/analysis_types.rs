//! Configured analysis types

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::models::AnalysisType;
use crate::services::AnalysisTypeConfig;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AnalysisTypesResponse {
    pub default: &'static str,
    pub analysis_types: Vec<AnalysisTypeConfig>,
}

/// GET /analysis-types
pub async fn list_analysis_types(State(state): State<AppState>) -> Json<AnalysisTypesResponse> {
    Json(AnalysisTypesResponse {
        default: AnalysisType::DEFAULT,
        analysis_types: state.dispatcher.catalog().types().to_vec(),
    })
}

pub fn analysis_type_routes() -> Router<AppState> {
    Router::new().route("/analysis-types", get(list_analysis_types))
}
