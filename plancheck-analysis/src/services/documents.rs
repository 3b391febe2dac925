//! Read-only view of documents and projects
//!
//! Documents and projects are owned by the surrounding application. The
//! pipeline only validates references and reads identification fields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Identification fields of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub category: Option<String>,
}

#[async_trait]
pub trait DocumentDirectory: Send + Sync {
    async fn find_document(&self, document_id: i64) -> AnalysisResult<Option<DocumentInfo>>;

    async fn project_exists(&self, project_id: i64) -> AnalysisResult<bool>;

    async fn document_exists(&self, document_id: i64) -> AnalysisResult<bool> {
        Ok(self.find_document(document_id).await?.is_some())
    }

    /// Resolve a document that must belong to `project_id`
    ///
    /// Unknown project, unknown document, and a document of another project
    /// all report `NotFound`.
    async fn resolve(&self, project_id: i64, document_id: i64) -> AnalysisResult<DocumentInfo> {
        if !self.project_exists(project_id).await? {
            return Err(AnalysisError::NotFound(format!("project {}", project_id)));
        }

        match self.find_document(document_id).await? {
            Some(doc) if doc.project_id == project_id => Ok(doc),
            _ => Err(AnalysisError::NotFound(format!(
                "document {} in project {}",
                document_id, project_id
            ))),
        }
    }
}
