//! Document lookups against the shared `documents` and `projects` tables

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::error::AnalysisResult;
use crate::services::documents::{DocumentDirectory, DocumentInfo};

#[derive(Clone)]
pub struct SqliteDocumentDirectory {
    pool: SqlitePool,
}

impl SqliteDocumentDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentDirectory for SqliteDocumentDirectory {
    async fn find_document(&self, document_id: i64) -> AnalysisResult<Option<DocumentInfo>> {
        let row = sqlx::query("SELECT id, project_id, title, category FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(DocumentInfo {
                id: row.try_get("id")?,
                project_id: row.try_get("project_id")?,
                title: row.try_get("title")?,
                category: row.try_get("category")?,
            })),
            None => Ok(None),
        }
    }

    async fn project_exists(&self, project_id: i64) -> AnalysisResult<bool> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?)")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists != 0)
    }
}

/// Insert a project row (used by tests and local setups)
pub async fn insert_project(pool: &SqlitePool, project_id: i64, name: &str) -> AnalysisResult<()> {
    sqlx::query("INSERT OR REPLACE INTO projects (id, name) VALUES (?, ?)")
        .bind(project_id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert a document row (used by tests and local setups)
pub async fn insert_document(pool: &SqlitePool, doc: &DocumentInfo) -> AnalysisResult<()> {
    sqlx::query("INSERT OR REPLACE INTO documents (id, project_id, title, category) VALUES (?, ?, ?, ?)")
        .bind(doc.id)
        .bind(doc.project_id)
        .bind(&doc.title)
        .bind(&doc.category)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::error::AnalysisError;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteDocumentDirectory) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::init_database_pool(&dir.path().join("d.db"), &DatabaseConfig::default())
            .await
            .unwrap();
        insert_project(&pool, 1, "Harbour View").await.unwrap();
        insert_project(&pool, 2, "Hillside").await.unwrap();
        insert_document(
            &pool,
            &DocumentInfo {
                id: 42,
                project_id: 1,
                title: "Supplier invoice 1187".into(),
                category: Some("Invoices".into()),
            },
        )
        .await
        .unwrap();
        (dir, SqliteDocumentDirectory::new(pool))
    }

    #[tokio::test]
    async fn test_resolve_document_in_project() {
        let (_dir, docs) = setup().await;
        let doc = docs.resolve(1, 42).await.unwrap();
        assert_eq!(doc.title, "Supplier invoice 1187");
        assert_eq!(doc.category.as_deref(), Some("Invoices"));
        assert!(docs.document_exists(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_not_found_cases() {
        let (_dir, docs) = setup().await;
        for (project, document) in [(99, 42), (1, 99), (2, 42)] {
            assert!(matches!(
                docs.resolve(project, document).await,
                Err(AnalysisError::NotFound(_))
            ));
        }
    }
}
