//! SQLite persistence for plancheck-analysis

pub mod analyses;
pub mod documents;

use plancheck_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseConfig;

pub use analyses::{AnalysisStore, SubmitOutcome};
pub use documents::SqliteDocumentDirectory;

/// Open (creating if needed) the database and ensure the schema exists
///
/// Every pooled connection runs in WAL mode with `busy_timeout`, so readers
/// never block on an in-progress transition.
pub async fn init_database_pool(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::debug!(
        path = %db_path.display(),
        max_connections = config.max_connections,
        busy_timeout_ms = config.busy_timeout_ms,
        "Opening database"
    );

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_millis(config.max_lock_wait_ms.max(1000)))
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    tracing::info!(path = %db_path.display(), "Database ready");
    Ok(pool)
}

/// Create tables and indexes if they don't exist
///
/// `projects` and `documents` belong to the surrounding application; they are
/// created here only so a fresh database is usable on its own.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY,
            project_id INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            category TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_analyses (
            id TEXT PRIMARY KEY,
            document_id INTEGER NOT NULL,
            project_id INTEGER NOT NULL,
            analysis_type TEXT NOT NULL,
            status TEXT NOT NULL
                CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
            result TEXT,
            discrepancies TEXT NOT NULL DEFAULT '[]',
            items_compared INTEGER,
            items_matched INTEGER,
            error TEXT,
            created_at TEXT NOT NULL,
            processing_started_at TEXT,
            processing_completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one in-flight record per (document, analysis type)
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_document_analyses_in_flight
            ON document_analyses (document_id, analysis_type)
            WHERE status IN ('pending', 'processing')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_document_analyses_project
            ON document_analyses (project_id, created_at)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_document_analyses_status
            ON document_analyses (status)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Database tables initialized (projects, documents, document_analyses)");
    Ok(())
}
