//! Analysis record store
//!
//! Every mutation is a single SQL statement, so readers observe either the
//! old or the new row and never a half-applied transition. The
//! `pending → processing` claim is a conditional UPDATE guarded by the
//! current status; the in-flight partial unique index guards creation.

use chrono::{DateTime, Utc};
use plancheck_common::time::{format_timestamp, parse_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalysisRecord, AnalysisStatus, AnalysisType, Discrepancy, Transition};
use crate::services::aggregator::Summary;
use crate::services::query::AnalysisFilter;
use crate::utils::db_retry::retry_on_lock;

const COLUMNS: &str = "id, document_id, project_id, analysis_type, status, result, discrepancies, \
     items_compared, items_matched, error, created_at, processing_started_at, processing_completed_at";

/// Bounded re-reads when a competing in-flight record finishes between our
/// failed insert and the follow-up lookup
const MAX_SUBMIT_ATTEMPTS: usize = 5;

/// Result of an idempotent submission
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record: AnalysisRecord,
    /// False when an existing in-flight record was returned
    pub created: bool,
}

#[derive(Clone)]
pub struct AnalysisStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl AnalysisStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new `pending` record unless the pair already has one in flight
    ///
    /// Returns `None` when the in-flight slot for (document, type) is taken.
    pub async fn try_create(
        &self,
        document_id: i64,
        project_id: i64,
        analysis_type: &AnalysisType,
    ) -> AnalysisResult<Option<AnalysisRecord>> {
        let record = AnalysisRecord::new(
            document_id,
            project_id,
            analysis_type.clone(),
            plancheck_common::time::now(),
        );

        let id = record.id.to_string();
        let created_at = format_timestamp(&record.created_at);

        let inserted = retry_on_lock("create_analysis", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO document_analyses (
                    id, document_id, project_id, analysis_type, status, discrepancies, created_at
                ) VALUES (?, ?, ?, ?, 'pending', '[]', ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&id)
            .bind(document_id)
            .bind(project_id)
            .bind(analysis_type.as_str())
            .bind(&created_at)
            .execute(&self.pool)
            .await?;

            Ok::<_, AnalysisError>(result.rows_affected() == 1)
        })
        .await?;

        Ok(inserted.then_some(record))
    }

    /// Return the in-flight record for the pair, creating one if none exists
    pub async fn submit(
        &self,
        document_id: i64,
        project_id: i64,
        analysis_type: &AnalysisType,
    ) -> AnalysisResult<SubmitOutcome> {
        for _ in 0..MAX_SUBMIT_ATTEMPTS {
            if let Some(record) = self.find_active(document_id, analysis_type).await? {
                return Ok(SubmitOutcome {
                    record,
                    created: false,
                });
            }

            if let Some(record) = self.try_create(document_id, project_id, analysis_type).await? {
                return Ok(SubmitOutcome {
                    record,
                    created: true,
                });
            }

            tracing::debug!(
                document_id,
                analysis_type = %analysis_type,
                "Lost creation race, re-reading in-flight record"
            );
        }

        Err(AnalysisError::Storage(plancheck_common::Error::Internal(format!(
            "could not settle submission for document {} ({}) after {} attempts",
            document_id, analysis_type, MAX_SUBMIT_ATTEMPTS
        ))))
    }

    pub async fn get(&self, id: Uuid) -> AnalysisResult<AnalysisRecord> {
        self.find(id)
            .await?
            .ok_or_else(|| AnalysisError::NotFound(format!("analysis {}", id)))
    }

    pub async fn find(&self, id: Uuid) -> AnalysisResult<Option<AnalysisRecord>> {
        let sql = format!("SELECT {} FROM document_analyses WHERE id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// The `pending` or `processing` record for the pair, if any
    pub async fn find_active(
        &self,
        document_id: i64,
        analysis_type: &AnalysisType,
    ) -> AnalysisResult<Option<AnalysisRecord>> {
        let sql = format!(
            "SELECT {} FROM document_analyses \
             WHERE document_id = ? AND analysis_type = ? AND status IN ('pending', 'processing')",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(document_id)
            .bind(analysis_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Apply a state transition atomically
    ///
    /// The UPDATE only matches when the row is in the transition's required
    /// status. On no match the record is left untouched and the caller gets
    /// `InvalidTransition` (or `NotFound` if the id does not exist).
    pub async fn apply(&self, id: Uuid, transition: Transition) -> AnalysisResult<AnalysisRecord> {
        let target = transition.target_status();
        let sets = match &transition {
            Transition::Start { .. } => "processing_started_at = ?",
            Transition::Complete { .. } => {
                "result = ?, discrepancies = ?, items_compared = ?, items_matched = ?, \
                 processing_completed_at = ?"
            }
            Transition::Fail { .. } => "error = ?, processing_completed_at = ?",
        };
        let sql = format!(
            "UPDATE document_analyses SET status = ?, {} WHERE id = ? AND status = ? RETURNING {}",
            sets, COLUMNS
        );
        let operation = format!("transition to {}", target);

        let row = retry_on_lock(&operation, self.max_lock_wait_ms, || {
            let query = bind_transition(&sql, &transition, id);
            async move { Ok::<_, AnalysisError>(query?.fetch_optional(&self.pool).await?) }
        })
        .await?;

        match row {
            Some(row) => row_to_record(&row),
            None => match self.find(id).await? {
                Some(current) => Err(AnalysisError::InvalidTransition {
                    from: current.status,
                    to: target,
                }),
                None => Err(AnalysisError::NotFound(format!("analysis {}", id))),
            },
        }
    }

    /// Records of a project matching the SQL-expressible filters, newest first
    pub async fn list(
        &self,
        project_id: i64,
        filter: &AnalysisFilter,
    ) -> AnalysisResult<Vec<AnalysisRecord>> {
        list_in(&self.pool, project_id, filter).await
    }

    /// Per-status counts for a project from a single statement
    pub async fn summary(&self, project_id: i64) -> AnalysisResult<Summary> {
        summary_in(&self.pool, project_id).await
    }

    /// Filtered records and project counts read from one snapshot
    ///
    /// Both SELECTs run inside one read transaction, so a record listed as
    /// `processing` is never counted as `completed` in the same response.
    pub async fn list_with_summary(
        &self,
        project_id: i64,
        filter: &AnalysisFilter,
    ) -> AnalysisResult<(Vec<AnalysisRecord>, Summary)> {
        let mut tx = self.pool.begin().await?;
        let records = list_in(&mut *tx, project_id, filter).await?;
        let summary = summary_in(&mut *tx, project_id).await?;
        tx.commit().await?;
        Ok((records, summary))
    }

    /// All records with the given status across projects, oldest first
    pub async fn list_by_status(&self, status: AnalysisStatus) -> AnalysisResult<Vec<AnalysisRecord>> {
        let sql = format!(
            "SELECT {} FROM document_analyses WHERE status = ? ORDER BY created_at ASC, rowid ASC",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    /// `processing` records whose claim is older than `started_before`
    pub async fn list_stale_processing(
        &self,
        started_before: DateTime<Utc>,
    ) -> AnalysisResult<Vec<AnalysisRecord>> {
        let sql = format!(
            "SELECT {} FROM document_analyses \
             WHERE status = 'processing' AND processing_started_at < ? \
             ORDER BY processing_started_at ASC",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(format_timestamp(&started_before))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }
}

async fn list_in<'e, E>(
    executor: E,
    project_id: i64,
    filter: &AnalysisFilter,
) -> AnalysisResult<Vec<AnalysisRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM document_analyses WHERE project_id = ",
        COLUMNS
    ));
    builder.push_bind(project_id);

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(analysis_type) = &filter.analysis_type {
        builder
            .push(" AND analysis_type = ")
            .push_bind(analysis_type.as_str().to_string());
    }
    if let Some(document_id) = filter.document_id {
        builder.push(" AND document_id = ").push_bind(document_id);
    }

    builder.push(" ORDER BY created_at DESC, rowid DESC");

    let rows = builder.build().fetch_all(executor).await?;
    rows.iter().map(row_to_record).collect()
}

async fn summary_in<'e, E>(executor: E, project_id: i64) -> AnalysisResult<Summary>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(status = 'pending'), 0) AS pending,
            COALESCE(SUM(status = 'processing'), 0) AS processing,
            COALESCE(SUM(status = 'completed'), 0) AS completed,
            COALESCE(SUM(status = 'failed'), 0) AS failed,
            COALESCE(SUM(status = 'completed' AND json_array_length(discrepancies) > 0), 0)
                AS with_discrepancies
        FROM document_analyses
        WHERE project_id = ?
        "#,
    )
    .bind(project_id)
    .fetch_one(executor)
    .await?;

    Ok(Summary {
        pending: row.try_get::<i64, _>("pending")? as u64,
        processing: row.try_get::<i64, _>("processing")? as u64,
        completed: row.try_get::<i64, _>("completed")? as u64,
        failed: row.try_get::<i64, _>("failed")? as u64,
        with_discrepancies: row.try_get::<i64, _>("with_discrepancies")? as u64,
    })
}

/// Bind a transition UPDATE in placeholder order
fn bind_transition<'q>(
    sql: &'q str,
    transition: &Transition,
    id: Uuid,
) -> AnalysisResult<sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>> {
    let mut query = sqlx::query(sql).bind(transition.target_status().as_str());

    query = match transition {
        Transition::Start { at } => query.bind(format_timestamp(at)),
        Transition::Complete {
            result,
            extraction,
            at,
        } => query
            .bind(serde_json::to_string(result).map_err(encode_error)?)
            .bind(serde_json::to_string(&extraction.discrepancies).map_err(encode_error)?)
            .bind(extraction.items_compared as i64)
            .bind(extraction.items_matched as i64)
            .bind(format_timestamp(at)),
        Transition::Fail { error, at } => query.bind(error.clone()).bind(format_timestamp(at)),
    };

    Ok(query
        .bind(id.to_string())
        .bind(transition.required_status().as_str()))
}

fn encode_error(e: serde_json::Error) -> AnalysisError {
    AnalysisError::Storage(plancheck_common::Error::Internal(format!(
        "failed to encode analysis payload: {}",
        e
    )))
}

fn decode_error(column: &str, detail: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Storage(plancheck_common::Error::Internal(format!(
        "corrupt {} column: {}",
        column, detail
    )))
}

fn optional_timestamp(row: &SqliteRow, column: &str) -> AnalysisResult<Option<DateTime<Utc>>> {
    let value: Option<String> = row.try_get(column)?;
    value
        .map(|s| parse_timestamp(&s).map_err(|e| decode_error(column, e)))
        .transpose()
}

fn row_to_record(row: &SqliteRow) -> AnalysisResult<AnalysisRecord> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id).map_err(|e| decode_error("id", e))?;

    let analysis_type: String = row.try_get("analysis_type")?;
    let analysis_type =
        AnalysisType::new(&analysis_type).map_err(|e| decode_error("analysis_type", e))?;

    let status: String = row.try_get("status")?;
    let status: AnalysisStatus = status.parse().map_err(|e: String| decode_error("status", e))?;

    let result: Option<String> = row.try_get("result")?;
    let result = result
        .map(|s| serde_json::from_str(&s).map_err(|e| decode_error("result", e)))
        .transpose()?;

    let discrepancies: String = row.try_get("discrepancies")?;
    let discrepancies: Vec<Discrepancy> =
        serde_json::from_str(&discrepancies).map_err(|e| decode_error("discrepancies", e))?;

    let created_at: String = row.try_get("created_at")?;
    let created_at = parse_timestamp(&created_at).map_err(|e| decode_error("created_at", e))?;

    Ok(AnalysisRecord {
        id,
        document_id: row.try_get("document_id")?,
        project_id: row.try_get("project_id")?,
        analysis_type,
        status,
        result,
        discrepancies,
        items_compared: row
            .try_get::<Option<i64>, _>("items_compared")?
            .map(|n| n as u32),
        items_matched: row
            .try_get::<Option<i64>, _>("items_matched")?
            .map(|n| n as u32),
        error: row.try_get("error")?,
        created_at,
        processing_started_at: optional_timestamp(row, "processing_started_at")?,
        processing_completed_at: optional_timestamp(row, "processing_completed_at")?,
    })
}
