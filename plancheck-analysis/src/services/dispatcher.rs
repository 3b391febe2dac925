//! Analysis dispatcher
//!
//! Accepts submissions, keeps at most one in-flight record per
//! (document, analysis type), and drives each record through the state
//! machine on a bounded worker pool.
//!
//! Submission and processing are decoupled: `submit` returns as soon as the
//! record is stored, and the scheduled task keeps running even if the caller
//! goes away. The only thing that stops new work is the shutdown token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plancheck_common::events::{AnalysisEvent, EventBus};
use plancheck_common::time::now;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::db::{AnalysisStore, SubmitOutcome};
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalysisRecord, AnalysisStatus, Extraction, Transition};
use crate::services::documents::DocumentDirectory;
use crate::services::extraction::AnalysisCatalog;
use crate::services::provider::AnalysisProvider;

/// Error recorded on records orphaned by a previous process
pub const INTERRUPTED_ERROR: &str = "interrupted: service restarted before analysis finished";

/// Error recorded on records left `processing` past the provider deadline
pub const STALE_ERROR: &str = "abandoned: analysis exceeded the provider timeout without finishing";

/// Attempts at marking a record failed after its worker could not finish it
const FAIL_ATTEMPTS: u32 = 5;
const FAIL_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of the startup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// `processing` records marked failed
    pub interrupted: usize,
    /// `pending` records handed back to the worker pool
    pub rescheduled: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    store: AnalysisStore,
    documents: Arc<dyn DocumentDirectory>,
    provider: Arc<dyn AnalysisProvider>,
    catalog: AnalysisCatalog,
    permits: Arc<Semaphore>,
    provider_timeout: Duration,
    stale_after: Duration,
    sweep_interval: Option<Duration>,
    sweep_started: AtomicBool,
    events: EventBus,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    last_error: RwLock<Option<String>>,
}

impl Dispatcher {
    pub fn new(
        store: AnalysisStore,
        documents: Arc<dyn DocumentDirectory>,
        provider: Arc<dyn AnalysisProvider>,
        catalog: AnalysisCatalog,
        config: &DispatcherConfig,
        events: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                documents,
                provider,
                catalog,
                permits: Arc::new(Semaphore::new(config.max_concurrent_analyses.max(1))),
                provider_timeout: config.provider_timeout(),
                stale_after: config.stale_after(),
                sweep_interval: config.sweep_interval(),
                sweep_started: AtomicBool::new(false),
                events,
                shutdown,
                tasks: TaskTracker::new(),
                last_error: RwLock::new(None),
            }),
        }
    }

    pub fn store(&self) -> &AnalysisStore {
        &self.inner.store
    }

    pub fn documents(&self) -> &Arc<dyn DocumentDirectory> {
        &self.inner.documents
    }

    pub fn catalog(&self) -> &AnalysisCatalog {
        &self.inner.catalog
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn provider_name(&self) -> &str {
        self.inner.provider.name()
    }

    /// Scheduled or running analysis tasks, not counting the stale sweep
    pub fn active_tasks(&self) -> usize {
        let sweeper = usize::from(self.inner.sweep_started.load(Ordering::Acquire));
        self.inner.tasks.len().saturating_sub(sweeper)
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().await.clone()
    }

    /// Submit an analysis of `document_id` in `project_id`
    ///
    /// Returns the existing in-flight record for the pair if there is one;
    /// otherwise creates a `pending` record and schedules it.
    pub async fn submit(
        &self,
        project_id: i64,
        document_id: i64,
        analysis_type: &str,
    ) -> AnalysisResult<SubmitOutcome> {
        let analysis_type = self.inner.catalog.resolve(analysis_type)?;
        self.inner.documents.resolve(project_id, document_id).await?;

        let outcome = self
            .inner
            .store
            .submit(document_id, project_id, &analysis_type)
            .await?;

        if outcome.created {
            tracing::info!(
                analysis_id = %outcome.record.id,
                project_id,
                document_id,
                analysis_type = %analysis_type,
                "Analysis submitted"
            );
            self.emit(&outcome.record, |r, timestamp| AnalysisEvent::AnalysisSubmitted {
                analysis_id: r.id,
                project_id: r.project_id,
                document_id: r.document_id,
                analysis_type: r.analysis_type.to_string(),
                timestamp,
            });
            self.schedule(outcome.record.id);
        } else {
            tracing::debug!(
                analysis_id = %outcome.record.id,
                status = %outcome.record.status,
                "Returning existing in-flight analysis"
            );
        }

        Ok(outcome)
    }

    /// Queue a record for processing on the worker pool
    ///
    /// The task waits for a permit, then runs `process` in its own task so a
    /// panic is caught and recorded instead of orphaning the record.
    pub fn schedule(&self, id: Uuid) {
        let this = self.clone();

        self.inner.tasks.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = this.inner.shutdown.cancelled() => {
                    tracing::debug!(analysis_id = %id, "Shutdown before start, leaving analysis pending");
                    return;
                }
                permit = this.inner.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::error!(analysis_id = %id, "Worker pool closed");
                        return;
                    }
                },
            };

            let worker = this.clone();
            let handle = tokio::spawn(async move { worker.process(id).await });

            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(analysis_id = %id, error = %e, "Analysis processing failed");
                    this.record_error(format!("analysis {}: {}", id, e)).await;
                    this.fail_if_processing(id, &format!("could not store analysis outcome: {}", e))
                        .await;
                }
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        "worker panicked".to_string()
                    } else {
                        format!("worker aborted: {}", join_error)
                    };
                    tracing::error!(analysis_id = %id, reason = %reason, "Analysis worker died");
                    this.record_error(format!("analysis {}: {}", id, reason)).await;
                    this.fail_if_processing(id, &reason).await;
                }
            }

            drop(permit);
        });
    }

    /// Run one record from `pending` to a terminal state
    ///
    /// Losing the `pending → processing` claim to another worker is expected
    /// and returns `Ok` without touching the record. Provider-side failures
    /// are recorded on the record; only storage errors are returned.
    pub async fn process(&self, id: Uuid) -> AnalysisResult<()> {
        let record = match self.inner.store.apply(id, Transition::Start { at: now() }).await {
            Ok(record) => record,
            Err(AnalysisError::InvalidTransition { from, .. }) => {
                tracing::debug!(analysis_id = %id, status = %from, "Analysis already claimed, skipping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            analysis_id = %id,
            analysis_type = %record.analysis_type,
            provider = self.inner.provider.name(),
            "Analysis started"
        );
        self.emit(&record, |r, timestamp| AnalysisEvent::AnalysisStarted {
            analysis_id: r.id,
            project_id: r.project_id,
            document_id: r.document_id,
            analysis_type: r.analysis_type.to_string(),
            timestamp,
        });

        let transition = match self.run_provider(&record).await {
            Ok((result, extraction)) => Transition::Complete {
                result,
                extraction,
                at: now(),
            },
            Err(e) => {
                tracing::warn!(analysis_id = %id, error = %e, "Analysis failed");
                Transition::Fail {
                    error: e.to_string(),
                    at: now(),
                }
            }
        };

        match self.inner.store.apply(id, transition).await {
            Ok(finished) => {
                self.announce_finished(&finished);
                Ok(())
            }
            Err(AnalysisError::InvalidTransition { from, .. }) => {
                tracing::warn!(analysis_id = %id, status = %from, "Analysis finished elsewhere, outcome dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_provider(&self, record: &AnalysisRecord) -> AnalysisResult<(Value, Extraction)> {
        let document = self
            .inner
            .documents
            .find_document(record.document_id)
            .await?
            .ok_or_else(|| AnalysisError::NotFound(format!("document {}", record.document_id)))?;

        let output = tokio::time::timeout(
            self.inner.provider_timeout,
            self.inner.provider.analyze(&document, &record.analysis_type),
        )
        .await
        .map_err(|_| AnalysisError::ProviderTimeout(self.inner.provider_timeout))??;

        let extraction = self.inner.catalog.extract(&output.result, &record.analysis_type)?;
        Ok((output.result, extraction))
    }

    /// Startup sweep: fail orphaned `processing` records, reschedule `pending`
    pub async fn recover(&self) -> AnalysisResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for record in self.inner.store.list_by_status(AnalysisStatus::Processing).await? {
            match self
                .inner
                .store
                .apply(
                    record.id,
                    Transition::Fail {
                        error: INTERRUPTED_ERROR.to_string(),
                        at: now(),
                    },
                )
                .await
            {
                Ok(failed) => {
                    tracing::warn!(analysis_id = %failed.id, "Marked interrupted analysis as failed");
                    self.announce_finished(&failed);
                    report.interrupted += 1;
                }
                Err(AnalysisError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        for record in self.inner.store.list_by_status(AnalysisStatus::Pending).await? {
            self.schedule(record.id);
            report.rescheduled += 1;
        }

        if report.interrupted > 0 || report.rescheduled > 0 {
            tracing::info!(
                interrupted = report.interrupted,
                rescheduled = report.rescheduled,
                "Recovered analyses from previous run"
            );
        }

        Ok(report)
    }

    /// Fail `processing` records claimed longer ago than the provider
    /// timeout plus grace
    ///
    /// No live worker can still be holding such a record: its provider call
    /// has already timed out. Returns how many records were failed.
    pub async fn sweep_stale(&self) -> AnalysisResult<usize> {
        let cutoff = now() - chrono::Duration::from_std(self.inner.stale_after)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let mut failed_count = 0;

        for record in self.inner.store.list_stale_processing(cutoff).await? {
            let transition = Transition::Fail {
                error: STALE_ERROR.to_string(),
                at: now(),
            };
            match self.inner.store.apply(record.id, transition).await {
                Ok(failed) => {
                    tracing::warn!(
                        analysis_id = %failed.id,
                        started_at = ?record.processing_started_at,
                        "Marked stale analysis as failed"
                    );
                    self.announce_finished(&failed);
                    failed_count += 1;
                }
                Err(AnalysisError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(failed_count)
    }

    /// Run `sweep_stale` periodically until shutdown
    ///
    /// Does nothing when `sweep_interval_secs` is 0.
    pub fn start_stale_sweep(&self) {
        let Some(period) = self.inner.sweep_interval else {
            tracing::info!("Stale analysis sweep disabled");
            return;
        };
        if self.inner.sweep_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = self.clone();

        self.inner.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = this.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if let Err(e) = this.sweep_stale().await {
                    tracing::error!(error = %e, "Stale analysis sweep failed");
                    this.record_error(format!("stale sweep: {}", e)).await;
                }
            }

            this.inner.sweep_started.store(false, Ordering::Release);
        });
    }

    /// Stop starting new work and wait for running analyses to finish
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        tracing::info!("Dispatcher stopped");
    }

    /// Best effort: a record still `processing` after its worker gave up is
    /// marked failed, retrying storage errors a bounded number of times.
    /// Whatever slips through is left for `sweep_stale`.
    async fn fail_if_processing(&self, id: Uuid, reason: &str) {
        let mut backoff = FAIL_INITIAL_BACKOFF;

        for attempt in 1..=FAIL_ATTEMPTS {
            let transition = Transition::Fail {
                error: reason.to_string(),
                at: now(),
            };
            match self.inner.store.apply(id, transition).await {
                Ok(failed) => {
                    self.announce_finished(&failed);
                    return;
                }
                Err(AnalysisError::InvalidTransition { .. } | AnalysisError::NotFound(_)) => return,
                Err(e) if attempt < FAIL_ATTEMPTS => {
                    tracing::warn!(analysis_id = %id, attempt, error = %e, "Retrying worker failure record");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    tracing::error!(analysis_id = %id, error = %e, "Could not record worker failure")
                }
            }
        }
    }

    async fn record_error(&self, message: String) {
        *self.inner.last_error.write().await = Some(message);
    }

    fn announce_finished(&self, record: &AnalysisRecord) {
        match record.status {
            AnalysisStatus::Completed => {
                tracing::info!(
                    analysis_id = %record.id,
                    discrepancies = record.discrepancy_count(),
                    "Analysis completed"
                );
                self.emit(record, |r, timestamp| AnalysisEvent::AnalysisCompleted {
                    analysis_id: r.id,
                    project_id: r.project_id,
                    document_id: r.document_id,
                    analysis_type: r.analysis_type.to_string(),
                    discrepancy_count: r.discrepancy_count(),
                    timestamp,
                });
            }
            AnalysisStatus::Failed => {
                self.emit(record, |r, timestamp| AnalysisEvent::AnalysisFailed {
                    analysis_id: r.id,
                    project_id: r.project_id,
                    document_id: r.document_id,
                    analysis_type: r.analysis_type.to_string(),
                    error: r.error.clone().unwrap_or_default(),
                    timestamp,
                });
            }
            AnalysisStatus::Pending | AnalysisStatus::Processing => {}
        }
    }

    fn emit<F>(&self, record: &AnalysisRecord, build: F)
    where
        F: FnOnce(&AnalysisRecord, chrono::DateTime<chrono::Utc>) -> AnalysisEvent,
    {
        self.inner.events.emit_lossy(build(record, now()));
    }
}
