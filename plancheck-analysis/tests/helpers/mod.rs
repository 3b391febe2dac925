//! Shared fixtures for plancheck-analysis integration tests
//!
//! Each test gets its own temp-file SQLite database seeded with two projects
//! and a handful of documents, plus a scripted in-process provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use plancheck_analysis::config::{DatabaseConfig, DispatcherConfig};
use plancheck_analysis::db::documents::{insert_document, insert_project};
use plancheck_analysis::db::{self, AnalysisStore, SqliteDocumentDirectory};
use plancheck_analysis::models::{AnalysisRecord, AnalysisType};
use plancheck_analysis::services::extraction::default_analysis_types;
use plancheck_analysis::services::{
    AnalysisCatalog, AnalysisProvider, Dispatcher, DocumentInfo, ProviderError, ProviderOutput,
};
use plancheck_common::events::EventBus;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const PROJECT: i64 = 1;
pub const OTHER_PROJECT: i64 = 2;
/// Documents 42 and 7, plus 201..=210, live in `PROJECT`
pub const BULK_DOCUMENTS: std::ops::RangeInclusive<i64> = 201..=210;
/// Lives in `OTHER_PROJECT`
pub const FOREIGN_DOCUMENT: i64 = 300;

/// What the provider does for one (document, analysis type)
#[derive(Clone)]
pub enum Script {
    Respond(Value),
    Fail(String),
    Malformed(String),
    /// Sleep, then respond
    Delay(Duration, Value),
    /// Wait until the gate is notified, then respond
    Gate(Arc<Notify>, Value),
    Panic,
}

pub struct ScriptedProvider {
    scripts: Mutex<HashMap<(i64, String), Script>>,
    default: Script,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(default: Script) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, document_id: i64, analysis_type: &str, script: Script) {
        let key = (document_id, AnalysisType::new(analysis_type).unwrap().to_string());
        self.scripts.lock().unwrap().insert(key, script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lookup(&self, document_id: i64, analysis_type: &AnalysisType) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(&(document_id, analysis_type.to_string()))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(
        &self,
        document: &DocumentInfo,
        analysis_type: &AnalysisType,
    ) -> Result<ProviderOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        match self.lookup(document.id, analysis_type) {
            Script::Respond(result) => Ok(ProviderOutput { result }),
            Script::Fail(msg) => Err(ProviderError::Failed(msg)),
            Script::Malformed(msg) => Err(ProviderError::Malformed(msg)),
            Script::Delay(delay, result) => {
                tokio::time::sleep(delay).await;
                Ok(ProviderOutput { result })
            }
            Script::Gate(gate, result) => {
                gate.notified().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(ProviderOutput { result })
            }
            Script::Panic => panic!("scripted provider panic"),
        }
    }
}

pub struct TestContext {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub dispatcher: Dispatcher,
    pub provider: Arc<ScriptedProvider>,
    pub shutdown: CancellationToken,
}

impl TestContext {
    pub fn store(&self) -> &AnalysisStore {
        self.dispatcher.store()
    }

    /// A second dispatcher on the same database, as after a restart
    pub fn restart(&self, config: DispatcherConfig, provider: Arc<ScriptedProvider>) -> Dispatcher {
        build_dispatcher(&self.pool, config, provider, CancellationToken::new())
    }
}

pub fn dispatcher_config(workers: usize, timeout_secs: u64) -> DispatcherConfig {
    DispatcherConfig {
        max_concurrent_analyses: workers,
        provider_timeout_secs: timeout_secs,
        recover_on_startup: true,
        event_capacity: 256,
        ..DispatcherConfig::default()
    }
}

fn build_dispatcher(
    pool: &SqlitePool,
    config: DispatcherConfig,
    provider: Arc<ScriptedProvider>,
    shutdown: CancellationToken,
) -> Dispatcher {
    Dispatcher::new(
        AnalysisStore::new(pool.clone(), 5000),
        Arc::new(SqliteDocumentDirectory::new(pool.clone())),
        provider,
        AnalysisCatalog::new(default_analysis_types()),
        &config,
        EventBus::new(config.event_capacity),
        shutdown,
    )
}

pub async fn setup(config: DispatcherConfig, provider: ScriptedProvider) -> TestContext {
    let dir = TempDir::new().unwrap();
    let pool = db::init_database_pool(&dir.path().join("plancheck.db"), &DatabaseConfig::default())
        .await
        .unwrap();

    insert_project(&pool, PROJECT, "Harbour View Townhouses").await.unwrap();
    insert_project(&pool, OTHER_PROJECT, "Hillside Extension").await.unwrap();

    let mut documents = vec![
        doc(42, PROJECT, "Supplier invoice 1187", "Invoices"),
        doc(7, PROJECT, "Master schedule rev C", "Schedules"),
        doc(FOREIGN_DOCUMENT, OTHER_PROJECT, "Hillside contract", "Contracts"),
    ];
    for id in BULK_DOCUMENTS {
        documents.push(doc(id, PROJECT, &format!("Plan sheet {}", id), "Plans"));
    }
    for d in &documents {
        insert_document(&pool, d).await.unwrap();
    }

    let provider = Arc::new(provider);
    let shutdown = CancellationToken::new();
    let dispatcher = build_dispatcher(&pool, config, provider.clone(), shutdown.clone());

    TestContext {
        dir,
        pool,
        dispatcher,
        provider,
        shutdown,
    }
}

fn doc(id: i64, project_id: i64, title: &str, category: &str) -> DocumentInfo {
    DocumentInfo {
        id,
        project_id,
        title: title.to_string(),
        category: Some(category.to_string()),
    }
}

/// Poll until the record is terminal or the deadline passes
pub async fn wait_for_terminal(store: &AnalysisStore, id: Uuid, deadline: Duration) -> AnalysisRecord {
    let start = tokio::time::Instant::now();
    loop {
        let record = store.get(id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        assert!(
            start.elapsed() < deadline,
            "analysis {} still {} after {:?}",
            id,
            record.status,
            deadline
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the record reaches `processing`
pub async fn wait_for_processing(store: &AnalysisStore, id: Uuid) {
    for _ in 0..500 {
        let record = store.get(id).await.unwrap();
        if record.status != plancheck_analysis::models::AnalysisStatus::Pending {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis {} never left pending", id);
}

/// Invoice result with two out-of-tolerance lines and one clean line
pub fn invoice_with_two_discrepancies() -> Value {
    json!({
        "line_items": [
            {"description": "Timber 90x45", "expected_quantity": 100, "invoiced_quantity": 105},
            {"description": "Plasterboard", "expected_quantity": 40, "invoiced_quantity": 46},
            {"description": "Water Tank 400L", "expected_quantity": 2, "invoiced_quantity": 3}
        ]
    })
}

pub fn clean_contract() -> Value {
    json!({
        "terms": [
            {"term": "Retention", "expected": "5%", "actual": "5%"},
            {"term": "Defects period", "expected": "12 months", "actual": "12 months"}
        ]
    })
}
