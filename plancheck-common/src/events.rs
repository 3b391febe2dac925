//! Event types for the plancheck event system
//!
//! Provides shared event definitions and the EventBus used to fan pipeline
//! state changes out to SSE clients and other in-process listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Document analysis lifecycle events
///
/// One event per state change of an analysis record. Serialized with a `type`
/// tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AnalysisEvent {
    /// A new analysis record was created in `pending`
    AnalysisSubmitted {
        analysis_id: Uuid,
        project_id: i64,
        document_id: i64,
        analysis_type: String,
        timestamp: DateTime<Utc>,
    },

    /// A worker claimed the record and is calling the provider
    AnalysisStarted {
        analysis_id: Uuid,
        project_id: i64,
        document_id: i64,
        analysis_type: String,
        timestamp: DateTime<Utc>,
    },

    /// Provider result stored, discrepancies extracted
    AnalysisCompleted {
        analysis_id: Uuid,
        project_id: i64,
        document_id: i64,
        analysis_type: String,
        discrepancy_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Provider failed, timed out, or returned a malformed result
    AnalysisFailed {
        analysis_id: Uuid,
        project_id: i64,
        document_id: i64,
        analysis_type: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl AnalysisEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            AnalysisEvent::AnalysisSubmitted { .. } => "AnalysisSubmitted",
            AnalysisEvent::AnalysisStarted { .. } => "AnalysisStarted",
            AnalysisEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            AnalysisEvent::AnalysisFailed { .. } => "AnalysisFailed",
        }
    }

    /// Project the event belongs to
    pub fn project_id(&self) -> i64 {
        match self {
            AnalysisEvent::AnalysisSubmitted { project_id, .. }
            | AnalysisEvent::AnalysisStarted { project_id, .. }
            | AnalysisEvent::AnalysisCompleted { project_id, .. }
            | AnalysisEvent::AnalysisFailed { project_id, .. } => *project_id,
        }
    }

    /// Analysis record the event refers to
    pub fn analysis_id(&self) -> Uuid {
        match self {
            AnalysisEvent::AnalysisSubmitted { analysis_id, .. }
            | AnalysisEvent::AnalysisStarted { analysis_id, .. }
            | AnalysisEvent::AnalysisCompleted { analysis_id, .. }
            | AnalysisEvent::AnalysisFailed { analysis_id, .. } => *analysis_id,
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a tokio broadcast channel. Slow subscribers lose the
/// oldest events once `capacity` is exceeded; publishers never block.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// ```
    /// use plancheck_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// assert_eq!(event_bus.capacity(), 1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AnalysisEvent,
    ) -> Result<usize, broadcast::error::SendError<AnalysisEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AnalysisEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
