//! Analysis record and its state machine
//!
//! States: `pending` (initial) → `processing` → `completed` | `failed` (terminal).
//! No other transitions exist. A retry is a new record, so each record's
//! history is linear and immutable once terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalysisType, Discrepancy, Extraction};

/// Analysis record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Created, waiting for a worker
    Pending,
    /// A worker owns the record and is calling the provider
    Processing,
    /// Provider result stored (terminal)
    Completed,
    /// Provider error, timeout, or malformed result recorded (terminal)
    Failed,
}

impl AnalysisStatus {
    pub const ALL: [AnalysisStatus; 4] = [
        AnalysisStatus::Pending,
        AnalysisStatus::Processing,
        AnalysisStatus::Completed,
        AnalysisStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    /// Completed and failed records accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    /// Pending or processing
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    /// The complete transition table
    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        matches!(
            (self, next),
            (AnalysisStatus::Pending, AnalysisStatus::Processing)
                | (AnalysisStatus::Processing, AnalysisStatus::Completed)
                | (AnalysisStatus::Processing, AnalysisStatus::Failed)
        )
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AnalysisStatus::Pending),
            "processing" => Ok(AnalysisStatus::Processing),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(format!("unknown analysis status: {}", other)),
        }
    }
}

/// A legal state change together with the fields it sets
///
/// Each variant carries exactly the data its target status owns, so a record
/// can never hold a `result` unless completed or an `error` unless failed.
#[derive(Debug, Clone)]
pub enum Transition {
    /// `pending → processing`
    Start { at: DateTime<Utc> },
    /// `processing → completed`
    Complete {
        result: Value,
        extraction: Extraction,
        at: DateTime<Utc>,
    },
    /// `processing → failed`
    Fail { error: String, at: DateTime<Utc> },
}

impl Transition {
    /// Status the record must be in for this transition to apply
    pub fn required_status(&self) -> AnalysisStatus {
        match self {
            Transition::Start { .. } => AnalysisStatus::Pending,
            Transition::Complete { .. } | Transition::Fail { .. } => AnalysisStatus::Processing,
        }
    }

    /// Status after the transition
    pub fn target_status(&self) -> AnalysisStatus {
        match self {
            Transition::Start { .. } => AnalysisStatus::Processing,
            Transition::Complete { .. } => AnalysisStatus::Completed,
            Transition::Fail { .. } => AnalysisStatus::Failed,
        }
    }

    /// Check the transition against a current status
    pub fn check(&self, current: AnalysisStatus) -> AnalysisResult<()> {
        let to = self.target_status();
        if current == self.required_status() && current.can_transition_to(to) {
            Ok(())
        } else {
            Err(AnalysisError::InvalidTransition { from: current, to })
        }
    }
}

/// One analysis attempt for a (document, analysis type) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub document_id: i64,
    pub project_id: i64,
    pub analysis_type: AnalysisType,
    pub status: AnalysisStatus,
    /// Provider payload, present only when completed
    pub result: Option<Value>,
    /// Derived from `result`; empty unless completed
    pub discrepancies: Vec<Discrepancy>,
    /// Items visited by comparison rules, present only when completed
    pub items_compared: Option<u32>,
    /// Compared items without a discrepancy, present only when completed
    pub items_matched: Option<u32>,
    /// Failure reason, present only when failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    /// New record in `pending`
    pub fn new(
        document_id: i64,
        project_id: i64,
        analysis_type: AnalysisType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            project_id,
            analysis_type,
            status: AnalysisStatus::Pending,
            result: None,
            discrepancies: Vec::new(),
            items_compared: None,
            items_matched: None,
            error: None,
            created_at,
            processing_started_at: None,
            processing_completed_at: None,
        }
    }

    /// Apply a transition in place
    ///
    /// All-or-nothing: on `InvalidTransition` the record is untouched.
    pub fn apply(&mut self, transition: Transition) -> AnalysisResult<()> {
        transition.check(self.status)?;
        self.status = transition.target_status();

        match transition {
            Transition::Start { at } => {
                self.processing_started_at = Some(at);
            }
            Transition::Complete {
                result,
                extraction,
                at,
            } => {
                self.result = Some(result);
                self.discrepancies = extraction.discrepancies;
                self.items_compared = Some(extraction.items_compared);
                self.items_matched = Some(extraction.items_matched);
                self.processing_completed_at = Some(at);
            }
            Transition::Fail { error, at } => {
                self.error = Some(error);
                self.processing_completed_at = Some(at);
            }
        }

        Ok(())
    }

    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    pub fn discrepancy_count(&self) -> usize {
        self.discrepancies.len()
    }

    /// `processing_completed_at - processing_started_at`, if both are set
    pub fn processing_duration(&self) -> Option<Duration> {
        match (self.processing_started_at, self.processing_completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}
