//! Data models for plancheck-analysis

pub mod analysis;
pub mod analysis_type;
pub mod discrepancy;

pub use analysis::{AnalysisRecord, AnalysisStatus, Transition};
pub use analysis_type::AnalysisType;
pub use discrepancy::{Discrepancy, DiscrepancyKind, Extraction, Severity};
