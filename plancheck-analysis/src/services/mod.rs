//! Analysis pipeline services

pub mod aggregator;
pub mod dispatcher;
pub mod documents;
pub mod extraction;
pub mod provider;
pub mod query;

pub use aggregator::Summary;
pub use dispatcher::{Dispatcher, RecoveryReport, INTERRUPTED_ERROR, STALE_ERROR};
pub use documents::{DocumentDirectory, DocumentInfo};
pub use extraction::{AnalysisCatalog, AnalysisTypeConfig, ComparisonRule};
pub use provider::{AnalysisProvider, HttpProvider, ProviderError, ProviderOutput};
pub use query::AnalysisFilter;
