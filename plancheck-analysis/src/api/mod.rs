//! HTTP API handlers for plancheck-analysis

pub mod analyses;
pub mod analysis_types;
pub mod health;
pub mod sse;

pub use analyses::analysis_routes;
pub use analysis_types::analysis_type_routes;
pub use health::health_routes;
pub use sse::analysis_event_stream;
