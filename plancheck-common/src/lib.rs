//! # Plancheck Common Library
//!
//! Shared code for all plancheck services including:
//! - Error and result types
//! - Configuration file and root folder resolution
//! - Event types and the broadcast EventBus
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
