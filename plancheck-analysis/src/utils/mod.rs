//! Utility modules for plancheck-analysis

pub mod db_retry;
