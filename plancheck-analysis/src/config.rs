//! Service configuration for plancheck-analysis
//!
//! One `ServiceConfig` value is loaded at startup and passed down explicitly.
//! Every key is optional; missing keys take the compiled defaults below.

use plancheck_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::services::extraction::{default_analysis_types, AnalysisCatalog, AnalysisTypeConfig};

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5780";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "plancheck.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: String,
    /// Defaults to `<root_folder>/plancheck.db`
    pub database_path: Option<PathBuf>,
    pub dispatcher: DispatcherConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub analysis_types: Vec<AnalysisTypeConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            database_path: None,
            dispatcher: DispatcherConfig::default(),
            database: DatabaseConfig::default(),
            provider: ProviderConfig::default(),
            analysis_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Worker pool size; provider calls beyond this wait for a permit
    pub max_concurrent_analyses: usize,
    /// Deadline for a single provider call
    pub provider_timeout_secs: u64,
    /// Sweep orphaned records and reschedule pending ones at startup
    pub recover_on_startup: bool,
    /// Broadcast channel capacity for analysis events
    pub event_capacity: usize,
    /// Slack past the provider timeout before a `processing` record counts as stale
    pub stale_grace_secs: u64,
    /// How often the stale sweep runs; 0 disables it
    pub sweep_interval_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses: 4,
            provider_timeout_secs: 120,
            recover_on_startup: true,
            event_capacity: 256,
            stale_grace_secs: 30,
            sweep_interval_secs: 60,
        }
    }
}

impl DispatcherConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Age of `processing_started_at` past which no live worker can own the record
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.saturating_add(self.stale_grace_secs))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// SQLite busy_timeout applied to every pooled connection
    pub busy_timeout_ms: u64,
    /// Total retry budget for "database is locked" errors
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout_ms: 250,
            max_lock_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Analysis endpoint URL; the service refuses to start without one
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub requests_per_second: u32,
    pub model: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "PLANCHECK_PROVIDER_API_KEY".to_string(),
            requests_per_second: 2,
            model: None,
        }
    }
}

impl ServiceConfig {
    /// Load from a TOML file, or defaults when no file exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                plancheck_common::config::load_toml::<ServiceConfig>(path)?
            }
            None => {
                info!("No configuration file found, using defaults");
                ServiceConfig::default()
            }
        };

        if config.analysis_types.is_empty() {
            config.analysis_types = default_analysis_types();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.max_concurrent_analyses == 0 {
            return Err(Error::Config(
                "dispatcher.max_concurrent_analyses must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.provider_timeout_secs == 0 {
            return Err(Error::Config(
                "dispatcher.provider_timeout_secs must be positive".to_string(),
            ));
        }
        if self.dispatcher.event_capacity == 0 {
            return Err(Error::Config(
                "dispatcher.event_capacity must be positive".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.provider.requests_per_second == 0 {
            return Err(Error::Config(
                "provider.requests_per_second must be at least 1".to_string(),
            ));
        }
        if self.analysis_types.is_empty() {
            return Err(Error::Config("no analysis types configured".to_string()));
        }

        let mut seen = HashSet::new();
        for analysis_type in &self.analysis_types {
            if !seen.insert(analysis_type.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate analysis type: {}",
                    analysis_type.name
                )));
            }
            for rule in &analysis_type.rules {
                rule.validate().map_err(|e| {
                    Error::Config(format!("analysis type {}: {}", analysis_type.name, e))
                })?;
            }
        }

        Ok(())
    }

    /// Database file, defaulting into the root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
    }

    pub fn catalog(&self) -> AnalysisCatalog {
        AnalysisCatalog::new(self.analysis_types.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_include_builtin_types() {
        let config = ServiceConfig::load(None).unwrap();
        assert_eq!(config.dispatcher.max_concurrent_analyses, 4);
        assert_eq!(config.dispatcher.provider_timeout(), Duration::from_secs(120));
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);

        let names: Vec<_> = config.analysis_types.iter().map(|t| t.name.as_str()).collect();
        for expected in [
            "plan_review",
            "contract_terms",
            "invoice_reconciliation",
            "schedule_consistency",
            "safety_checklist",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
            bind_address = "0.0.0.0:9000"

            [dispatcher]
            provider_timeout_secs = 30
            "#,
        );

        let config = ServiceConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.dispatcher.provider_timeout_secs, 30);
        assert_eq!(config.dispatcher.max_concurrent_analyses, 4);
        assert_eq!(config.database.max_lock_wait_ms, 5000);
    }

    #[test]
    fn test_stale_sweep_settings() {
        let config = ServiceConfig::load(None).unwrap();
        assert_eq!(config.dispatcher.stale_after(), Duration::from_secs(150));
        assert_eq!(config.dispatcher.sweep_interval(), Some(Duration::from_secs(60)));

        let file = write_config(
            r#"
            [dispatcher]
            provider_timeout_secs = 10
            stale_grace_secs = 5
            sweep_interval_secs = 0
            "#,
        );
        let config = ServiceConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.dispatcher.stale_after(), Duration::from_secs(15));
        assert_eq!(config.dispatcher.sweep_interval(), None);
    }

    #[test]
    fn test_custom_types_replace_builtins() {
        let file = write_config(
            r#"
            [[analysis_types]]
            name = "roof-inspection"

            [[analysis_types.rules]]
            kind = "exact_match"
            items = "/sheets"
            key = "profile"
            expected = "ordered"
            actual = "installed"
            "#,
        );

        let config = ServiceConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.analysis_types.len(), 1);
        assert_eq!(config.analysis_types[0].name.as_str(), "roof_inspection");
        assert!(config.catalog().resolve("plan_review").is_err());
    }

    #[test]
    fn test_validation_failures() {
        let zero_workers = write_config("[dispatcher]\nmax_concurrent_analyses = 0\n");
        assert!(matches!(
            ServiceConfig::load(Some(zero_workers.path())),
            Err(Error::Config(_))
        ));

        let duplicate = write_config(
            r#"
            [[analysis_types]]
            name = "a"
            [[analysis_types]]
            name = "A"
            "#,
        );
        assert!(ServiceConfig::load(Some(duplicate.path())).is_err());

        let inverted = write_config(
            r#"
            [[analysis_types]]
            name = "a"
            [[analysis_types.rules]]
            kind = "numeric_tolerance"
            items = "/x"
            key = "k"
            expected = "e"
            actual = "a"
            warning_percent = 50
            critical_percent = 5
            "#,
        );
        assert!(ServiceConfig::load(Some(inverted.path())).is_err());
    }

    #[test]
    fn test_database_path_defaults_into_root() {
        let config = ServiceConfig::default();
        assert_eq!(
            config.database_path(Path::new("/srv/plancheck")),
            PathBuf::from("/srv/plancheck/plancheck.db")
        );
    }
}
