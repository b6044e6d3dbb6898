// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Configuration
//!
//! Loads the application's top-level configuration before any enterprise
//! layer runs: file format is auto-detected by extension (TOML, YAML,
//! JSON), and every key can be overridden by an `INVOICECORE_`-prefixed
//! environment variable (e.g. `INVOICECORE_DATABASE__URL`).
//!
//! This is deliberately a thin, ambient-only concern — the per-tenant and
//! per-profile configuration that drives pipeline behavior
//! (`ProcessingProfile`, connector credentials, …) is owned and validated
//! by the application layer, not here.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Top-level bootstrap configuration, deserialized from the config file
/// plus environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Deployment environment label: "development", "staging", "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Default processing profile tag applied when a tenant has none configured
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Primary datastore connection string (sqlx)
    pub database_url: String,

    /// Remote (L2) cache connection string (redis)
    pub cache_url: Option<String>,

    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Number of concurrent pipeline worker tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_profile() -> String {
    "small-business".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    4
}

impl BootstrapConfig {
    /// Load configuration from an explicit file path plus environment
    /// overrides under the `INVOICECORE` prefix.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("INVOICECORE").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Load configuration by searching for `config.{toml,yaml,json}` in the
    /// current directory, falling back to environment variables alone if
    /// no file is found.
    pub fn load_default() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("INVOICECORE").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Apply a CLI-provided worker override, when present.
    pub fn with_worker_override(mut self, workers: Option<usize>) -> Self {
        if let Some(w) = workers {
            self.workers = w;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, r#"database_url = "postgres://localhost/invoicecore""#).unwrap();

        let config = BootstrapConfig::load_from(file.path()).expect("should load");
        assert_eq!(config.environment, "development");
        assert_eq!(config.default_profile, "small-business");
        assert_eq!(config.workers, 4);
        assert_eq!(config.database_url, "postgres://localhost/invoicecore");
    }

    #[test]
    fn worker_override_takes_precedence() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, r#"database_url = "postgres://localhost/invoicecore""#).unwrap();
        writeln!(file, "workers = 8").unwrap();

        let config = BootstrapConfig::load_from(file.path())
            .expect("should load")
            .with_worker_override(Some(16));
        assert_eq!(config.workers, 16);
    }

    #[test]
    fn missing_database_url_fails_to_deserialize() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, r#"environment = "production""#).unwrap();

        let result = BootstrapConfig::load_from(file.path());
        assert!(result.is_err());
    }
}
