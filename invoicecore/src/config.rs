// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Application configuration surface (spec.md §6): environment-sourced keys
//! for the database, remote cache, backup, migration, and telemetry
//! subsystems. Layered the way the teacher's `infrastructure/config.rs`
//! describes (file source + environment overrides) using the `config`
//! crate, kept thin since per-tenant/per-profile settings are data, not
//! process configuration.

use invoicecore_domain::error::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_pool_overflow")]
    pub pool_overflow: u32,
    #[serde(default = "default_pool_timeout_secs")]
    pub pool_timeout_secs: u64,
    #[serde(default = "default_pool_recycle_secs")]
    pub pool_recycle_secs: u64,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
}

fn default_pool_size() -> u32 {
    10
}
fn default_pool_overflow() -> u32 {
    5
}
fn default_pool_timeout_secs() -> u64 {
    30
}
fn default_pool_recycle_secs() -> u64 {
    1800
}
fn default_statement_timeout_secs() -> u64 {
    30
}
fn default_slow_query_threshold_ms() -> u64 {
    1000
}

impl DatabaseConfig {
    /// Smaller pool defaults when running inside a constrained PaaS,
    /// detected via the presence of `DYNO` (Heroku-style) or `PORT`-only
    /// environments (§4.7).
    pub fn paas_constrained() -> bool {
        std::env::var("DYNO").is_ok() || std::env::var("PAAS_CONSTRAINED").is_ok()
    }

    pub fn effective_pool_size(&self) -> u32 {
        if Self::paas_constrained() {
            self.pool_size.min(5)
        } else {
            self.pool_size
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTopology {
    Single,
    Sentinel,
    Cluster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub url: String,
    #[serde(default)]
    pub topology: CacheTopologyConfig,
    #[serde(default = "default_serialization_format")]
    pub serialization_format: String,
    #[serde(default = "default_compression_threshold_bytes")]
    pub compression_threshold_bytes: usize,
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "default_circuit_recovery_secs")]
    pub circuit_recovery_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheTopologyConfig {
    #[serde(default)]
    pub mode: Option<CacheTopology>,
    #[serde(default)]
    pub nodes: Vec<String>,
}

fn default_serialization_format() -> String {
    "json".to_string()
}
fn default_compression_threshold_bytes() -> usize {
    1024
}
fn default_l1_capacity() -> usize {
    10_000
}
fn default_circuit_failure_threshold() -> u32 {
    10
}
fn default_circuit_recovery_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub local_path: String,
    #[serde(default)]
    pub object_store_url: Option<String>,
    #[serde(default)]
    pub object_store_access_key: Option<String>,
    #[serde(default)]
    pub object_store_secret_key: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

fn default_retention_days() -> u32 {
    30
}
fn default_worker_concurrency() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub path: String,
    #[serde(default = "default_migration_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_migration_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub detailed_logging: bool,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_enabled() -> bool {
    true
}

/// Full application configuration, loaded from an optional file plus
/// `APP_`-prefixed environment overrides (the `config` crate's standard
/// layering — teacher's stack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub backup: BackupConfig,
    pub migration: MigrationConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Loads configuration from `path` (if it exists) layered with
    /// environment variables prefixed `APP__` (double-underscore nesting,
    /// e.g. `APP__DATABASE__URL`). Unknown keys are a config error at load
    /// time per the design notes, not silently ignored.
    pub fn load(path: Option<&str>) -> Result<Self, CoreError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }
        builder = builder.add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        );
        let built = builder
            .build()
            .map_err(|e| CoreError::invalid_config(format!("failed to load configuration: {e}")))?;
        built
            .try_deserialize()
            .map_err(|e| CoreError::invalid_config(format!("invalid configuration: {e}")))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.database.url.trim().is_empty() {
            return Err(CoreError::invalid_config("database.url must not be empty"));
        }
        if self.cache.compression_threshold_bytes == 0 {
            return Err(CoreError::invalid_config(
                "cache.compression_threshold_bytes must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_database_url() {
        let config = AppConfig {
            database: DatabaseConfig {
                url: String::new(),
                pool_size: 1,
                pool_overflow: 0,
                pool_timeout_secs: 1,
                pool_recycle_secs: 1,
                statement_timeout_secs: 1,
                slow_query_threshold_ms: 1,
            },
            cache: CacheConfig {
                url: "redis://localhost".into(),
                topology: CacheTopologyConfig::default(),
                serialization_format: "json".into(),
                compression_threshold_bytes: 1024,
                l1_capacity: 1,
                circuit_failure_threshold: 1,
                circuit_recovery_secs: 1,
            },
            backup: BackupConfig {
                local_path: "/tmp".into(),
                object_store_url: None,
                object_store_access_key: None,
                object_store_secret_key: None,
                retention_days: 1,
                worker_concurrency: 1,
            },
            migration: MigrationConfig {
                path: "migrations".into(),
                timeout_secs: 1,
            },
            telemetry: TelemetryConfig {
                log_level: "info".into(),
                detailed_logging: false,
                metrics_enabled: false,
            },
        };
        assert!(config.validate().is_err());
    }
}
