// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A flat, categorized error enum covering the taxonomy of §7 of the core
//! specification: configuration, connector, timeout, database, cache, circuit,
//! tenant-limit, rate-limit, and migration failures. Validation and business
//! rule violations are *not* represented here — they are carried inside the
//! `ProcessedTransaction` as data, never raised (see `stage_result`).

use thiserror::Error;

/// Domain-specific errors for the transaction processing core.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("connector error: {0}")]
    ConnectorError(String),

    #[error("timeout: {0}")]
    TimeoutError(String),

    #[error("database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("database query error: {0}")]
    DatabaseQueryError(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("circuit breaker open: {0}")]
    CircuitOpenError(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("tenant limit exceeded: {0}")]
    TenantLimitError(String),

    #[error("rate limited: {0}")]
    RateLimitedError(String),

    #[error("migration failed: {0}")]
    MigrationError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether callers may reasonably retry the operation that produced this
    /// error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::TimeoutError(_)
                | CoreError::DatabaseConnectionError(_)
                | CoreError::CacheError(_)
                | CoreError::CircuitOpenError(_)
        )
    }

    /// Coarse category, used by logging/metrics to bucket error rates.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::InvalidConfiguration(_) => "configuration",
            CoreError::ConnectorError(_) => "connector",
            CoreError::TimeoutError(_) => "timeout",
            CoreError::DatabaseConnectionError(_) => "database",
            CoreError::DatabaseQueryError(_) => "database",
            CoreError::CacheError(_) => "cache",
            CoreError::CircuitOpenError(_) => "circuit",
            CoreError::ServiceUnavailable(_) => "availability",
            CoreError::TenantLimitError(_) => "tenant",
            CoreError::RateLimitedError(_) => "rate_limit",
            CoreError::MigrationError(_) => "migration",
            CoreError::SerializationError(_) => "serialization",
            CoreError::NotFound(_) => "not_found",
            CoreError::Cancelled(_) => "cancellation",
            CoreError::InternalError(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
