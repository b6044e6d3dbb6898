// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Bootstrap schema for the core's own bookkeeping tables (§6), grounded
//! on the teacher's `infrastructure/repositories/schema.rs` (`ensure_schema`
//! run once at start-up so every entry point sees a consistent database).
//!
//! Unlike the teacher, which defers to `sqlx::migrate!` against a fixed
//! SQLite target, this core runs across two engines through the `Any`
//! driver and owns a bespoke, tenant-aware migration engine (C11, see
//! `migration_engine.rs`) for its *application* schema. These five tables
//! are the bookkeeping substrate that engine itself reads and writes, so
//! they're created here with portable `CREATE TABLE IF NOT EXISTS` DDL
//! rather than being the first migration the engine would otherwise need
//! to apply to itself.
//!
//! `organizations` / `tenant_quotas` from spec.md §6 are not separate
//! tables here: `tenants.config_json` already carries tier, quotas, and
//! billing state as part of `TenantConfiguration` (see
//! `invoicecore_domain::tenant`), so a standalone billing schema is left
//! for the (out-of-scope) billing subsystem to define if it ever lands.

use invoicecore_domain::error::CoreError;

use crate::db::DbPool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS processed_transactions ( \
        id TEXT NOT NULL, \
        tenant_id TEXT NOT NULL, \
        source_system TEXT NOT NULL, \
        source_id TEXT NOT NULL, \
        fingerprint TEXT NOT NULL, \
        counterparty_hash TEXT NOT NULL DEFAULT '', \
        amount TEXT NOT NULL, \
        currency TEXT NOT NULL, \
        ts TEXT NOT NULL, \
        confidence REAL NOT NULL, \
        risk_level TEXT NOT NULL, \
        ready_for_invoice BOOLEAN NOT NULL, \
        violations_json TEXT NOT NULL, \
        enrichment_json TEXT NOT NULL, \
        raw_json TEXT NOT NULL, \
        created_at TEXT NOT NULL, \
        updated_at TEXT NOT NULL, \
        UNIQUE (tenant_id, source_system, source_id) \
    )",
    "CREATE INDEX IF NOT EXISTS idx_processed_transactions_tenant_updated \
        ON processed_transactions (tenant_id, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_processed_transactions_tenant_fingerprint \
        ON processed_transactions (tenant_id, fingerprint)",
    "CREATE INDEX IF NOT EXISTS idx_processed_transactions_tenant_counterparty \
        ON processed_transactions (tenant_id, counterparty_hash, amount, ts)",
    "CREATE TABLE IF NOT EXISTS customer_identities ( \
        customer_id TEXT PRIMARY KEY, \
        tenant_id TEXT NOT NULL, \
        primary_name TEXT NOT NULL, \
        identity_json TEXT NOT NULL, \
        updated_at TEXT NOT NULL \
    )",
    "CREATE INDEX IF NOT EXISTS idx_customer_identities_tenant ON customer_identities (tenant_id)",
    "CREATE TABLE IF NOT EXISTS tenants ( \
        tenant_id TEXT PRIMARY KEY, \
        organization_id TEXT NOT NULL, \
        config_json TEXT NOT NULL, \
        updated_at TEXT NOT NULL \
    )",
    "CREATE TABLE IF NOT EXISTS schema_migrations ( \
        run_id TEXT PRIMARY KEY, \
        migration_id TEXT NOT NULL, \
        tenant_id TEXT, \
        direction TEXT NOT NULL, \
        status TEXT NOT NULL, \
        record_json TEXT NOT NULL, \
        updated_at TEXT NOT NULL \
    )",
    "CREATE INDEX IF NOT EXISTS idx_schema_migrations_lookup \
        ON schema_migrations (migration_id, tenant_id, direction, status, updated_at)",
    "CREATE TABLE IF NOT EXISTS backup_jobs ( \
        job_id TEXT PRIMARY KEY, \
        tenant_id TEXT, \
        status TEXT NOT NULL, \
        completed_at TEXT, \
        job_json TEXT NOT NULL, \
        updated_at TEXT NOT NULL \
    )",
    "CREATE INDEX IF NOT EXISTS idx_backup_jobs_status_completed ON backup_jobs (status, completed_at)",
];

/// Applies the bootstrap DDL, once per process, idempotently. Safe to call
/// from every entry point (`serve`, `migrate`, `backup`) since every
/// statement is `IF NOT EXISTS`.
pub async fn ensure_schema(db: &DbPool) -> Result<(), CoreError> {
    for statement in STATEMENTS {
        db.execute_dml(statement).await?;
    }
    tracing::debug!("core bookkeeping schema is up to date");
    Ok(())
}
