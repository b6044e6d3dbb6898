// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for processed transactions — the source of truth that
//! duplicate-detection (§4.3.2) queries against.

use crate::entities::ProcessedTransaction;
use crate::error::CoreError;
use crate::value_objects::{ConnectorKind, TenantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Exact-match fingerprint key: `(tenant, source_system, identifier)`.
#[derive(Debug, Clone)]
pub struct ExactFingerprint {
    pub tenant_id: TenantId,
    pub source_system: ConnectorKind,
    pub identifier: String,
}

/// Fuzzy-match fingerprint key: `(tenant, amount_rounded, counterparty_hash,
/// timestamp_bucket)` (§4.3.2).
#[derive(Debug, Clone)]
pub struct FuzzyFingerprint {
    pub tenant_id: TenantId,
    pub amount_rounded: rust_decimal::Decimal,
    pub counterparty_hash: String,
    pub timestamp_bucket: DateTime<Utc>,
}

/// Rolling amount statistics for a tenant, maintained incrementally by the
/// repository implementation and consulted by amount validation (§4.3.3)
/// for its z-score fraud signal.
#[derive(Debug, Clone, Copy)]
pub struct TenantAmountStatistics {
    pub mean: rust_decimal::Decimal,
    pub stddev: rust_decimal::Decimal,
    pub historic_hourly_velocity: f64,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn save(
        &self,
        tenant_id: TenantId,
        transaction: &ProcessedTransaction,
    ) -> Result<(), CoreError>;

    async fn find_by_exact_fingerprint(
        &self,
        key: &ExactFingerprint,
    ) -> Result<Option<ProcessedTransaction>, CoreError>;

    async fn find_by_fuzzy_fingerprint(
        &self,
        key: &FuzzyFingerprint,
        window: chrono::Duration,
    ) -> Result<Vec<ProcessedTransaction>, CoreError>;

    /// Count of processed transactions for a tenant within the calendar
    /// month containing `at` — backs the monthly-ceiling invariant (§8.4).
    async fn count_for_tenant_in_month(
        &self,
        tenant_id: TenantId,
        at: DateTime<Utc>,
    ) -> Result<u64, CoreError>;

    /// Rolling mean/stddev of transaction amounts for a tenant (§4.3.3
    /// z-score input).
    async fn tenant_amount_statistics(
        &self,
        tenant_id: TenantId,
    ) -> Result<TenantAmountStatistics, CoreError>;

    /// Count of transactions against the same account identifier within the
    /// hour preceding `at` — the velocity signal in §4.3.3.
    async fn count_same_account_since(
        &self,
        tenant_id: TenantId,
        account_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, CoreError>;
}
