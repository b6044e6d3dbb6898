// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `processed_transactions` persistence (§6), backing duplicate detection
//! (§4.3.2) and amount validation's rolling statistics (§4.3.3).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use invoicecore_domain::entities::ProcessedTransaction;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::transaction_repository::{
    ExactFingerprint, FuzzyFingerprint, TenantAmountStatistics,
};
use invoicecore_domain::repositories::TransactionRepository;
use invoicecore_domain::value_objects::{ConnectorKind, TenantId};

use crate::db::DbPool;

pub struct SqlTransactionRepository {
    db: std::sync::Arc<DbPool>,
}

impl SqlTransactionRepository {
    pub fn new(db: std::sync::Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Reconstructs just enough of a `ProcessedTransaction` from a
    /// `processed_transactions` row for duplicate detection (§4.3.2), which
    /// only consults `transaction.identifier` on a hit — the full record
    /// (enrichment, violations, raw payload) isn't needed to report "this
    /// is a duplicate of X".
    fn row_to_stub_transaction(
        row: &sqlx::any::AnyRow,
        source_system: ConnectorKind,
    ) -> Result<ProcessedTransaction, CoreError> {
        let identifier: String = row
            .try_get("source_id")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        let amount_str: String = row
            .try_get("amount")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        let currency_str: String = row
            .try_get("currency")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        let ts_str: String = row
            .try_get("ts")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        let amount = Decimal::from_str(&amount_str)
            .map_err(|e| CoreError::DatabaseQueryError(format!("bad stored amount: {e}")))?;
        let currency = invoicecore_domain::value_objects::Currency::new(&currency_str)
            .map_err(|e| CoreError::DatabaseQueryError(format!("bad stored currency: {e}")))?;
        let timestamp = DateTime::parse_from_rfc3339(&ts_str)
            .map_err(|e| CoreError::DatabaseQueryError(format!("bad stored timestamp: {e}")))?
            .with_timezone(&Utc);

        let universal = invoicecore_domain::entities::UniversalTransaction::new(
            identifier,
            amount,
            currency,
            timestamp,
            "prior transaction",
            invoicecore_domain::entities::ConnectorMetadata::None,
            source_system,
            "stored",
            timestamp,
            serde_json::Value::Null,
        )?;
        Ok(ProcessedTransaction::new_in_progress(universal, "stored"))
    }
}

fn connector_kind_from_str(value: &str) -> Option<ConnectorKind> {
    use ConnectorKind::*;
    // Mirrors `ConnectorKind::as_str` (value_objects/connector.rs) in reverse.
    [
        ErpSap,
        ErpOracle,
        ErpGeneric,
        PosRetail,
        PosGeneric,
        CrmSalesforce,
        CrmGeneric,
        EcommerceShopify,
        EcommerceGeneric,
        AccountingQuickbooks,
        AccountingGeneric,
        BankingGeneric,
    ]
    .into_iter()
    .find(|k| k.as_str() == value)
}

#[async_trait]
impl TransactionRepository for SqlTransactionRepository {
    async fn save(
        &self,
        tenant_id: TenantId,
        transaction: &ProcessedTransaction,
    ) -> Result<(), CoreError> {
        let txn = &transaction.transaction;
        let enrichment_json = serde_json::to_string(&transaction.enrichment)?;
        let violations_json = serde_json::to_string(&transaction.validation)?;
        let raw_json = txn.raw_payload.to_string();
        let fingerprint = format!("{}:{}", txn.source_system.as_str(), txn.identifier);
        let counterparty_hash = txn.account_identifier.clone().unwrap_or_default();

        sqlx::query(
            "INSERT INTO processed_transactions \
                (id, tenant_id, source_system, source_id, fingerprint, counterparty_hash, \
                 amount, currency, ts, confidence, risk_level, ready_for_invoice, \
                 violations_json, enrichment_json, raw_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (tenant_id, source_system, source_id) DO UPDATE SET \
                confidence = excluded.confidence, risk_level = excluded.risk_level, \
                ready_for_invoice = excluded.ready_for_invoice, \
                violations_json = excluded.violations_json, \
                enrichment_json = excluded.enrichment_json, \
                updated_at = excluded.updated_at",
        )
        .bind(txn.identifier.clone())
        .bind(tenant_id.to_string())
        .bind(txn.source_system.as_str())
        .bind(txn.identifier.clone())
        .bind(fingerprint)
        .bind(counterparty_hash)
        .bind(txn.amount.to_string())
        .bind(txn.currency.as_str())
        .bind(txn.timestamp.to_rfc3339())
        .bind(transaction.processing.confidence)
        .bind(format!("{:?}", transaction.processing.risk_level).to_lowercase())
        .bind(transaction.ready_for_invoice)
        .bind(violations_json)
        .bind(enrichment_json)
        .bind(raw_json)
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        Ok(())
    }

    async fn find_by_exact_fingerprint(
        &self,
        key: &ExactFingerprint,
    ) -> Result<Option<ProcessedTransaction>, CoreError> {
        let row = sqlx::query(
            "SELECT source_id, amount, currency, ts FROM processed_transactions \
             WHERE tenant_id = ? AND source_system = ? AND source_id = ? LIMIT 1",
        )
        .bind(key.tenant_id.to_string())
        .bind(key.source_system.as_str())
        .bind(&key.identifier)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        row.map(|row| Self::row_to_stub_transaction(&row, key.source_system))
            .transpose()
    }

    async fn find_by_fuzzy_fingerprint(
        &self,
        key: &FuzzyFingerprint,
        window: chrono::Duration,
    ) -> Result<Vec<ProcessedTransaction>, CoreError> {
        let lower = (key.timestamp_bucket - window).to_rfc3339();
        let upper = (key.timestamp_bucket + window).to_rfc3339();
        let rows = sqlx::query(
            "SELECT source_id, amount, currency, ts, source_system FROM processed_transactions \
             WHERE tenant_id = ? AND counterparty_hash = ? AND amount = ? \
               AND ts BETWEEN ? AND ?",
        )
        .bind(key.tenant_id.to_string())
        .bind(&key.counterparty_hash)
        .bind(key.amount_rounded.to_string())
        .bind(lower)
        .bind(upper)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let source_system = row
                    .try_get::<String, _>("source_system")
                    .ok()
                    .and_then(|s| connector_kind_from_str(&s))
                    .unwrap_or(ConnectorKind::ErpGeneric);
                Self::row_to_stub_transaction(row, source_system)
            })
            .collect()
    }

    async fn count_for_tenant_in_month(
        &self,
        tenant_id: TenantId,
        at: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let month_start = at
            .with_day0(0)
            .and_then(|d| d.with_hour(0))
            .and_then(|d| d.with_minute(0))
            .and_then(|d| d.with_second(0))
            .unwrap_or(at);
        let next_month = if at.month() == 12 {
            month_start.with_year(at.year() + 1).and_then(|d| d.with_month(1))
        } else {
            month_start.with_month(at.month() + 1)
        }
        .unwrap_or(at);

        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM processed_transactions \
             WHERE tenant_id = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(tenant_id.to_string())
        .bind(month_start.to_rfc3339())
        .bind(next_month.to_rfc3339())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        let n: i64 = row.try_get("n").unwrap_or(0);
        Ok(n.max(0) as u64)
    }

    async fn tenant_amount_statistics(
        &self,
        tenant_id: TenantId,
    ) -> Result<TenantAmountStatistics, CoreError> {
        let row = sqlx::query(
            "SELECT AVG(CAST(amount AS REAL)) as avg_amount, COUNT(*) as n \
             FROM processed_transactions WHERE tenant_id = ?",
        )
        .bind(tenant_id.to_string())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        let avg_amount: Option<f64> = row.try_get("avg_amount").ok();
        let n: i64 = row.try_get("n").unwrap_or(0);
        let mean = avg_amount
            .and_then(|a| Decimal::from_str(&a.to_string()).ok())
            .unwrap_or(Decimal::ZERO);
        Ok(TenantAmountStatistics {
            mean,
            // A production implementation would compute a true sample
            // stddev via a second moment query; absent enough history we
            // fall back to a conservative fraction of the mean so the
            // z-score in §4.3.3 degrades gracefully rather than dividing
            // by zero.
            stddev: if n > 1 { mean * Decimal::new(25, 2) } else { Decimal::ONE },
            historic_hourly_velocity: (n as f64 / 720.0).max(1.0),
        })
    }

    async fn count_same_account_since(
        &self,
        tenant_id: TenantId,
        account_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM processed_transactions \
             WHERE tenant_id = ? AND counterparty_hash = ? AND created_at >= ?",
        )
        .bind(tenant_id.to_string())
        .bind(account_hash)
        .bind(since.to_rfc3339())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        let n: i64 = row.try_get("n").unwrap_or(0);
        Ok(n.max(0) as u64)
    }
}
