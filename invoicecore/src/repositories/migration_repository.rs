// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `schema_migrations` persistence (C11): one row per migration run,
//! scoped globally or per tenant.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;

use invoicecore_domain::error::CoreError;
use invoicecore_domain::migration::{MigrationDirection, MigrationRecord, MigrationStatus};
use invoicecore_domain::repositories::MigrationRepository;
use invoicecore_domain::value_objects::TenantId;

use crate::db::DbPool;

pub struct SqlMigrationRepository {
    db: Arc<DbPool>,
}

impl SqlMigrationRepository {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    fn row_to_record(row: &sqlx::any::AnyRow) -> Result<MigrationRecord, CoreError> {
        let direction_str: String = row
            .try_get("direction")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        let record_json: String = row
            .try_get("record_json")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        let mut record: MigrationRecord = serde_json::from_str(&record_json)?;
        record.direction = match direction_str.as_str() {
            "down" => MigrationDirection::Down,
            _ => MigrationDirection::Up,
        };
        record.status = match status_str.as_str() {
            "running" => MigrationStatus::Running,
            "completed" => MigrationStatus::Completed,
            "failed" => MigrationStatus::Failed,
            "rolled_back" => MigrationStatus::RolledBack,
            _ => MigrationStatus::Pending,
        };
        Ok(record)
    }
}

fn status_str(status: MigrationStatus) -> &'static str {
    match status {
        MigrationStatus::Pending => "pending",
        MigrationStatus::Running => "running",
        MigrationStatus::Completed => "completed",
        MigrationStatus::Failed => "failed",
        MigrationStatus::RolledBack => "rolled_back",
    }
}

fn direction_str(direction: MigrationDirection) -> &'static str {
    match direction {
        MigrationDirection::Up => "up",
        MigrationDirection::Down => "down",
    }
}

#[async_trait]
impl MigrationRepository for SqlMigrationRepository {
    async fn record(&self, record: &MigrationRecord) -> Result<(), CoreError> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO schema_migrations \
                (run_id, migration_id, tenant_id, direction, status, record_json, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (run_id) DO UPDATE SET \
                status = excluded.status, record_json = excluded.record_json, \
                updated_at = excluded.updated_at",
        )
        .bind(record.run_id.to_string())
        .bind(record.migration_id.clone())
        .bind(record.tenant_id.map(|t| t.to_string()))
        .bind(direction_str(record.direction))
        .bind(status_str(record.status))
        .bind(json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        Ok(())
    }

    async fn applied_ids(&self, tenant_id: Option<TenantId>) -> Result<Vec<String>, CoreError> {
        // A migration counts as applied only if its most recent completed "up"
        // run has no later completed "down" (rollback) for the same tenant scope.
        let rows = match tenant_id {
            Some(tenant) => {
                sqlx::query(
                    "SELECT DISTINCT migration_id FROM schema_migrations m1 \
                     WHERE status = 'completed' AND direction = 'up' AND tenant_id = ? \
                     AND NOT EXISTS ( \
                        SELECT 1 FROM schema_migrations m2 \
                        WHERE m2.migration_id = m1.migration_id AND m2.tenant_id = m1.tenant_id \
                        AND m2.direction = 'down' AND m2.status = 'completed' \
                        AND m2.updated_at > m1.updated_at \
                     )",
                )
                .bind(tenant.to_string())
                .fetch_all(self.db.pool())
                .await
            }
            None => {
                sqlx::query(
                    "SELECT DISTINCT migration_id FROM schema_migrations m1 \
                     WHERE status = 'completed' AND direction = 'up' AND tenant_id IS NULL \
                     AND NOT EXISTS ( \
                        SELECT 1 FROM schema_migrations m2 \
                        WHERE m2.migration_id = m1.migration_id AND m2.tenant_id IS NULL \
                        AND m2.direction = 'down' AND m2.status = 'completed' \
                        AND m2.updated_at > m1.updated_at \
                     )",
                )
                .fetch_all(self.db.pool())
                .await
            }
        }
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("migration_id")
                    .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))
            })
            .collect()
    }

    async fn find_latest(
        &self,
        migration_id: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<MigrationRecord>, CoreError> {
        let row = match tenant_id {
            Some(tenant) => {
                sqlx::query(
                    "SELECT direction, status, record_json FROM schema_migrations \
                     WHERE migration_id = ? AND tenant_id = ? \
                     ORDER BY updated_at DESC LIMIT 1",
                )
                .bind(migration_id)
                .bind(tenant.to_string())
                .fetch_optional(self.db.pool())
                .await
            }
            None => {
                sqlx::query(
                    "SELECT direction, status, record_json FROM schema_migrations \
                     WHERE migration_id = ? AND tenant_id IS NULL \
                     ORDER BY updated_at DESC LIMIT 1",
                )
                .bind(migration_id)
                .fetch_optional(self.db.pool())
                .await
            }
        }
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        row.map(|row| Self::row_to_record(&row)).transpose()
    }
}
