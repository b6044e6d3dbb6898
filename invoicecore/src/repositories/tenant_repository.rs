// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `tenants` persistence (C8), backing the tenant manager's TTL-invalidated
//! resolution cache.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;

use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::TenantRepository;
use invoicecore_domain::tenant::TenantConfiguration;
use invoicecore_domain::value_objects::TenantId;

use crate::db::DbPool;

pub struct SqlTenantRepository {
    db: Arc<DbPool>,
}

impl SqlTenantRepository {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<TenantConfiguration>, CoreError> {
        let row = sqlx::query("SELECT config_json FROM tenants WHERE tenant_id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        row.map(|row| {
            let json: String = row
                .try_get("config_json")
                .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
            serde_json::from_str(&json).map_err(CoreError::from)
        })
        .transpose()
    }

    async fn save(&self, config: &TenantConfiguration) -> Result<(), CoreError> {
        let json = serde_json::to_string(config)?;
        sqlx::query(
            "INSERT INTO tenants (tenant_id, organization_id, config_json, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (tenant_id) DO UPDATE SET \
                config_json = excluded.config_json, updated_at = excluded.updated_at",
        )
        .bind(config.tenant_id.to_string())
        .bind(config.organization_id.to_string())
        .bind(json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        Ok(())
    }
}
