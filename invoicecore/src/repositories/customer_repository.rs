// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `customer_identities` persistence (C7), backing the matching engine's
//! startup rebuild of its four in-memory inverted indexes (§4.4).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;

use invoicecore_domain::customer::CustomerIdentity;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::CustomerRepository;
use invoicecore_domain::value_objects::{CustomerId, TenantId};

use crate::db::DbPool;

pub struct SqlCustomerRepository {
    db: Arc<DbPool>,
}

impl SqlCustomerRepository {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn save(&self, identity: &CustomerIdentity) -> Result<(), CoreError> {
        let json = serde_json::to_string(identity)?;
        sqlx::query(
            "INSERT INTO customer_identities \
                (customer_id, tenant_id, primary_name, identity_json, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (customer_id) DO UPDATE SET \
                primary_name = excluded.primary_name, \
                identity_json = excluded.identity_json, \
                updated_at = excluded.updated_at",
        )
        .bind(identity.universal_id.to_string())
        .bind(identity.tenant_id.to_string())
        .bind(identity.primary_name.clone())
        .bind(json)
        .bind(identity.last_updated.to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        Ok(())
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<CustomerIdentity>, CoreError> {
        let row = sqlx::query("SELECT identity_json FROM customer_identities WHERE customer_id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        row.map(|row| {
            let json: String = row
                .try_get("identity_json")
                .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
            serde_json::from_str(&json).map_err(CoreError::from)
        })
        .transpose()
    }

    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<CustomerIdentity>, CoreError> {
        let rows = sqlx::query("SELECT identity_json FROM customer_identities WHERE tenant_id = ?")
            .bind(tenant_id.to_string())
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let json: String = row
                    .try_get("identity_json")
                    .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
                serde_json::from_str(&json).map_err(CoreError::from)
            })
            .collect()
    }
}
