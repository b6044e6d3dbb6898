// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for the `schema_migrations` bookkeeping table (C11).

use crate::error::CoreError;
use crate::migration::MigrationRecord;
use crate::value_objects::TenantId;
use async_trait::async_trait;

#[async_trait]
pub trait MigrationRepository: Send + Sync {
    async fn record(&self, record: &MigrationRecord) -> Result<(), CoreError>;

    /// Migration ids already applied for this scope (tenant-specific scope
    /// if `tenant_id` is `Some`, global scope if `None`).
    async fn applied_ids(&self, tenant_id: Option<TenantId>) -> Result<Vec<String>, CoreError>;

    async fn find_latest(
        &self,
        migration_id: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<MigrationRecord>, CoreError>;
}
