// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for tenant configuration (C8), backing the tenant
//! manager's TTL-invalidated resolution cache.

use crate::error::CoreError;
use crate::tenant::TenantConfiguration;
use crate::value_objects::TenantId;
use async_trait::async_trait;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<TenantConfiguration>, CoreError>;

    async fn save(&self, config: &TenantConfiguration) -> Result<(), CoreError>;
}
