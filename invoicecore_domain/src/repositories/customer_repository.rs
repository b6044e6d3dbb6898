// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for customer identities (C7), backing the four
//! inverted indexes' startup rebuild (§4.4).

use crate::customer::CustomerIdentity;
use crate::error::CoreError;
use crate::value_objects::{CustomerId, TenantId};
use async_trait::async_trait;

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn save(&self, identity: &CustomerIdentity) -> Result<(), CoreError>;

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<CustomerIdentity>, CoreError>;

    /// Loads every identity for a tenant, used to rebuild the in-memory
    /// inverted indexes on startup.
    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<CustomerIdentity>, CoreError>;
}
