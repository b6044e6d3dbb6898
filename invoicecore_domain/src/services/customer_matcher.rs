// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Customer matching port (C7), consumed by the enrichment stage (§4.3.6).
//! The concrete in-memory inverted-index engine lives in infrastructure;
//! this crate only owns the contract and scoring vocabulary (`customer.rs`).

use crate::customer::{MatchConfidence, MatchingStrategy};
use crate::error::CoreError;
use crate::value_objects::{ConnectorKind, CustomerId, TenantId};
use async_trait::async_trait;

/// Identity fragment extracted from a single transaction, handed to the
/// matcher for resolution against the tenant's customer index (§4.4).
#[derive(Debug, Clone, Default)]
pub struct CandidateIdentity {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub business_id: Option<String>,
    pub source: Option<ConnectorKind>,
    pub source_local_id: Option<String>,
}

/// Resolution result: either an existing identity was matched and grown,
/// or a new one was created outright (§4.4: "below the low threshold, a
/// new identity is created").
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub confidence: MatchConfidence,
    pub score: f64,
    pub company_registration_verified: bool,
    pub tax_compliance_verified: bool,
}

#[async_trait]
pub trait CustomerMatcher: Send + Sync {
    /// Resolves `candidate` against the tenant's index using `strategy`'s
    /// threshold table, merging into the best match when confidence clears
    /// the strategy's low threshold, else creating a new identity.
    async fn resolve_or_create(
        &self,
        tenant_id: TenantId,
        candidate: &CandidateIdentity,
        strategy: MatchingStrategy,
    ) -> Result<MatchOutcome, CoreError>;
}
