// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `ConnectorAdapter` (C6): converts vendor payloads into the
//! `UniversalTransaction`, grounded on the teacher's `FileIOService`/
//! `StageService` async port pattern (constructor injection, `Send + Sync`).

use crate::entities::{ProcessedTransaction, UniversalTransaction};
use crate::error::CoreError;
use crate::value_objects::ConnectorKind;
use async_trait::async_trait;
use serde_json::Value as NativePayload;

#[derive(Debug, Clone, Default)]
pub struct FetchFilters {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchAndProcessStats {
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
}

/// The collaborator contract of §6: "the host system calls
/// `fetchAndProcess(filters, paging) → { raw[], processed[], stats }`".
#[derive(Debug, Clone, Default)]
pub struct FetchAndProcessResult {
    pub raw: Vec<NativePayload>,
    pub processed: Vec<ProcessedTransaction>,
    pub stats: FetchAndProcessStats,
}

/// Adapters MUST NOT perform I/O beyond the vendor connection, MUST
/// preserve the raw payload verbatim, and MUST be idempotent for the same
/// `(source_id, tenant)` pair (§6).
#[async_trait]
pub trait ConnectorAdapter: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    /// Connector-specific payload retrieval.
    async fn fetch(
        &self,
        filters: &FetchFilters,
        paging: Paging,
    ) -> Result<Vec<NativePayload>, CoreError>;

    /// Pure, deterministic conversion — no I/O.
    fn to_universal(&self, native: &NativePayload) -> Result<UniversalTransaction, CoreError>;

    /// Merges processing output back with vendor-specific insight.
    fn enhance_result(
        &self,
        processed: &ProcessedTransaction,
        native: &NativePayload,
    ) -> Result<ProcessedTransaction, CoreError>;
}
