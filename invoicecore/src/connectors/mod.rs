// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Connector adapters (C6): one module per connector category, converting
//! vendor-native payloads into `UniversalTransaction`s. Grounded on the
//! teacher's `FileIOService`/`StageService` async port pattern — a thin
//! trait with constructor-injected collaborators — generalized here from
//! filesystem I/O to a vendor-agnostic `RawSource`.

pub mod accounting;
pub mod banking;
pub mod crm;
pub mod ecommerce;
pub mod erp;
mod field_mapping;
pub mod pos;

pub use accounting::AccountingAdapter;
pub use banking::BankingAdapter;
pub use crm::CrmAdapter;
pub use ecommerce::EcommerceAdapter;
pub use erp::ErpAdapter;
pub use pos::PosAdapter;

use async_trait::async_trait;
use serde_json::Value as NativePayload;

use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::connector_adapter::{FetchFilters, Paging};

/// The vendor-facing half of a connector integration: retrieves native
/// payloads over whatever transport a given vendor speaks. Adapters hold
/// an `Arc<dyn RawSource>` rather than embedding vendor HTTP clients
/// directly, mirroring the teacher's constructor-injection style and
/// keeping this crate's dependency surface free of any one vendor's SDK.
#[async_trait]
pub trait RawSource: Send + Sync {
    async fn fetch(&self, filters: &FetchFilters, paging: Paging) -> Result<Vec<NativePayload>, CoreError>;
}

/// A `RawSource` that always returns an empty page — the adapter is then
/// used purely for `to_universal`/`enhance_result` against payloads
/// supplied out of band (batch import, webhook body, test fixture). This
/// is the default collaborator when no live vendor connection is wired up.
pub struct NullSource;

#[async_trait]
impl RawSource for NullSource {
    async fn fetch(&self, _filters: &FetchFilters, _paging: Paging) -> Result<Vec<NativePayload>, CoreError> {
        Ok(Vec::new())
    }
}
