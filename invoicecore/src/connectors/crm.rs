// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! CRM connector adapter (§4.1), field-mapping grounded on
//! `crm_connector_adapter.py`'s `_convert_crm_deal_to_universal_transaction`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as NativePayload;

use invoicecore_domain::entities::{ConnectorMetadata, CrmMetadata, ProcessedTransaction, UniversalTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::connector_adapter::{ConnectorAdapter, FetchFilters, Paging};
use invoicecore_domain::value_objects::ConnectorKind;

use super::field_mapping::{fallback_description, probe_amount, probe_currency, probe_str, probe_timestamp};
use super::RawSource;

pub struct CrmAdapter {
    kind: ConnectorKind,
    connector_instance: String,
    source: Arc<dyn RawSource>,
}

impl CrmAdapter {
    pub fn new(kind: ConnectorKind, connector_instance: impl Into<String>, source: Arc<dyn RawSource>) -> Self {
        assert_eq!(kind.category(), invoicecore_domain::value_objects::ConnectorCategory::Crm);
        Self {
            kind,
            connector_instance: connector_instance.into(),
            source,
        }
    }
}

#[async_trait]
impl ConnectorAdapter for CrmAdapter {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    async fn fetch(&self, filters: &FetchFilters, paging: Paging) -> Result<Vec<NativePayload>, CoreError> {
        self.source.fetch(filters, paging).await
    }

    fn to_universal(&self, native: &NativePayload) -> Result<UniversalTransaction, CoreError> {
        let now = chrono::Utc::now();

        let identifier = probe_str(native, &["id", "deal_id", "opportunity_id"])
            .ok_or_else(|| CoreError::ConnectorError("CRM payload has no identifier field".to_string()))?;

        let amount = probe_amount(
            native,
            &[
                ("amount", false),
                ("value", false),
                ("deal_value", false),
                ("expected_revenue", false),
            ],
        );

        let (timestamp, fell_back) = probe_timestamp(
            native,
            &["close_date", "expected_close_date", "deal_date", "created_date"],
            now,
        );

        let description = probe_str(native, &["name", "deal_name", "opportunity_name", "title"])
            .unwrap_or_else(|| fallback_description("CRM Deal", &identifier));

        let currency = probe_currency(native, &["currency"]);

        let metadata = CrmMetadata {
            service_type: probe_str(native, &["deal_type", "type"]),
            professional_license: probe_str(native, &["professional_license"]),
        };

        let mut transaction = UniversalTransaction::new(
            identifier,
            amount,
            currency,
            timestamp,
            description,
            ConnectorMetadata::Crm(metadata),
            self.kind,
            self.connector_instance.clone(),
            now,
            native.clone(),
        )?;

        transaction.account_identifier =
            probe_str(native, &["account.id", "account.account_id", "company.id", "company.account_id"]);
        transaction.external_reference = probe_str(native, &["deal_number", "opportunity_number"]);
        if fell_back {
            transaction
                .processing_hints
                .insert("timestamp_defaulted".to_string(), serde_json::Value::Bool(true));
        }

        Ok(transaction)
    }

    fn enhance_result(
        &self,
        processed: &ProcessedTransaction,
        native: &NativePayload,
    ) -> Result<ProcessedTransaction, CoreError> {
        let mut enhanced = processed.clone();
        let company_name = native
            .get("account")
            .and_then(|a| a.get("name"))
            .or_else(|| native.get("company_name"))
            .and_then(|v| v.as_str());
        if let Some(name) = company_name {
            enhanced.processing.processing_notes.push(format!("crm account {name}"));
        }
        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> CrmAdapter {
        CrmAdapter::new(ConnectorKind::CrmSalesforce, "sfdc-1", Arc::new(super::super::NullSource))
    }

    #[test]
    fn maps_deal_value_chain_and_account_id() {
        let native = serde_json::json!({
            "opportunity_id": "OPP-1",
            "deal_value": 75000,
            "account": {"id": "ACC-1", "name": "Example Ltd"},
        });
        let txn = adapter().to_universal(&native).unwrap();
        assert_eq!(txn.identifier, "OPP-1");
        assert_eq!(txn.amount, rust_decimal::Decimal::new(75000, 0));
        assert_eq!(txn.account_identifier.as_deref(), Some("ACC-1"));
    }
}
