// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! ERP connector adapter (§4.1), field-mapping grounded on
//! `erp_connector_adapter.py`'s `_convert_erp_invoice_to_universal_transaction`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as NativePayload;

use invoicecore_domain::entities::{ConnectorMetadata, ErpMetadata, ProcessedTransaction, UniversalTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::connector_adapter::{ConnectorAdapter, FetchFilters, Paging};
use invoicecore_domain::value_objects::ConnectorKind;

use super::field_mapping::{fallback_description, probe_amount, probe_currency, probe_str, probe_timestamp};
use super::RawSource;

pub struct ErpAdapter {
    kind: ConnectorKind,
    connector_instance: String,
    source: Arc<dyn RawSource>,
}

impl ErpAdapter {
    pub fn new(kind: ConnectorKind, connector_instance: impl Into<String>, source: Arc<dyn RawSource>) -> Self {
        assert_eq!(kind.category(), invoicecore_domain::value_objects::ConnectorCategory::Erp);
        Self {
            kind,
            connector_instance: connector_instance.into(),
            source,
        }
    }
}

#[async_trait]
impl ConnectorAdapter for ErpAdapter {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    async fn fetch(&self, filters: &FetchFilters, paging: Paging) -> Result<Vec<NativePayload>, CoreError> {
        self.source.fetch(filters, paging).await
    }

    fn to_universal(&self, native: &NativePayload) -> Result<UniversalTransaction, CoreError> {
        let now = chrono::Utc::now();

        let identifier = probe_str(
            native,
            &["id", "invoice_id", "document_number", "billing_document_id"],
        )
        .ok_or_else(|| CoreError::ConnectorError("ERP payload has no identifier field".to_string()))?;

        let amount = probe_amount(
            native,
            &[
                ("total_amount", false),
                ("amount", false),
                ("net_amount", false),
                ("gross_amount", false),
            ],
        );

        let (timestamp, fell_back) =
            probe_timestamp(native, &["invoice_date", "document_date"], now);

        let description = probe_str(
            native,
            &["description", "invoice_description", "document_text"],
        )
        .unwrap_or_else(|| fallback_description("ERP Invoice", &identifier));

        let currency = probe_currency(native, &["currency"]);

        let metadata = ErpMetadata {
            account_code: probe_str(native, &["customer_code", "sold_to_party"]),
            cost_center: probe_str(native, &["cost_center"]),
            invoice_number: probe_str(native, &["invoice_number"]),
        };

        let mut transaction = UniversalTransaction::new(
            identifier,
            amount,
            currency,
            timestamp,
            description,
            ConnectorMetadata::Erp(metadata),
            self.kind,
            self.connector_instance.clone(),
            now,
            native.clone(),
        )?;

        transaction.account_identifier = probe_str(native, &["customer_account", "sold_to_party"]);
        transaction.external_reference = probe_str(native, &["reference_number", "purchase_order"]);
        transaction.category_tag = probe_str(native, &["document_type"]).or(Some("invoice".to_string()));
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
        if let Some(invoice_number) = native.get("invoice_number").and_then(|v| v.as_str()) {
            enhanced
                .processing
                .processing_notes
                .push(format!("erp invoice number {invoice_number}"));
        }
        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ErpAdapter {
        ErpAdapter::new(ConnectorKind::ErpSap, "sap-prod-1", Arc::new(super::super::NullSource))
    }

    #[test]
    fn maps_priority_ordered_identifier_and_amount_fields() {
        let native = serde_json::json!({
            "document_number": "DOC-42",
            "net_amount": 1250.50,
            "invoice_date": "2024-05-01T12:00:00Z",
            "currency": "ngn",
        });
        let txn = adapter().to_universal(&native).unwrap();
        assert_eq!(txn.identifier, "DOC-42");
        assert_eq!(txn.amount, rust_decimal::Decimal::new(125050, 2));
        assert_eq!(txn.currency.as_str(), "NGN");
    }

    #[test]
    fn falls_back_to_generated_description_when_absent() {
        let native = serde_json::json!({"id": "INV-7", "amount": 10.0});
        let txn = adapter().to_universal(&native).unwrap();
        assert_eq!(txn.description, "ERP Invoice INV-7");
    }

    #[test]
    fn missing_identifier_is_a_connector_error() {
        let native = serde_json::json!({"amount": 10.0});
        assert!(adapter().to_universal(&native).is_err());
    }
}
