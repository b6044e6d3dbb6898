// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Ecommerce connector adapter (§4.1). No category-specific original source
//! exists for this connector; field mapping follows the same
//! priority-ordered probing shape as `erp`/`pos`/`crm`, with field names
//! drawn from Shopify's order-object vocabulary (`line_items`,
//! `shipping_address`, `financial_status`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as NativePayload;

use invoicecore_domain::entities::{ConnectorMetadata, EcommerceMetadata, ProcessedTransaction, UniversalTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::connector_adapter::{ConnectorAdapter, FetchFilters, Paging};
use invoicecore_domain::value_objects::ConnectorKind;

use super::field_mapping::{fallback_description, probe_amount, probe_currency, probe_str, probe_timestamp};
use super::RawSource;

pub struct EcommerceAdapter {
    kind: ConnectorKind,
    connector_instance: String,
    source: Arc<dyn RawSource>,
}

impl EcommerceAdapter {
    pub fn new(kind: ConnectorKind, connector_instance: impl Into<String>, source: Arc<dyn RawSource>) -> Self {
        assert_eq!(kind.category(), invoicecore_domain::value_objects::ConnectorCategory::Ecommerce);
        Self {
            kind,
            connector_instance: connector_instance.into(),
            source,
        }
    }
}

#[async_trait]
impl ConnectorAdapter for EcommerceAdapter {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    async fn fetch(&self, filters: &FetchFilters, paging: Paging) -> Result<Vec<NativePayload>, CoreError> {
        self.source.fetch(filters, paging).await
    }

    fn to_universal(&self, native: &NativePayload) -> Result<UniversalTransaction, CoreError> {
        let now = chrono::Utc::now();

        let identifier = probe_str(native, &["id", "order_id", "order_number"])
            .ok_or_else(|| CoreError::ConnectorError("ecommerce payload has no identifier field".to_string()))?;

        let amount = probe_amount(
            native,
            &[
                ("total_price", false),
                ("current_total_price", false),
                ("amount", false),
            ],
        );

        let (timestamp, fell_back) = probe_timestamp(native, &["processed_at", "created_at"], now);

        let description = probe_str(native, &["note", "name"])
            .unwrap_or_else(|| fallback_description("Ecommerce Order", &identifier));

        let currency = probe_currency(native, &["currency"]);

        let physical_goods = native
            .get("line_items")
            .and_then(|items| items.as_array())
            .map(|items| items.iter().any(|i| i.get("requires_shipping").and_then(|v| v.as_bool()).unwrap_or(false)))
            .unwrap_or(false);

        let metadata = EcommerceMetadata {
            shipping_address: probe_str(native, &["shipping_address.address1", "shipping_address.city"]),
            physical_goods,
        };

        let mut transaction = UniversalTransaction::new(
            identifier,
            amount,
            currency,
            timestamp,
            description,
            ConnectorMetadata::Ecommerce(metadata),
            self.kind,
            self.connector_instance.clone(),
            now,
            native.clone(),
        )?;

        transaction.account_identifier = probe_str(native, &["customer.id"]);
        transaction.external_reference = probe_str(native, &["order_number"]);
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
        if let Some(status) = native.get("financial_status").and_then(|v| v.as_str()) {
            enhanced
                .processing
                .processing_notes
                .push(format!("ecommerce financial status {status}"));
        }
        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> EcommerceAdapter {
        EcommerceAdapter::new(ConnectorKind::EcommerceShopify, "shopify-1", Arc::new(super::super::NullSource))
    }

    #[test]
    fn flags_physical_goods_when_any_line_item_requires_shipping() {
        let native = serde_json::json!({
            "id": "ORD-1",
            "total_price": "199.99",
            "line_items": [{"requires_shipping": false}, {"requires_shipping": true}],
        });
        let txn = adapter().to_universal(&native).unwrap();
        match txn.metadata {
            ConnectorMetadata::Ecommerce(ecom) => assert!(ecom.physical_goods),
            _ => panic!("expected Ecommerce metadata"),
        }
    }

    #[test]
    fn digital_only_orders_are_not_physical_goods() {
        let native = serde_json::json!({
            "id": "ORD-2",
            "total_price": "9.99",
            "line_items": [{"requires_shipping": false}],
        });
        let txn = adapter().to_universal(&native).unwrap();
        match txn.metadata {
            ConnectorMetadata::Ecommerce(ecom) => assert!(!ecom.physical_goods),
            _ => panic!("expected Ecommerce metadata"),
        }
    }
}
