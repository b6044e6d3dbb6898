// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! POS connector adapter (§4.1), field-mapping grounded on
//! `pos_connector_adapter.py`'s `_convert_pos_transaction_to_universal_transaction`.
//! Square-style payloads report money in minor units (`total_money.amount`
//! is integer cents), which `probe_amount` converts before it reaches the
//! pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as NativePayload;

use invoicecore_domain::entities::{ConnectorMetadata, PosMetadata, ProcessedTransaction, UniversalTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::connector_adapter::{ConnectorAdapter, FetchFilters, Paging};
use invoicecore_domain::value_objects::ConnectorKind;

use super::field_mapping::{fallback_description, probe_amount, probe_currency, probe_str, probe_timestamp};
use super::RawSource;

pub struct PosAdapter {
    kind: ConnectorKind,
    connector_instance: String,
    source: Arc<dyn RawSource>,
}

impl PosAdapter {
    pub fn new(kind: ConnectorKind, connector_instance: impl Into<String>, source: Arc<dyn RawSource>) -> Self {
        assert_eq!(kind.category(), invoicecore_domain::value_objects::ConnectorCategory::Pos);
        Self {
            kind,
            connector_instance: connector_instance.into(),
            source,
        }
    }
}

#[async_trait]
impl ConnectorAdapter for PosAdapter {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    async fn fetch(&self, filters: &FetchFilters, paging: Paging) -> Result<Vec<NativePayload>, CoreError> {
        self.source.fetch(filters, paging).await
    }

    fn to_universal(&self, native: &NativePayload) -> Result<UniversalTransaction, CoreError> {
        let now = chrono::Utc::now();

        let identifier = probe_str(native, &["id", "transaction_id", "payment_id", "order_id"])
            .ok_or_else(|| CoreError::ConnectorError("POS payload has no identifier field".to_string()))?;

        let amount = probe_amount(
            native,
            &[
                ("total_money.amount", true),
                ("amount_money.amount", true),
                ("total", false),
                ("amount", false),
            ],
        );

        let (timestamp, fell_back) =
            probe_timestamp(native, &["created_at", "transaction_date", "processed_at"], now);

        let description = probe_str(native, &["note", "description", "receipt_number"])
            .unwrap_or_else(|| fallback_description("POS Transaction", &identifier));

        let currency = probe_currency(native, &["total_money.currency", "amount_money.currency", "currency"]);

        let metadata = PosMetadata {
            receipt_number: probe_str(native, &["receipt_number"]),
            terminal_id: probe_str(native, &["device.id", "terminal_id"]),
        };

        let mut transaction = UniversalTransaction::new(
            identifier,
            amount,
            currency,
            timestamp,
            description,
            ConnectorMetadata::Pos(metadata),
            self.kind,
            self.connector_instance.clone(),
            now,
            native.clone(),
        )?;

        transaction.account_identifier = probe_str(native, &["customer_id"]);
        transaction.external_reference = probe_str(native, &["receipt_number", "order_number"]);
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
        if let Some(terminal) = native.get("device").and_then(|d| d.get("id")).and_then(|v| v.as_str()) {
            enhanced
                .processing
                .processing_notes
                .push(format!("pos terminal {terminal}"));
        }
        Ok(enhanced)
    }
}
