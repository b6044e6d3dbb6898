// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Banking connector adapter (§4.1). No category-specific original source
//! exists; field mapping follows the same priority-ordered probing shape as
//! `erp`/`pos`/`crm`, with field names drawn from NIBSS/CBN settlement-file
//! vocabulary (`session_id`, `nuban`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as NativePayload;

use invoicecore_domain::entities::{BankingMetadata, ConnectorMetadata, ProcessedTransaction, UniversalTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::connector_adapter::{ConnectorAdapter, FetchFilters, Paging};
use invoicecore_domain::value_objects::ConnectorKind;

use super::field_mapping::{fallback_description, probe_amount, probe_currency, probe_str, probe_timestamp};
use super::RawSource;

pub struct BankingAdapter {
    connector_instance: String,
    source: Arc<dyn RawSource>,
}

impl BankingAdapter {
    pub fn new(connector_instance: impl Into<String>, source: Arc<dyn RawSource>) -> Self {
        Self {
            connector_instance: connector_instance.into(),
            source,
        }
    }
}

#[async_trait]
impl ConnectorAdapter for BankingAdapter {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::BankingGeneric
    }

    async fn fetch(&self, filters: &FetchFilters, paging: Paging) -> Result<Vec<NativePayload>, CoreError> {
        self.source.fetch(filters, paging).await
    }

    fn to_universal(&self, native: &NativePayload) -> Result<UniversalTransaction, CoreError> {
        let now = chrono::Utc::now();

        let identifier = probe_str(native, &["id", "transaction_reference", "session_id"])
            .ok_or_else(|| CoreError::ConnectorError("banking payload has no identifier field".to_string()))?;

        let amount = probe_amount(native, &[("amount", false), ("transaction_amount", false)]);

        let (timestamp, fell_back) = probe_timestamp(native, &["value_date", "transaction_date"], now);

        let description = probe_str(native, &["narration", "remarks"])
            .unwrap_or_else(|| fallback_description("Bank Transfer", &identifier));

        let currency = probe_currency(native, &["currency"]);

        let metadata = BankingMetadata {
            bank_reference: probe_str(native, &["session_id", "transaction_reference"]),
            account_number: probe_str(native, &["nuban", "account_number"]),
        };

        let mut transaction = UniversalTransaction::new(
            identifier,
            amount,
            currency,
            timestamp,
            description,
            ConnectorMetadata::Banking(metadata),
            self.kind(),
            self.connector_instance.clone(),
            now,
            native.clone(),
        )?;

        transaction.account_identifier = probe_str(native, &["nuban", "account_number"]);
        transaction.external_reference = probe_str(native, &["session_id"]);
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
        if let Some(session_id) = native.get("session_id").and_then(|v| v.as_str()) {
            enhanced
                .processing
                .processing_notes
                .push(format!("nibss session {session_id}"));
        }
        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> BankingAdapter {
        BankingAdapter::new("nibss-1", Arc::new(super::super::NullSource))
    }

    #[test]
    fn maps_nuban_as_both_account_identifier_and_metadata_field() {
        let native = serde_json::json!({
            "session_id": "SESS-1",
            "amount": 50000,
            "nuban": "0123456789",
        });
        let txn = adapter().to_universal(&native).unwrap();
        assert_eq!(txn.account_identifier.as_deref(), Some("0123456789"));
        match txn.metadata {
            ConnectorMetadata::Banking(bank) => assert_eq!(bank.account_number.as_deref(), Some("0123456789")),
            _ => panic!("expected Banking metadata"),
        }
    }
}
