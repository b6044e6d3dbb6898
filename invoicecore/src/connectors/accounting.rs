// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Accounting connector adapter (§4.1). No category-specific original
//! source exists; field mapping follows the same priority-ordered probing
//! shape as `erp`/`pos`/`crm`, with field names drawn from QuickBooks'
//! journal-entry vocabulary (`debit_account`, `credit_account`,
//! `doc_number`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as NativePayload;

use invoicecore_domain::entities::{AccountingMetadata, ConnectorMetadata, ProcessedTransaction, UniversalTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::connector_adapter::{ConnectorAdapter, FetchFilters, Paging};
use invoicecore_domain::value_objects::ConnectorKind;

use super::field_mapping::{fallback_description, probe_amount, probe_currency, probe_str, probe_timestamp};
use super::RawSource;

pub struct AccountingAdapter {
    kind: ConnectorKind,
    connector_instance: String,
    source: Arc<dyn RawSource>,
}

impl AccountingAdapter {
    pub fn new(kind: ConnectorKind, connector_instance: impl Into<String>, source: Arc<dyn RawSource>) -> Self {
        assert_eq!(kind.category(), invoicecore_domain::value_objects::ConnectorCategory::Accounting);
        Self {
            kind,
            connector_instance: connector_instance.into(),
            source,
        }
    }
}

#[async_trait]
impl ConnectorAdapter for AccountingAdapter {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    async fn fetch(&self, filters: &FetchFilters, paging: Paging) -> Result<Vec<NativePayload>, CoreError> {
        self.source.fetch(filters, paging).await
    }

    fn to_universal(&self, native: &NativePayload) -> Result<UniversalTransaction, CoreError> {
        let now = chrono::Utc::now();

        let identifier = probe_str(native, &["id", "doc_number", "journal_entry_id"])
            .ok_or_else(|| CoreError::ConnectorError("accounting payload has no identifier field".to_string()))?;

        let amount = probe_amount(native, &[("total_amount", false), ("amount", false)]);

        let (timestamp, fell_back) = probe_timestamp(native, &["txn_date", "posting_date"], now);

        let description = probe_str(native, &["memo", "private_note"])
            .unwrap_or_else(|| fallback_description("Accounting Entry", &identifier));

        let currency = probe_currency(native, &["currency"]);

        let metadata = AccountingMetadata {
            debit_account: probe_str(native, &["debit_account", "debit_account_ref"]),
            credit_account: probe_str(native, &["credit_account", "credit_account_ref"]),
        };

        let mut transaction = UniversalTransaction::new(
            identifier,
            amount,
            currency,
            timestamp,
            description,
            ConnectorMetadata::Accounting(metadata),
            self.kind,
            self.connector_instance.clone(),
            now,
            native.clone(),
        )?;

        transaction.account_identifier = probe_str(native, &["customer_ref"]);
        transaction.external_reference = probe_str(native, &["doc_number"]);
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
        if let (Some(debit), Some(credit)) = (
            native.get("debit_account").and_then(|v| v.as_str()),
            native.get("credit_account").and_then(|v| v.as_str()),
        ) {
            enhanced
                .processing
                .processing_notes
                .push(format!("journal entry {debit} -> {credit}"));
        }
        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> AccountingAdapter {
        AccountingAdapter::new(
            ConnectorKind::AccountingQuickbooks,
            "qbo-1",
            Arc::new(super::super::NullSource),
        )
    }

    #[test]
    fn maps_debit_and_credit_accounts() {
        let native = serde_json::json!({
            "doc_number": "JE-1",
            "total_amount": 4000,
            "debit_account": "6000-expenses",
            "credit_account": "1000-cash",
        });
        let txn = adapter().to_universal(&native).unwrap();
        match txn.metadata {
            ConnectorMetadata::Accounting(acct) => {
                assert_eq!(acct.debit_account.as_deref(), Some("6000-expenses"));
                assert_eq!(acct.credit_account.as_deref(), Some("1000-cash"));
            }
            _ => panic!("expected Accounting metadata"),
        }
    }
}
