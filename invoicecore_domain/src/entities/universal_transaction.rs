// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Universal Transaction (C1): the canonical record every connector
//! adapter converts vendor payloads into, and every stage executor consumes.

use crate::error::CoreError;
use crate::value_objects::{datetime_serde, connector::ConnectorKind, money::Currency};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-connector-category metadata payload. A closed tagged union rather
/// than the duck-typed dictionaries of the source platform (design notes
/// §9): each variant carries exactly the fields that category's business
/// rules (§4.3.4) inspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectorMetadata {
    Erp(ErpMetadata),
    Pos(PosMetadata),
    Crm(CrmMetadata),
    Ecommerce(EcommerceMetadata),
    Accounting(AccountingMetadata),
    Banking(BankingMetadata),
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErpMetadata {
    pub account_code: Option<String>,
    pub cost_center: Option<String>,
    pub invoice_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosMetadata {
    pub receipt_number: Option<String>,
    pub terminal_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmMetadata {
    pub service_type: Option<String>,
    pub professional_license: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcommerceMetadata {
    pub shipping_address: Option<String>,
    pub physical_goods: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountingMetadata {
    pub debit_account: Option<String>,
    pub credit_account: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankingMetadata {
    pub bank_reference: Option<String>,
    pub account_number: Option<String>,
}

/// Raw, unconverted vendor payload. Adapters must preserve this verbatim —
/// `fetchAndProcess` callers rely on byte-for-byte round-trip (§6).
pub type RawPayload = serde_json::Value;

/// Free-form adapter-supplied directives (e.g. "skip amount validation",
/// "force profile X"). Stage executors consult this bag but are never
/// required to honor every key.
pub type ProcessingHints = BTreeMap<String, serde_json::Value>;

/// Canonical in-memory record consumed by every stage (C1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalTransaction {
    pub identifier: String,
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(with = "datetime_serde")]
    pub timestamp: DateTime<Utc>,
    pub description: String,

    pub account_identifier: Option<String>,
    pub external_reference: Option<String>,
    pub category_tag: Option<String>,
    pub subtotal: Option<Decimal>,
    pub vat: Option<Decimal>,

    pub metadata: ConnectorMetadata,

    pub source_system: ConnectorKind,
    pub connector_instance: String,
    #[serde(with = "datetime_serde")]
    pub ingestion_timestamp: DateTime<Utc>,
    pub raw_payload: RawPayload,

    #[serde(default)]
    pub processing_hints: ProcessingHints,
}

impl UniversalTransaction {
    /// Constructs a transaction, enforcing the structural invariants that
    /// hold regardless of pipeline configuration: non-empty identifier,
    /// non-empty description (the adapter layer is responsible for the
    /// `"<kind> <identifier>"` fallback per §4.1 before calling this).
    /// `Decimal` cannot represent NaN or infinity, so the "amount is finite
    /// and non-NaN" invariant holds by construction. The timestamp-skew and
    /// positive-amount invariants are validation-stage concerns (§4.3.1),
    /// not constructor-level ones, since they depend on "now" and on
    /// profile configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identifier: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        timestamp: DateTime<Utc>,
        description: impl Into<String>,
        metadata: ConnectorMetadata,
        source_system: ConnectorKind,
        connector_instance: impl Into<String>,
        ingestion_timestamp: DateTime<Utc>,
        raw_payload: RawPayload,
    ) -> Result<Self, CoreError> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(CoreError::invalid_config(
                "transaction identifier must be non-empty",
            ));
        }
        let description = description.into();
        Ok(Self {
            identifier,
            amount,
            currency,
            timestamp,
            description,
            account_identifier: None,
            external_reference: None,
            category_tag: None,
            subtotal: None,
            vat: None,
            metadata,
            source_system,
            connector_instance: connector_instance.into(),
            ingestion_timestamp,
            raw_payload,
            processing_hints: BTreeMap::new(),
        })
    }

    /// Stable fingerprint components for exact duplicate detection (§4.3.2):
    /// `(source_system, identifier)` — the tenant component is appended by
    /// the caller, since the transaction itself is not tenant-aware.
    pub fn exact_fingerprint_key(&self) -> (ConnectorKind, &str) {
        (self.source_system, self.identifier.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UniversalTransaction {
        UniversalTransaction::new(
            "INV-2024-001",
            Decimal::new(10_750_000, 2),
            Currency::ngn(),
            Utc::now(),
            "sample invoice",
            ConnectorMetadata::None,
            ConnectorKind::ErpSap,
            "sap-prod-1",
            Utc::now(),
            serde_json::json!({}),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_identifier() {
        let err = UniversalTransaction::new(
            "   ",
            Decimal::ONE,
            Currency::ngn(),
            Utc::now(),
            "x",
            ConnectorMetadata::None,
            ConnectorKind::ErpSap,
            "inst",
            Utc::now(),
            serde_json::json!({}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn serializes_and_round_trips() {
        let txn = sample();
        let json = serde_json::to_string(&txn).unwrap();
        let back: UniversalTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(txn, back);
    }
}
