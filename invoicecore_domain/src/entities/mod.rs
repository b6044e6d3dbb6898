// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Entities: objects with identity that persists through state changes.

pub mod processed_transaction;
pub mod universal_transaction;

pub use processed_transaction::{
    EnrichmentBag, ProcessedTransaction, ProcessingMetadata, RiskAssessment, TransactionStatus,
    ValidationResult,
};
pub use universal_transaction::{
    AccountingMetadata, BankingMetadata, ConnectorMetadata, CrmMetadata, EcommerceMetadata,
    ErpMetadata, PosMetadata, ProcessingHints, RawPayload, UniversalTransaction,
};
