// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Processed Transaction (C1 output): immutable once it reaches a
//! terminal status, mutated only by stage executors within a single
//! orchestrator invocation before that.

use super::universal_transaction::UniversalTransaction;
use crate::stage_result::StageKind;
use crate::value_objects::{ComplianceLevel, CustomerId, RegulatoryFlag, RiskLevel, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Terminal and in-flight lifecycle states. Only `Completed` and `Failed`
/// are immutable terminal states per spec.md §3; `RequiresReview` is a
/// non-terminal side channel set by a `manual-review` failure action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub stage_latencies_ms: BTreeMap<StageKind, u64>,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub pipeline_version: String,
    pub processing_notes: Vec<String>,
    pub fraud_indicators: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentBag {
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub merchant_identity: Option<String>,
    pub primary_category: Option<String>,
    pub business_purpose: Option<String>,
    pub compliance_level: Option<ComplianceLevel>,
    pub regulatory_flags: BTreeSet<RegulatoryFlag>,
    pub company_registration_verified: bool,
    pub tax_compliance_verified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues_by_severity: BTreeMap<Severity, u32>,
}

impl ValidationResult {
    pub fn record(&mut self, severity: Severity) {
        *self.issues_by_severity.entry(severity).or_insert(0) += 1;
        if severity.is_blocking() {
            self.valid = false;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Output of the pipeline (C1). Embeds the originating `UniversalTransaction`
/// plus everything the seven stages accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    pub transaction: UniversalTransaction,
    pub status: TransactionStatus,
    pub processing: ProcessingMetadata,
    pub enrichment: EnrichmentBag,
    pub validation: ValidationResult,
    pub duplicate_match: Option<String>,
    pub risk_assessment: RiskAssessment,
    pub ready_for_invoice: bool,
    /// Set by the orchestrator when a stage's failure action is
    /// `manual-review` (§4.2). Never cleared automatically — only an
    /// operator resolving the review transitions the transaction onward.
    pub requires_review: bool,
}

impl ProcessedTransaction {
    /// Created by stage 0 (raw-input) inside the orchestrator, per
    /// spec.md §3's lifecycle note.
    pub fn new_in_progress(transaction: UniversalTransaction, pipeline_version: impl Into<String>) -> Self {
        Self {
            transaction,
            status: TransactionStatus::Processing,
            processing: ProcessingMetadata {
                pipeline_version: pipeline_version.into(),
                ..Default::default()
            },
            enrichment: EnrichmentBag::default(),
            validation: ValidationResult::default(),
            duplicate_match: None,
            risk_assessment: RiskAssessment::default(),
            ready_for_invoice: false,
            requires_review: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Completed | TransactionStatus::Failed
        )
    }

    pub fn mark_completed(&mut self) {
        self.status = TransactionStatus::Completed;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = TransactionStatus::Failed;
        self.processing.processing_notes.push(reason.into());
        self.ready_for_invoice = false;
    }

    /// Flags the transaction for manual review without moving it to a
    /// terminal status — the pipeline still runs to completion (§4.2
    /// `manual-review` failure action).
    pub fn flag_for_review(&mut self, reason: impl Into<String>) {
        self.requires_review = true;
        self.processing.processing_notes.push(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::universal_transaction::ConnectorMetadata;
    use crate::value_objects::{ConnectorKind, Currency};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn sample_universal() -> UniversalTransaction {
        UniversalTransaction::new(
            "INV-1",
            Decimal::new(10000, 2),
            Currency::ngn(),
            Utc::now(),
            "desc",
            ConnectorMetadata::None,
            ConnectorKind::ErpSap,
            "inst",
            Utc::now(),
            serde_json::json!({}),
        )
        .unwrap()
    }

    #[test]
    fn new_transaction_starts_in_progress_and_not_terminal() {
        let p = ProcessedTransaction::new_in_progress(sample_universal(), "1.0.0");
        assert_eq!(p.status, TransactionStatus::Processing);
        assert!(!p.is_terminal());
    }

    #[test]
    fn mark_failed_clears_ready_for_invoice_and_is_terminal() {
        let mut p = ProcessedTransaction::new_in_progress(sample_universal(), "1.0.0");
        p.ready_for_invoice = true;
        p.mark_failed("business rule violation");
        assert!(p.is_terminal());
        assert!(!p.ready_for_invoice);
    }

    #[test]
    fn validation_result_invalidates_on_blocking_severity() {
        let mut v = ValidationResult::default();
        v.valid = true;
        v.record(Severity::Warning);
        assert!(v.valid);
        v.record(Severity::Error);
        assert!(!v.valid);
    }
}
