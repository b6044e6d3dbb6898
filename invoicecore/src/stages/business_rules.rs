// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Business rules stage (§4.3.4): the static Nigerian-compliance rule set.
//! Pure — every rule is a predicate over the transaction and profile, no
//! I/O.

use async_trait::async_trait;
use rust_decimal::Decimal;

use invoicecore_domain::config::ProcessingProfile;
use invoicecore_domain::entities::{ConnectorMetadata, ProcessedTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::stage_executor::{
    ResourceRequirements, StageExecutionContext, StageExecutor,
};
use invoicecore_domain::stage_result::{EnrichmentFragment, StageKind, StageResult, Violation};
use invoicecore_domain::value_objects::{ConnectorCategory, RegulatoryFlag, RuleCategory, Severity};
use invoicecore_domain::validators::{is_valid_invoice_number, is_valid_nigerian_account_number};

use super::timed;

/// Large-cash reporting watermark (₦500,000, §4.3.4).
const LARGE_CASH_WATERMARK: Decimal = Decimal::from_parts(500_000, 0, 0, false, 0);

/// TIN-required watermark (₦10,000, §4.3.4).
const TIN_REQUIRED_WATERMARK: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// VAT rate tolerance (§4.3.4: `|vat - subtotal * rate| <= 0.01`).
const VAT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub struct BusinessRulesStage;

impl BusinessRulesStage {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        transaction: &ProcessedTransaction,
        profile: &ProcessingProfile,
        now: chrono::DateTime<chrono::Utc>,
    ) -> (Vec<Violation>, EnrichmentFragment) {
        let txn = &transaction.transaction;
        let mut violations = Vec::new();
        let mut enrichment = EnrichmentFragment::default();

        if let (Some(subtotal), Some(vat)) = (txn.subtotal, txn.vat) {
            if let Some(rate) = profile.vat_rate_schedule.rate_at(txn.timestamp) {
                if (vat - subtotal * rate).abs() > VAT_TOLERANCE {
                    violations.push(
                        Violation::new("VAT_RATE_VALIDATION", RuleCategory::Tax, Severity::Error)
                            .with_values(vat.to_string(), (subtotal * rate).to_string()),
                    );
                }
            }
        }

        if txn.amount >= TIN_REQUIRED_WATERMARK {
            let tin_present = txn
                .processing_hints
                .get("tin")
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.trim().is_empty());
            if !tin_present {
                violations.push(Violation::new("TIN_REQUIRED", RuleCategory::Tax, Severity::Critical));
            }
        }

        let category = txn.source_system.category();

        if category == ConnectorCategory::Erp {
            let invoice_number = match &txn.metadata {
                ConnectorMetadata::Erp(erp) => erp.invoice_number.as_deref(),
                _ => None,
            };
            match invoice_number {
                Some(number) if is_valid_invoice_number(number) => {}
                Some(number) => violations.push(
                    Violation::new("ERP_INVOICE_NUMBER_FORMAT", RuleCategory::Accounting, Severity::Error)
                        .with_values(number.to_string(), "^[A-Z]*-?\\d{4}[-/]?\\d{3,6}$"),
                ),
                None => violations.push(Violation::new(
                    "ERP_INVOICE_NUMBER_MISSING",
                    RuleCategory::Accounting,
                    Severity::Error,
                )),
            }
        }

        if category == ConnectorCategory::Pos {
            if let ConnectorMetadata::Pos(pos) = &txn.metadata {
                if pos.receipt_number.is_none() || pos.terminal_id.is_none() {
                    violations.push(Violation::new(
                        "POS_RECEIPT_OR_TERMINAL_MISSING",
                        RuleCategory::DataQuality,
                        Severity::Error,
                    ));
                }
            }
        }

        if category == ConnectorCategory::Ecommerce {
            if let ConnectorMetadata::Ecommerce(ecom) = &txn.metadata {
                if ecom.physical_goods && ecom.shipping_address.is_none() {
                    violations.push(Violation::new(
                        "ECOMMERCE_SHIPPING_ADDRESS_REQUIRED",
                        RuleCategory::ConsumerProtection,
                        Severity::Error,
                    ));
                }
            }
        }

        if category == ConnectorCategory::Accounting {
            if let ConnectorMetadata::Accounting(acct) = &txn.metadata {
                if acct.debit_account.is_none() || acct.credit_account.is_none() {
                    violations.push(Violation::new(
                        "ACCOUNTING_DOUBLE_ENTRY_REQUIRED",
                        RuleCategory::Accounting,
                        Severity::Error,
                    ));
                }
            }
        }

        if category == ConnectorCategory::Banking {
            if let ConnectorMetadata::Banking(bank) = &txn.metadata {
                let account_ok = bank
                    .account_number
                    .as_deref()
                    .is_some_and(is_valid_nigerian_account_number);
                if bank.bank_reference.is_none() || !account_ok {
                    violations.push(Violation::new(
                        "BANKING_REFERENCE_AND_ACCOUNT_REQUIRED",
                        RuleCategory::FinancialRegs,
                        Severity::Error,
                    ));
                }
            }
        }

        if txn.timestamp > now {
            violations.push(Violation::new(
                "TRANSACTION_TIMESTAMP_IN_FUTURE",
                RuleCategory::DataQuality,
                Severity::Error,
            ));
        }

        if txn.currency != invoicecore_domain::value_objects::Currency::ngn() {
            violations.push(Violation::new(
                "FOREIGN_CURRENCY_REVIEW",
                RuleCategory::FinancialRegs,
                Severity::Warning,
            ));
            enrichment.regulatory_flags.push(RegulatoryFlag::ForeignCurrencyReview);
        }

        if txn.amount > LARGE_CASH_WATERMARK {
            violations.push(Violation::new(
                "LARGE_CASH_REPORTING",
                RuleCategory::AntiFraud,
                Severity::Warning,
            ));
            enrichment.regulatory_flags.push(RegulatoryFlag::LargeCashReporting);
        }

        (violations, enrichment)
    }
}

impl Default for BusinessRulesStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for BusinessRulesStage {
    fn stage(&self) -> StageKind {
        StageKind::BusinessRules
    }

    async fn execute(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let ((violations, enrichment), elapsed_ms) =
            timed(|| Self::evaluate(transaction, &context.profile, chrono::Utc::now()));
        let mut result = StageResult::success(StageKind::BusinessRules, elapsed_ms);
        result.violations = violations;
        result.enrichment = enrichment;
        if result.has_blocking_violation() {
            result.success = false;
        }
        Ok(result)
    }

    fn can_execute(&self, context: &StageExecutionContext) -> bool {
        context
            .profile
            .stages
            .get(&StageKind::BusinessRules)
            .map(|s| s.mode != invoicecore_domain::config::ExecutionMode::Skip)
            .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _context: &StageExecutionContext) -> std::time::Duration {
        std::time::Duration::from_millis(3)
    }

    fn get_resource_requirements(&self, _context: &StageExecutionContext) -> ResourceRequirements {
        ResourceRequirements {
            estimated_duration: std::time::Duration::from_millis(3),
            requires_database: false,
            requires_cache: false,
        }
    }

    async fn prepare_stage(&self, _context: &StageExecutionContext) -> Result<(), CoreError> {
        Ok(())
    }

    async fn cleanup_stage(&self, _context: &StageExecutionContext) -> Result<(), CoreError> {
        Ok(())
    }

    fn validate_configuration(&self, _profile: &ProcessingProfile) -> Result<(), CoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use invoicecore_domain::entities::UniversalTransaction;
    use invoicecore_domain::value_objects::{ConnectorKind, Currency};

    fn base_txn(kind: ConnectorKind, metadata: ConnectorMetadata) -> ProcessedTransaction {
        let universal = UniversalTransaction::new(
            "INV-2024-0001",
            Decimal::new(50_000_00, 2),
            Currency::ngn(),
            Utc::now(),
            "desc",
            metadata,
            kind,
            "inst",
            Utc::now(),
            serde_json::json!({"tin": "12345678901234"}),
        )
        .unwrap();
        ProcessedTransaction::new_in_progress(universal, "1.0.0")
    }

    #[test]
    fn vat_mismatch_beyond_tolerance_is_an_error() {
        let mut t = base_txn(ConnectorKind::ErpSap, ConnectorMetadata::Erp(Default::default()));
        t.transaction.subtotal = Some(Decimal::new(100_00, 2));
        t.transaction.vat = Some(Decimal::new(10_00, 2));
        let (violations, _) = BusinessRulesStage::evaluate(&t, &ProcessingProfile::enterprise_erp(), Utc::now());
        assert!(violations.iter().any(|v| v.rule_id == "VAT_RATE_VALIDATION"));
    }

    #[test]
    fn missing_tin_above_threshold_is_critical() {
        let mut t = base_txn(ConnectorKind::ErpSap, ConnectorMetadata::Erp(Default::default()));
        t.transaction.processing_hints.clear();
        let (violations, _) = BusinessRulesStage::evaluate(&t, &ProcessingProfile::enterprise_erp(), Utc::now());
        assert!(violations
            .iter()
            .any(|v| v.rule_id == "TIN_REQUIRED" && v.severity == Severity::Critical));
    }

    #[test]
    fn foreign_currency_warns_and_sets_regulatory_flag() {
        let universal = UniversalTransaction::new(
            "INV-2024-0001",
            Decimal::new(50_000_00, 2),
            Currency::new("USD").unwrap(),
            Utc::now(),
            "desc",
            ConnectorMetadata::Erp(Default::default()),
            ConnectorKind::ErpSap,
            "inst",
            Utc::now(),
            serde_json::json!({"tin": "12345678901234"}),
        )
        .unwrap();
        let t = ProcessedTransaction::new_in_progress(universal, "1.0.0");
        let (violations, enrichment) =
            BusinessRulesStage::evaluate(&t, &ProcessingProfile::enterprise_erp(), Utc::now());
        assert!(violations
            .iter()
            .any(|v| v.rule_id == "FOREIGN_CURRENCY_REVIEW" && !v.severity.is_blocking()));
        assert!(enrichment
            .regulatory_flags
            .contains(&RegulatoryFlag::ForeignCurrencyReview));
    }
}
