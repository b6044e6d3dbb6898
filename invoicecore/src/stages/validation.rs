// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Validation stage (§4.3.1): structural and connector-mandatory field
//! checks. Pure — no I/O, no database.

use async_trait::async_trait;
use rust_decimal::Decimal;

use invoicecore_domain::config::ProcessingProfile;
use invoicecore_domain::entities::{ConnectorMetadata, ProcessedTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::stage_executor::{
    ResourceRequirements, StageExecutionContext, StageExecutor,
};
use invoicecore_domain::stage_result::{StageKind, StageResult, Violation};
use invoicecore_domain::value_objects::{ConnectorCategory, RuleCategory, Severity};
use invoicecore_domain::validators::is_valid_nigerian_account_number;

use super::timed;

pub struct ValidationStage;

impl ValidationStage {
    pub fn new() -> Self {
        Self
    }

    /// Pure validation logic (§4.3.1). Returns every violation found; the
    /// caller decides whether any are blocking.
    pub fn validate(
        transaction: &ProcessedTransaction,
        profile: &ProcessingProfile,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Vec<Violation> {
        let txn = &transaction.transaction;
        let mut violations = Vec::new();

        if txn.identifier.trim().is_empty() {
            violations.push(
                Violation::new("IDENTIFIER_REQUIRED", RuleCategory::DataQuality, Severity::Error)
                    .with_field("identifier"),
            );
        }

        if txn.amount <= Decimal::ZERO {
            violations.push(
                Violation::new("AMOUNT_POSITIVE", RuleCategory::DataQuality, Severity::Error)
                    .with_field("amount")
                    .with_values(txn.amount.to_string(), "> 0"),
            );
        }

        let skew = txn.timestamp - now;
        if skew > chrono::Duration::hours(24) {
            violations.push(
                Violation::new("TIMESTAMP_FUTURE", RuleCategory::DataQuality, Severity::Error)
                    .with_field("timestamp")
                    .with_remediation("timestamp must not be more than 24h in the future"),
            );
        } else if skew > chrono::Duration::zero() {
            violations.push(
                Violation::new(
                    "TIMESTAMP_NEAR_FUTURE",
                    RuleCategory::DataQuality,
                    Severity::Warning,
                )
                .with_field("timestamp"),
            );
        } else if now - txn.timestamp > chrono::Duration::days(365 * 10) {
            violations.push(
                Violation::new("TIMESTAMP_TOO_OLD", RuleCategory::DataQuality, Severity::Warning)
                    .with_field("timestamp"),
            );
        }

        if txn.description.trim().is_empty() {
            violations.push(
                Violation::new("DESCRIPTION_REQUIRED", RuleCategory::DataQuality, Severity::Warning)
                    .with_field("description"),
            );
        }

        violations.extend(Self::connector_mandatory_fields(transaction));

        if profile.tag == invoicecore_domain::config::ProfileTag::FinancialData {
            violations.extend(Self::financial_data_fields(transaction));
        }

        violations
    }

    fn connector_mandatory_fields(transaction: &ProcessedTransaction) -> Vec<Violation> {
        let txn = &transaction.transaction;
        let mut violations = Vec::new();
        match (txn.source_system.category(), &txn.metadata) {
            (ConnectorCategory::Pos, ConnectorMetadata::Pos(pos)) => {
                if pos.terminal_id.is_none() {
                    violations.push(Violation::new(
                        "POS_TERMINAL_ID_MISSING",
                        RuleCategory::DataQuality,
                        Severity::Warning,
                    ));
                }
            }
            (ConnectorCategory::Banking, ConnectorMetadata::Banking(bank)) => {
                if bank.bank_reference.is_none() {
                    violations.push(Violation::new(
                        "BANK_REFERENCE_MISSING",
                        RuleCategory::DataQuality,
                        Severity::Warning,
                    ));
                }
            }
            _ => {}
        }
        violations
    }

    /// Financial-data profile additionally requires a bank reference and a
    /// valid 10-digit Nigerian account number (§4.3.1).
    fn financial_data_fields(transaction: &ProcessedTransaction) -> Vec<Violation> {
        let mut violations = Vec::new();
        if let ConnectorMetadata::Banking(bank) = &transaction.transaction.metadata {
            if bank.bank_reference.is_none() {
                violations.push(Violation::new(
                    "BANK_REFERENCE_REQUIRED",
                    RuleCategory::FinancialRegs,
                    Severity::Error,
                ));
            }
            match &bank.account_number {
                Some(account) if is_valid_nigerian_account_number(account) => {}
                Some(account) => {
                    violations.push(
                        Violation::new(
                            "ACCOUNT_NUMBER_FORMAT",
                            RuleCategory::FinancialRegs,
                            Severity::Error,
                        )
                        .with_values(account.clone(), "10 digits"),
                    );
                }
                None => {
                    violations.push(Violation::new(
                        "ACCOUNT_NUMBER_REQUIRED",
                        RuleCategory::FinancialRegs,
                        Severity::Error,
                    ));
                }
            }
        }
        violations
    }
}

impl Default for ValidationStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for ValidationStage {
    fn stage(&self) -> StageKind {
        StageKind::Validation
    }

    async fn execute(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let (violations, elapsed_ms) =
            timed(|| Self::validate(transaction, &context.profile, chrono::Utc::now()));
        let mut result = StageResult::success(StageKind::Validation, elapsed_ms);
        result.violations = violations;
        if result.has_blocking_violation() {
            result.success = false;
        }
        Ok(result)
    }

    fn can_execute(&self, context: &StageExecutionContext) -> bool {
        context
            .profile
            .stages
            .get(&StageKind::Validation)
            .map(|s| s.mode != invoicecore_domain::config::ExecutionMode::Skip)
            .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _context: &StageExecutionContext) -> std::time::Duration {
        std::time::Duration::from_millis(1)
    }

    fn get_resource_requirements(&self, _context: &StageExecutionContext) -> ResourceRequirements {
        ResourceRequirements {
            estimated_duration: std::time::Duration::from_millis(1),
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
    use invoicecore_domain::config::ProcessingProfile;
    use invoicecore_domain::entities::UniversalTransaction;
    use invoicecore_domain::value_objects::{ConnectorKind, Currency};

    fn txn(amount: Decimal, timestamp: chrono::DateTime<Utc>) -> ProcessedTransaction {
        let universal = UniversalTransaction::new(
            "INV-1",
            amount,
            Currency::ngn(),
            timestamp,
            "desc",
            ConnectorMetadata::None,
            ConnectorKind::ErpSap,
            "inst",
            Utc::now(),
            serde_json::json!({}),
        )
        .unwrap();
        ProcessedTransaction::new_in_progress(universal, "1.0.0")
    }

    #[test]
    fn zero_amount_is_a_validation_error() {
        let t = txn(Decimal::ZERO, Utc::now());
        let violations = ValidationStage::validate(&t, &ProcessingProfile::enterprise_erp(), Utc::now());
        assert!(violations.iter().any(|v| v.rule_id == "AMOUNT_POSITIVE" && v.severity.is_blocking()));
    }

    #[test]
    fn twenty_five_hours_future_is_an_error_but_23h59m_is_only_a_warning() {
        let now = Utc::now();
        let far_future = txn(Decimal::ONE, now + chrono::Duration::hours(25));
        let violations = ValidationStage::validate(&far_future, &ProcessingProfile::enterprise_erp(), now);
        assert!(violations
            .iter()
            .any(|v| v.rule_id == "TIMESTAMP_FUTURE" && v.severity.is_blocking()));

        let near_future = txn(Decimal::ONE, now + chrono::Duration::minutes(23 * 60 + 59));
        let violations = ValidationStage::validate(&near_future, &ProcessingProfile::enterprise_erp(), now);
        assert!(!violations.iter().any(|v| v.severity.is_blocking()));
        assert!(violations.iter().any(|v| v.rule_id == "TIMESTAMP_NEAR_FUTURE"));
    }

    #[test]
    fn financial_data_profile_requires_valid_account_number() {
        let mut t = txn(Decimal::ONE, Utc::now());
        t.transaction.metadata = ConnectorMetadata::Banking(
            invoicecore_domain::entities::BankingMetadata {
                bank_reference: Some("REF1".into()),
                account_number: Some("123".into()),
            },
        );
        let violations = ValidationStage::validate(&t, &ProcessingProfile::financial_data(), Utc::now());
        assert!(violations.iter().any(|v| v.rule_id == "ACCOUNT_NUMBER_FORMAT"));
    }
}
