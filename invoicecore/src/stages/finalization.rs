// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Finalization stage (§4.3.7): aggregates a weighted confidence score from
//! the validation, amount, and pattern-matching stages, takes the max of
//! stage-derived and rule-derived risk, and decides invoice-readiness.

use async_trait::async_trait;

use invoicecore_domain::config::ProcessingProfile;
use invoicecore_domain::entities::ProcessedTransaction;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::stage_executor::{
    ResourceRequirements, StageExecutionContext, StageExecutor,
};
use invoicecore_domain::stage_result::{StageKind, StageResult};
use invoicecore_domain::value_objects::RiskLevel;

pub struct FinalizationStage;

impl FinalizationStage {
    pub fn new() -> Self {
        Self
    }

    /// Per-stage sub-score (§4.3.7): 1.0 clean, 0.5 warnings-only, 0.0
    /// skipped or failed.
    fn sub_score(result: Option<&StageResult>) -> f64 {
        match result {
            None => 0.0,
            Some(r) if !r.success => 0.0,
            Some(r) if r.violations.is_empty() => 1.0,
            Some(_) => 0.5,
        }
    }

    fn stage_derived_risk(amount_result: Option<&StageResult>) -> RiskLevel {
        amount_result
            .and_then(|r| {
                r.notes.iter().find_map(|note| {
                    RiskLevelHint::parse(note)
                })
            })
            .unwrap_or(RiskLevelHint(RiskLevel::Low))
            .0
    }

    fn rule_derived_risk(business_rules_result: Option<&StageResult>) -> RiskLevel {
        match business_rules_result {
            Some(r) if r.violations.iter().any(|v| v.severity == invoicecore_domain::value_objects::Severity::Critical) => {
                RiskLevel::Critical
            }
            Some(r) if r.has_blocking_violation() => RiskLevel::High,
            Some(r) if !r.violations.is_empty() => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn finalize(
        transaction: &mut ProcessedTransaction,
        profile: &ProcessingProfile,
        context: &StageExecutionContext,
    ) {
        let validation_result = context.prior_results.get(&StageKind::Validation);
        let amount_result = context.prior_results.get(&StageKind::AmountValidation);
        let pattern_result = context.prior_results.get(&StageKind::PatternMatching);
        let business_rules_result = context.prior_results.get(&StageKind::BusinessRules);

        let weights = &profile.confidence_weights;
        let confidence = weights.validation * Self::sub_score(validation_result)
            + weights.amount * Self::sub_score(amount_result)
            + weights.pattern * Self::sub_score(pattern_result);

        let risk = Self::stage_derived_risk(amount_result).max(Self::rule_derived_risk(business_rules_result));

        let has_critical = business_rules_result
            .map(|r| r.violations.iter().any(|v| v.severity == invoicecore_domain::value_objects::Severity::Critical))
            .unwrap_or(false);

        transaction.processing.confidence = confidence;
        transaction.processing.risk_level = risk;
        transaction.risk_assessment.score = confidence;
        transaction.ready_for_invoice = confidence >= profile.min_confidence_threshold && !has_critical;
    }
}

/// Parses the `"risk score {score:.3} ({level:?})"` note the amount
/// validation stage leaves behind, without coupling the two stages through
/// a shared struct — the note is the stage's published contract.
struct RiskLevelHint(RiskLevel);

impl RiskLevelHint {
    fn parse(note: &str) -> Option<RiskLevelHint> {
        let level = if note.contains("Critical") {
            RiskLevel::Critical
        } else if note.contains("High") {
            RiskLevel::High
        } else if note.contains("Medium") {
            RiskLevel::Medium
        } else if note.contains("Low") {
            RiskLevel::Low
        } else {
            return None;
        };
        Some(RiskLevelHint(level))
    }
}

impl Default for FinalizationStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for FinalizationStage {
    fn stage(&self) -> StageKind {
        StageKind::Finalization
    }

    async fn execute(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let start = std::time::Instant::now();
        let mut finalized = transaction.clone();
        Self::finalize(&mut finalized, &context.profile, context);

        let mut result = StageResult::success(StageKind::Finalization, 0);
        result.notes.push(format!(
            "confidence {:.3}, ready_for_invoice={}",
            finalized.processing.confidence, finalized.ready_for_invoice
        ));
        result.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn can_execute(&self, context: &StageExecutionContext) -> bool {
        context
            .profile
            .stages
            .get(&StageKind::Finalization)
            .map(|s| s.mode != invoicecore_domain::config::ExecutionMode::Skip)
            .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _context: &StageExecutionContext) -> std::time::Duration {
        std::time::Duration::from_millis(2)
    }

    fn get_resource_requirements(&self, _context: &StageExecutionContext) -> ResourceRequirements {
        ResourceRequirements {
            estimated_duration: std::time::Duration::from_millis(2),
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
    use invoicecore_domain::entities::{ConnectorMetadata, UniversalTransaction};
    use invoicecore_domain::value_objects::{ConnectorKind, Currency, TenantId};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn sample_transaction() -> ProcessedTransaction {
        let universal = UniversalTransaction::new(
            "INV-1",
            Decimal::ONE,
            Currency::ngn(),
            Utc::now(),
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

    fn context_with(prior_results: BTreeMap<StageKind, StageResult>) -> StageExecutionContext {
        StageExecutionContext {
            tenant_id: TenantId::new(),
            profile: ProcessingProfile::enterprise_erp(),
            pipeline_deadline: std::time::Instant::now() + std::time::Duration::from_secs(60),
            tenant_default_currency: Currency::ngn(),
            prior_results,
        }
    }

    #[test]
    fn clean_run_across_all_stages_reaches_full_confidence() {
        let mut prior = BTreeMap::new();
        prior.insert(StageKind::Validation, StageResult::success(StageKind::Validation, 1));
        prior.insert(StageKind::AmountValidation, StageResult::success(StageKind::AmountValidation, 1));
        prior.insert(StageKind::PatternMatching, StageResult::success(StageKind::PatternMatching, 1));
        let context = context_with(prior);
        let mut transaction = sample_transaction();
        FinalizationStage::finalize(&mut transaction, &context.profile, &context);
        assert!((transaction.processing.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn critical_business_rule_violation_blocks_invoice_readiness() {
        use invoicecore_domain::stage_result::Violation;
        use invoicecore_domain::value_objects::{RuleCategory, Severity};
        let mut prior = BTreeMap::new();
        prior.insert(StageKind::Validation, StageResult::success(StageKind::Validation, 1));
        let mut business_rules = StageResult::success(StageKind::BusinessRules, 1);
        business_rules
            .violations
            .push(Violation::new("TIN_REQUIRED", RuleCategory::Tax, Severity::Critical));
        prior.insert(StageKind::BusinessRules, business_rules);
        let context = context_with(prior);
        let mut transaction = sample_transaction();
        FinalizationStage::finalize(&mut transaction, &context.profile, &context);
        assert!(!transaction.ready_for_invoice);
    }
}
