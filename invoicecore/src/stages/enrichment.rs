// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Enrichment stage (§4.3.6): resolves customer identity via the matching
//! engine, aggregates the business-rules compliance outcome, and unions
//! regulatory flags from both connector characteristics and upstream
//! violations.

use std::sync::Arc;

use async_trait::async_trait;

use invoicecore_domain::config::ProcessingProfile;
use invoicecore_domain::customer::MatchingStrategy;
use invoicecore_domain::entities::ProcessedTransaction;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::customer_matcher::CandidateIdentity;
use invoicecore_domain::services::stage_executor::{
    ResourceRequirements, StageExecutionContext, StageExecutor,
};
use invoicecore_domain::services::CustomerMatcher;
use invoicecore_domain::stage_result::{EnrichmentFragment, StageKind, StageResult};
use invoicecore_domain::value_objects::{characteristics_for, ComplianceLevel, ComplianceRegime, RegulatoryFlag};

pub struct EnrichmentStage {
    matcher: Arc<dyn CustomerMatcher>,
}

impl EnrichmentStage {
    pub fn new(matcher: Arc<dyn CustomerMatcher>) -> Self {
        Self { matcher }
    }

    fn candidate_identity(transaction: &ProcessedTransaction) -> CandidateIdentity {
        let txn = &transaction.transaction;
        let hint = |key: &str| {
            txn.processing_hints
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        CandidateIdentity {
            name: hint("customer_name"),
            phone: hint("customer_phone"),
            email: hint("customer_email"),
            address: hint("customer_address"),
            business_id: hint("customer_business_id"),
            source: Some(txn.source_system),
            source_local_id: txn.account_identifier.clone().or_else(|| txn.external_reference.clone()),
        }
    }

    /// §4.4: enterprise-erp and financial-data use the strict table;
    /// customer-facing uses permissive; everything else balanced.
    fn strategy_for(profile: &ProcessingProfile) -> MatchingStrategy {
        use invoicecore_domain::config::ProfileTag;
        match profile.tag {
            ProfileTag::EnterpriseErp | ProfileTag::FinancialData => MatchingStrategy::Strict,
            ProfileTag::CustomerFacing => MatchingStrategy::Permissive,
            ProfileTag::SmallBusiness => MatchingStrategy::Balanced,
        }
    }

    /// Maps a connector's required compliance regimes onto the
    /// violation-triggered regulatory flag vocabulary (§4.3.6 "union").
    /// Only `Cbn` has a direct counterpart; the others (`Vat`, `Firs`,
    /// `ConsumerProtection`, `DataProtection`, `AntiMoneyLaundering`) are
    /// tracked at the compliance-regime level elsewhere and have no
    /// matching `RegulatoryFlag` variant.
    fn regime_flags(regimes: &[ComplianceRegime]) -> Vec<RegulatoryFlag> {
        regimes
            .iter()
            .filter_map(|r| match r {
                ComplianceRegime::Cbn => Some(RegulatoryFlag::CbnReview),
                _ => None,
            })
            .collect()
    }

    fn compliance_level(business_rules_result: Option<&StageResult>) -> ComplianceLevel {
        match business_rules_result {
            None => ComplianceLevel::Partial,
            Some(result) if result.violations.is_empty() => ComplianceLevel::Compliant,
            Some(result) if !result.has_blocking_violation() => ComplianceLevel::Partial,
            Some(_) => ComplianceLevel::NonCompliant,
        }
    }

    async fn run(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let candidate = Self::candidate_identity(transaction);
        let strategy = Self::strategy_for(&context.profile);
        let match_outcome = self
            .matcher
            .resolve_or_create(context.tenant_id, &candidate, strategy)
            .await?;

        let business_rules_result = context.prior_results.get(&StageKind::BusinessRules);
        let pattern_matching_result = context.prior_results.get(&StageKind::PatternMatching);

        let mut enrichment = EnrichmentFragment {
            customer_id: Some(match_outcome.customer_id),
            customer_name: Some(match_outcome.customer_name),
            merchant_identity: pattern_matching_result.and_then(|r| r.enrichment.merchant_identity.clone()),
            primary_category: pattern_matching_result.and_then(|r| r.enrichment.primary_category.clone()),
            business_purpose: pattern_matching_result.and_then(|r| r.enrichment.business_purpose.clone()),
            regulatory_flags: Vec::new(),
            company_registration_verified: Some(match_outcome.company_registration_verified),
            tax_compliance_verified: Some(match_outcome.tax_compliance_verified),
        };

        let characteristics = characteristics_for(transaction.transaction.source_system);
        let mut flags = Self::regime_flags(&characteristics.compliance_regimes);
        if let Some(result) = business_rules_result {
            flags.extend(result.enrichment.regulatory_flags.iter().copied());
        }
        flags.sort();
        flags.dedup();
        enrichment.regulatory_flags = flags;

        let compliance_level = Self::compliance_level(business_rules_result);

        let mut result = StageResult::success(StageKind::Enrichment, 0);
        result.enrichment = enrichment;
        result
            .notes
            .push(format!("compliance level: {compliance_level:?}"));
        Ok(result)
    }
}

#[async_trait]
impl StageExecutor for EnrichmentStage {
    fn stage(&self) -> StageKind {
        StageKind::Enrichment
    }

    async fn execute(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let start = std::time::Instant::now();
        let mut result = self.run(transaction, context).await?;
        result.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn can_execute(&self, context: &StageExecutionContext) -> bool {
        context
            .profile
            .stages
            .get(&StageKind::Enrichment)
            .map(|s| s.mode != invoicecore_domain::config::ExecutionMode::Skip)
            .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _context: &StageExecutionContext) -> std::time::Duration {
        std::time::Duration::from_millis(10)
    }

    fn get_resource_requirements(&self, _context: &StageExecutionContext) -> ResourceRequirements {
        ResourceRequirements {
            estimated_duration: std::time::Duration::from_millis(10),
            requires_database: true,
            requires_cache: true,
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
    use invoicecore_domain::customer::MatchConfidence;
    use invoicecore_domain::value_objects::CustomerId;

    struct FixedMatcher {
        customer_id: CustomerId,
    }

    #[async_trait]
    impl CustomerMatcher for FixedMatcher {
        async fn resolve_or_create(
            &self,
            _tenant_id: invoicecore_domain::value_objects::TenantId,
            _candidate: &CandidateIdentity,
            _strategy: MatchingStrategy,
        ) -> Result<invoicecore_domain::services::MatchOutcome, CoreError> {
            Ok(invoicecore_domain::services::MatchOutcome {
                customer_id: self.customer_id,
                customer_name: "ABC Ltd".to_string(),
                confidence: MatchConfidence::High,
                score: 0.9,
                company_registration_verified: true,
                tax_compliance_verified: false,
            })
        }
    }

    #[test]
    fn compliance_level_is_compliant_when_business_rules_had_no_violations() {
        let result = StageResult::success(StageKind::BusinessRules, 1);
        assert_eq!(EnrichmentStage::compliance_level(Some(&result)), ComplianceLevel::Compliant);
    }

    #[test]
    fn compliance_level_is_non_compliant_on_blocking_violation() {
        use invoicecore_domain::stage_result::Violation;
        use invoicecore_domain::value_objects::{RuleCategory, Severity};
        let mut result = StageResult::success(StageKind::BusinessRules, 1);
        result
            .violations
            .push(Violation::new("X", RuleCategory::Tax, Severity::Error));
        assert_eq!(EnrichmentStage::compliance_level(Some(&result)), ComplianceLevel::NonCompliant);
    }

    #[tokio::test]
    async fn run_populates_customer_identity_from_matcher() {
        let customer_id = CustomerId::new();
        let matcher = Arc::new(FixedMatcher { customer_id });
        let stage = EnrichmentStage::new(matcher);

        let universal = invoicecore_domain::entities::UniversalTransaction::new(
            "INV-1",
            rust_decimal::Decimal::ONE,
            invoicecore_domain::value_objects::Currency::ngn(),
            chrono::Utc::now(),
            "desc",
            invoicecore_domain::entities::ConnectorMetadata::None,
            invoicecore_domain::value_objects::ConnectorKind::ErpSap,
            "inst",
            chrono::Utc::now(),
            serde_json::json!({}),
        )
        .unwrap();
        let transaction = ProcessedTransaction::new_in_progress(universal, "1.0.0");

        let context = StageExecutionContext {
            tenant_id: invoicecore_domain::value_objects::TenantId::new(),
            profile: ProcessingProfile::enterprise_erp(),
            pipeline_deadline: std::time::Instant::now() + std::time::Duration::from_secs(60),
            tenant_default_currency: invoicecore_domain::value_objects::Currency::ngn(),
            prior_results: Default::default(),
        };

        let result = stage.run(&transaction, &context).await.unwrap();
        assert_eq!(result.enrichment.customer_id, Some(customer_id));
    }
}
