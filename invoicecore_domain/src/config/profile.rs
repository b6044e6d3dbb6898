// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Processing Profile (C3): per-connector-category pipeline configuration,
//! and the four canonical profile builders from §4.2's table.

use crate::error::CoreError;
use crate::stage_result::StageKind;
use crate::value_objects::{ComplianceRegime, RiskLevel};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileTag {
    EnterpriseErp,
    SmallBusiness,
    CustomerFacing,
    FinancialData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Required,
    Optional,
    Conditional,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureAction {
    FailPipeline,
    ContinueWithWarning,
    RetryWithDefaults,
    ManualReview,
}

/// Three weights over [validation, amount, pattern], summing to 1.0 ± 0.01
/// (§4.2, testable invariant §8.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub validation: f64,
    pub amount: f64,
    pub pattern: f64,
}

impl ConfidenceWeights {
    pub fn new(validation: f64, amount: f64, pattern: f64) -> Result<Self, CoreError> {
        let weights = Self {
            validation,
            amount,
            pattern,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let sum = self.validation + self.amount + self.pattern;
        if (sum - 1.0).abs() > 0.01 {
            return Err(CoreError::invalid_config(format!(
                "confidence weights must sum to 1.0 +/- 0.01, got {sum}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub stage: StageKind,
    pub mode: ExecutionMode,
    pub failure_action: FailureAction,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub dependencies: Vec<StageKind>,
}

/// One effective-date window in a VAT rate schedule — resolves the VAT-rate
/// open question from spec.md §9 (see DESIGN.md): configurable rate with
/// effective-date windows rather than a single hard-coded constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatRateWindow {
    #[serde(with = "crate::value_objects::datetime_serde")]
    pub effective_from: DateTime<Utc>,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatRateSchedule {
    /// Ordered oldest-to-newest; `rate_at` scans backwards for the latest
    /// window whose `effective_from` is `<=` the query time.
    pub windows: Vec<VatRateWindow>,
}

impl VatRateSchedule {
    /// Default schedule: a single window at 7.5% from 2020-02-01, matching
    /// the hard-coded rate in spec.md's end-to-end scenarios.
    pub fn default_nigerian() -> Self {
        Self {
            windows: vec![VatRateWindow {
                effective_from: Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap(),
                rate: Decimal::new(75, 3), // 0.075
            }],
        }
    }

    pub fn rate_at(&self, at: DateTime<Utc>) -> Option<Decimal> {
        self.windows
            .iter()
            .filter(|w| w.effective_from <= at)
            .max_by_key(|w| w.effective_from)
            .map(|w| w.rate)
    }
}

/// Per-connector-category pipeline configuration (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingProfile {
    pub tag: ProfileTag,
    pub stages: BTreeMap<StageKind, StageConfig>,
    pub min_confidence_threshold: f64,
    pub max_risk_tolerance: RiskLevel,
    pub confidence_weights: ConfidenceWeights,
    pub compliance_regimes: Vec<ComplianceRegime>,
    pub low_value_skip_threshold: Decimal,
    pub detailed_logging: bool,
    pub max_total_wall_time_secs: u64,
    pub duplicate_fuzzy_window_secs: i64,
    pub vat_rate_schedule: VatRateSchedule,
}

impl ProcessingProfile {
    fn stage(
        stage: StageKind,
        mode: ExecutionMode,
        failure_action: FailureAction,
        retry_count: u32,
        dependencies: &[StageKind],
        total_wall_time_secs: u64,
        stage_count: u64,
    ) -> (StageKind, StageConfig) {
        (
            stage,
            StageConfig {
                stage,
                mode,
                failure_action,
                timeout_secs: (total_wall_time_secs / stage_count.max(1)).max(1),
                retry_count,
                dependencies: dependencies.to_vec(),
            },
        )
    }

    /// enterprise-erp: validation warn-only, duplicate optional,
    /// amount-check skipped, business-rules/finalization fail-pipeline.
    pub fn enterprise_erp() -> Self {
        use ExecutionMode::*;
        use FailureAction::*;
        use StageKind::*;
        let total = 180;
        let stages = BTreeMap::from([
            Self::stage(RawInput, Required, ContinueWithWarning, 0, &[], total, 8),
            Self::stage(Validation, Required, ContinueWithWarning, 0, &[RawInput], total, 8),
            Self::stage(DuplicateDetection, Optional, ContinueWithWarning, 0, &[Validation], total, 8),
            Self::stage(AmountValidation, Skip, ContinueWithWarning, 0, &[Validation], total, 8),
            Self::stage(
                BusinessRules,
                Required,
                FailPipeline,
                0,
                &[DuplicateDetection, AmountValidation],
                total,
                8,
            ),
            Self::stage(PatternMatching, Required, ContinueWithWarning, 0, &[BusinessRules], total, 8),
            Self::stage(Enrichment, Required, ContinueWithWarning, 0, &[PatternMatching], total, 8),
            Self::stage(Finalization, Required, FailPipeline, 0, &[Enrichment], total, 8),
        ]);
        Self {
            tag: ProfileTag::EnterpriseErp,
            stages,
            min_confidence_threshold: 0.8,
            max_risk_tolerance: RiskLevel::Medium,
            confidence_weights: ConfidenceWeights::new(0.3, 0.1, 0.6).unwrap(),
            compliance_regimes: vec![ComplianceRegime::Vat, ComplianceRegime::Firs],
            low_value_skip_threshold: Decimal::new(100_000, 2),
            detailed_logging: false,
            max_total_wall_time_secs: total,
            duplicate_fuzzy_window_secs: 24 * 3600,
            vat_rate_schedule: VatRateSchedule::default_nigerian(),
        }
    }

    /// small-business: validation retries once, duplicate/amount-check
    /// required-but-recoverable, business-rules warns.
    pub fn small_business() -> Self {
        use ExecutionMode::*;
        use FailureAction::*;
        use StageKind::*;
        let total = 90;
        let stages = BTreeMap::from([
            Self::stage(RawInput, Required, ContinueWithWarning, 0, &[], total, 8),
            Self::stage(Validation, Required, RetryWithDefaults, 1, &[RawInput], total, 8),
            Self::stage(DuplicateDetection, Required, ContinueWithWarning, 0, &[Validation], total, 8),
            Self::stage(AmountValidation, Optional, ContinueWithWarning, 0, &[Validation], total, 8),
            Self::stage(
                BusinessRules,
                Required,
                ContinueWithWarning,
                0,
                &[DuplicateDetection, AmountValidation],
                total,
                8,
            ),
            Self::stage(PatternMatching, Required, ContinueWithWarning, 0, &[BusinessRules], total, 8),
            Self::stage(Enrichment, Required, ContinueWithWarning, 0, &[PatternMatching], total, 8),
            Self::stage(Finalization, Required, FailPipeline, 0, &[Enrichment], total, 8),
        ]);
        Self {
            tag: ProfileTag::SmallBusiness,
            stages,
            min_confidence_threshold: 0.6,
            max_risk_tolerance: RiskLevel::Medium,
            confidence_weights: ConfidenceWeights::new(0.4, 0.2, 0.4).unwrap(),
            compliance_regimes: vec![ComplianceRegime::Vat],
            low_value_skip_threshold: Decimal::new(50_000, 2),
            detailed_logging: false,
            max_total_wall_time_secs: total,
            duplicate_fuzzy_window_secs: 12 * 3600,
            vat_rate_schedule: VatRateSchedule::default_nigerian(),
        }
    }

    /// customer-facing: validation retries twice, amount-check escalates
    /// to manual review.
    pub fn customer_facing() -> Self {
        use ExecutionMode::*;
        use FailureAction::*;
        use StageKind::*;
        let total = 60;
        let stages = BTreeMap::from([
            Self::stage(RawInput, Required, ContinueWithWarning, 0, &[], total, 8),
            Self::stage(Validation, Required, RetryWithDefaults, 2, &[RawInput], total, 8),
            Self::stage(DuplicateDetection, Required, ContinueWithWarning, 0, &[Validation], total, 8),
            Self::stage(AmountValidation, Required, ManualReview, 0, &[Validation], total, 8),
            Self::stage(
                BusinessRules,
                Required,
                ContinueWithWarning,
                0,
                &[DuplicateDetection, AmountValidation],
                total,
                8,
            ),
            Self::stage(PatternMatching, Required, ContinueWithWarning, 0, &[BusinessRules], total, 8),
            Self::stage(Enrichment, Required, ContinueWithWarning, 0, &[PatternMatching], total, 8),
            Self::stage(Finalization, Required, FailPipeline, 0, &[Enrichment], total, 8),
        ]);
        Self {
            tag: ProfileTag::CustomerFacing,
            stages,
            min_confidence_threshold: 0.65,
            max_risk_tolerance: RiskLevel::High,
            confidence_weights: ConfidenceWeights::new(0.4, 0.4, 0.2).unwrap(),
            compliance_regimes: vec![ComplianceRegime::Vat, ComplianceRegime::ConsumerProtection],
            low_value_skip_threshold: Decimal::new(20_000, 2),
            detailed_logging: false,
            max_total_wall_time_secs: total,
            duplicate_fuzzy_window_secs: 4 * 3600,
            vat_rate_schedule: VatRateSchedule::default_nigerian(),
        }
    }

    /// financial-data: the strictest profile — duplicate and finalization
    /// both fail-pipeline, amount-check escalates to manual review.
    pub fn financial_data() -> Self {
        use ExecutionMode::*;
        use FailureAction::*;
        use StageKind::*;
        let total = 150;
        let stages = BTreeMap::from([
            Self::stage(RawInput, Required, ContinueWithWarning, 0, &[], total, 8),
            Self::stage(Validation, Required, RetryWithDefaults, 2, &[RawInput], total, 8),
            Self::stage(DuplicateDetection, Required, FailPipeline, 0, &[Validation], total, 8),
            Self::stage(AmountValidation, Required, ManualReview, 0, &[Validation], total, 8),
            Self::stage(
                BusinessRules,
                Required,
                FailPipeline,
                0,
                &[DuplicateDetection, AmountValidation],
                total,
                8,
            ),
            Self::stage(PatternMatching, Required, ContinueWithWarning, 0, &[BusinessRules], total, 8),
            Self::stage(Enrichment, Required, ContinueWithWarning, 0, &[PatternMatching], total, 8),
            Self::stage(Finalization, Required, FailPipeline, 0, &[Enrichment], total, 8),
        ]);
        Self {
            tag: ProfileTag::FinancialData,
            stages,
            min_confidence_threshold: 0.75,
            max_risk_tolerance: RiskLevel::Low,
            confidence_weights: ConfidenceWeights::new(0.3, 0.5, 0.2).unwrap(),
            compliance_regimes: vec![
                ComplianceRegime::Cbn,
                ComplianceRegime::AntiMoneyLaundering,
                ComplianceRegime::Vat,
            ],
            low_value_skip_threshold: Decimal::new(10_000, 2),
            detailed_logging: true,
            max_total_wall_time_secs: total,
            duplicate_fuzzy_window_secs: 72 * 3600,
            vat_rate_schedule: VatRateSchedule::default_nigerian(),
        }
    }

    pub fn for_tag(tag: ProfileTag) -> Self {
        match tag {
            ProfileTag::EnterpriseErp => Self::enterprise_erp(),
            ProfileTag::SmallBusiness => Self::small_business(),
            ProfileTag::CustomerFacing => Self::customer_facing(),
            ProfileTag::FinancialData => Self::financial_data(),
        }
    }

    pub fn to_dag(&self) -> super::dag::StageDag {
        let mut dag = super::dag::StageDag::new();
        for config in self.stages.values() {
            dag.add_stage(config.stage);
            for dep in &config.dependencies {
                dag.add_dependency(config.stage, *dep);
            }
        }
        dag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_canonical_profiles_have_valid_weights() {
        for profile in [
            ProcessingProfile::enterprise_erp(),
            ProcessingProfile::small_business(),
            ProcessingProfile::customer_facing(),
            ProcessingProfile::financial_data(),
        ] {
            profile.confidence_weights.validate().unwrap();
        }
    }

    #[test]
    fn canonical_profiles_produce_an_acyclic_dag() {
        for profile in [
            ProcessingProfile::enterprise_erp(),
            ProcessingProfile::small_business(),
            ProcessingProfile::customer_facing(),
            ProcessingProfile::financial_data(),
        ] {
            let order = profile.to_dag().topological_sort().unwrap();
            assert_eq!(order.len(), profile.stages.len());
        }
    }

    #[test]
    fn vat_rate_schedule_resolves_default_window() {
        let schedule = VatRateSchedule::default_nigerian();
        let rate = schedule.rate_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(rate, Some(Decimal::new(75, 3)));
    }
}
