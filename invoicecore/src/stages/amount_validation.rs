// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Amount validation stage (§4.3.3): a fraud-signal risk score combining
//! z-score, roundness, velocity, time-of-day, and currency-mismatch
//! signals. Below the profile's low-value threshold the stage short-circuits
//! to `risk = low` without touching the repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use invoicecore_domain::config::{FailureAction, ProcessingProfile};
use invoicecore_domain::entities::ProcessedTransaction;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::TransactionRepository;
use invoicecore_domain::services::stage_executor::{
    ResourceRequirements, StageExecutionContext, StageExecutor,
};
use invoicecore_domain::stage_result::{StageKind, StageResult};
use invoicecore_domain::value_objects::RiskLevel;

/// Nigerian-naira amount above which a perfectly round figure raises the
/// roundness sub-score (§4.3.3).
const ROUNDNESS_WATERMARK: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

pub struct AmountValidationStage {
    repository: Arc<dyn TransactionRepository>,
}

impl AmountValidationStage {
    pub fn new(repository: Arc<dyn TransactionRepository>) -> Self {
        Self { repository }
    }

    fn account_hash(account: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(account.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// `z = |amount - mean| / stddev`, squashed into [0, 1] via `z / (z + 3)`
    /// so a handful of standard deviations saturates the sub-score without a
    /// hard cutoff.
    fn z_score_component(amount: Decimal, mean: Decimal, stddev: Decimal) -> f64 {
        if stddev <= Decimal::ZERO {
            return 0.0;
        }
        let z = ((amount - mean).abs() / stddev).to_f64().unwrap_or(0.0);
        z / (z + 3.0)
    }

    fn roundness_component(amount: Decimal) -> f64 {
        if amount < ROUNDNESS_WATERMARK {
            return 0.0;
        }
        let is_round = (amount % Decimal::from(1000)) == Decimal::ZERO;
        if is_round {
            0.5
        } else {
            0.0
        }
    }

    fn velocity_component(recent_count: u64, historic_hourly_mean: f64) -> f64 {
        if historic_hourly_mean <= 0.0 {
            return if recent_count > 0 { 0.5 } else { 0.0 };
        }
        let ratio = recent_count as f64 / historic_hourly_mean;
        ((ratio - 1.0) / 3.0).clamp(0.0, 1.0)
    }

    /// Transactions between 1am and 4am local (approximated here as UTC)
    /// are statistically rarer and contribute a small anomaly score.
    fn time_of_day_component(timestamp: chrono::DateTime<Utc>) -> f64 {
        let hour = timestamp.hour();
        if (1..4).contains(&hour) {
            0.3
        } else {
            0.0
        }
    }

    fn currency_mismatch_component(
        transaction_currency: &invoicecore_domain::value_objects::Currency,
        tenant_default: &invoicecore_domain::value_objects::Currency,
    ) -> f64 {
        if transaction_currency != tenant_default {
            0.4
        } else {
            0.0
        }
    }

    async fn run(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let txn = &transaction.transaction;
        let profile = &context.profile;

        if txn.amount < profile.low_value_skip_threshold {
            let mut result = StageResult::success(StageKind::AmountValidation, 0);
            result
                .notes
                .push("below low-value threshold, risk assessed low".to_string());
            return Ok(result);
        }

        let stats = self
            .repository
            .tenant_amount_statistics(context.tenant_id)
            .await?;

        let account_key = txn
            .account_identifier
            .as_deref()
            .or(txn.external_reference.as_deref())
            .unwrap_or(&txn.identifier);
        let recent_count = self
            .repository
            .count_same_account_since(
                context.tenant_id,
                &Self::account_hash(account_key),
                txn.timestamp - chrono::Duration::hours(1),
            )
            .await?;

        let z = Self::z_score_component(txn.amount, stats.mean, stats.stddev);
        let roundness = Self::roundness_component(txn.amount);
        let velocity = Self::velocity_component(recent_count, stats.historic_hourly_velocity);
        let time_anomaly = Self::time_of_day_component(txn.timestamp);
        let currency = Self::currency_mismatch_component(&txn.currency, &context.tenant_default_currency);

        let score = ((z + roundness + velocity + time_anomaly + currency) / 5.0).clamp(0.0, 1.0);
        let level = RiskLevel::from_score(score);

        let mut result = StageResult::success(StageKind::AmountValidation, 0);
        result.notes.push(format!("risk score {score:.3} ({level:?})"));

        let manual_review_allowed = profile
            .stages
            .get(&StageKind::AmountValidation)
            .map(|s| s.failure_action == FailureAction::ManualReview)
            .unwrap_or(false);
        if level >= RiskLevel::High && manual_review_allowed {
            result.notes.push("flagged for manual review".to_string());
        }

        Ok(result)
    }
}

#[async_trait]
impl StageExecutor for AmountValidationStage {
    fn stage(&self) -> StageKind {
        StageKind::AmountValidation
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
            .get(&StageKind::AmountValidation)
            .map(|s| s.mode != invoicecore_domain::config::ExecutionMode::Skip)
            .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _context: &StageExecutionContext) -> std::time::Duration {
        std::time::Duration::from_millis(15)
    }

    fn get_resource_requirements(&self, _context: &StageExecutionContext) -> ResourceRequirements {
        ResourceRequirements {
            estimated_duration: std::time::Duration::from_millis(15),
            requires_database: true,
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
    use chrono::TimeZone;

    #[test]
    fn zero_stddev_yields_zero_z_score() {
        assert_eq!(
            AmountValidationStage::z_score_component(Decimal::new(500, 0), Decimal::new(100, 0), Decimal::ZERO),
            0.0
        );
    }

    #[test]
    fn round_amount_above_watermark_raises_roundness_score() {
        assert_eq!(
            AmountValidationStage::roundness_component(Decimal::new(2_000_000, 0)),
            0.5
        );
        assert_eq!(
            AmountValidationStage::roundness_component(Decimal::new(2_000_001, 0)),
            0.0
        );
    }

    #[test]
    fn velocity_spike_saturates_at_one() {
        assert_eq!(AmountValidationStage::velocity_component(100, 1.0), 1.0);
        assert_eq!(AmountValidationStage::velocity_component(1, 1.0), 0.0);
    }

    #[test]
    fn small_hours_add_time_of_day_anomaly() {
        let at_2am = Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap();
        let at_noon = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(AmountValidationStage::time_of_day_component(at_2am) > 0.0);
        assert_eq!(AmountValidationStage::time_of_day_component(at_noon), 0.0);
    }
}
