// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Duplicate detection stage (§4.3.2): exact fingerprint match, then a
//! fuzzy match within the profile's time window. The only stage besides
//! enrichment that reads the transaction repository.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use invoicecore_domain::config::{FailureAction, ProcessingProfile};
use invoicecore_domain::entities::ProcessedTransaction;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::transaction_repository::{ExactFingerprint, FuzzyFingerprint};
use invoicecore_domain::repositories::TransactionRepository;
use invoicecore_domain::services::stage_executor::{
    ResourceRequirements, StageExecutionContext, StageExecutor,
};
use invoicecore_domain::stage_result::{StageKind, StageResult};
use invoicecore_domain::value_objects::TenantId;

use super::timed;

pub struct DuplicateDetectionStage {
    repository: Arc<dyn TransactionRepository>,
}

impl DuplicateDetectionStage {
    pub fn new(repository: Arc<dyn TransactionRepository>) -> Self {
        Self { repository }
    }

    /// Stable hash of the counterparty fields used for fuzzy matching:
    /// account identifier, falling back to external reference, falling
    /// back to the free-text description (§4.3.2).
    fn counterparty_hash(transaction: &ProcessedTransaction) -> String {
        let txn = &transaction.transaction;
        let counterparty = txn
            .account_identifier
            .as_deref()
            .or(txn.external_reference.as_deref())
            .unwrap_or(&txn.description);
        let mut hasher = Sha256::new();
        hasher.update(counterparty.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn run(
        &self,
        transaction: &ProcessedTransaction,
        tenant_id: TenantId,
        profile: &ProcessingProfile,
    ) -> Result<StageResult, CoreError> {
        let txn = &transaction.transaction;

        let exact_key = ExactFingerprint {
            tenant_id,
            source_system: txn.source_system,
            identifier: txn.identifier.clone(),
        };
        if let Some(existing) = self.repository.find_by_exact_fingerprint(&exact_key).await? {
            return Ok(Self::duplicate_result(profile, existing.transaction.identifier));
        }

        let fuzzy_key = FuzzyFingerprint {
            tenant_id,
            amount_rounded: txn.amount.round_dp(0),
            counterparty_hash: Self::counterparty_hash(transaction),
            timestamp_bucket: txn.timestamp,
        };
        let window = chrono::Duration::seconds(profile.duplicate_fuzzy_window_secs);
        let candidates = self
            .repository
            .find_by_fuzzy_fingerprint(&fuzzy_key, window)
            .await?;
        if let Some(existing) = candidates.into_iter().next() {
            return Ok(Self::duplicate_result(profile, existing.transaction.identifier));
        }

        Ok(StageResult::success(StageKind::DuplicateDetection, 0))
    }

    /// On duplicate, outcome depends on profile (§4.3.2): financial-data
    /// fails the pipeline; others record a warning and attach the prior
    /// identifier.
    fn duplicate_result(profile: &ProcessingProfile, prior_identifier: String) -> StageResult {
        let fails_pipeline = profile
            .stages
            .get(&StageKind::DuplicateDetection)
            .map(|s| s.failure_action == FailureAction::FailPipeline)
            .unwrap_or(false);
        let mut result = StageResult::success(StageKind::DuplicateDetection, 0);
        result.duplicate_of = Some(prior_identifier.clone());
        result
            .notes
            .push(format!("duplicate of prior transaction {prior_identifier}"));
        if fails_pipeline {
            result.success = false;
        }
        result
    }
}

#[async_trait]
impl StageExecutor for DuplicateDetectionStage {
    fn stage(&self) -> StageKind {
        StageKind::DuplicateDetection
    }

    async fn execute(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let start = std::time::Instant::now();
        let mut result = self.run(transaction, context.tenant_id, &context.profile).await?;
        result.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn can_execute(&self, context: &StageExecutionContext) -> bool {
        context
            .profile
            .stages
            .get(&StageKind::DuplicateDetection)
            .map(|s| s.mode != invoicecore_domain::config::ExecutionMode::Skip)
            .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _context: &StageExecutionContext) -> std::time::Duration {
        std::time::Duration::from_millis(20)
    }

    fn get_resource_requirements(&self, _context: &StageExecutionContext) -> ResourceRequirements {
        ResourceRequirements {
            estimated_duration: std::time::Duration::from_millis(20),
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
