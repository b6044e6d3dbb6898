// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Processor orchestrator (C5): walks a `ProcessingProfile`'s stage DAG in
//! topological order, invoking each `StageExecutor` in turn and folding its
//! result into the in-flight `ProcessedTransaction`. Grounded on the
//! teacher's `ProcessFileUseCase`/`ProcessingObserver` pattern
//! (application/use_cases/process_file.rs): a single-item driver plus a
//! batch fan-out over `tokio` tasks, generalized here from one file to one
//! DAG run per transaction.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};

use invoicecore_domain::config::{ExecutionMode, FailureAction, ProcessingProfile};
use invoicecore_domain::entities::{ProcessedTransaction, UniversalTransaction};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::stage_executor::{StageExecutionContext, StageExecutor};
use invoicecore_domain::stage_result::{StageKind, StageResult};
use invoicecore_domain::value_objects::{Currency, TenantId};

use crate::stages::{
    AmountValidationStage, BusinessRulesStage, DuplicateDetectionStage, EnrichmentStage,
    FinalizationStage, PatternMatchingStage, ValidationStage,
};

/// The seven stage executors plus their shared collaborators, wired once at
/// startup and reused across every transaction (mirrors the teacher's
/// `PipelineService` holding one `Arc<dyn StageExecutor>` per stage).
pub struct Orchestrator {
    executors: BTreeMap<StageKind, Arc<dyn StageExecutor>>,
    transaction_repository: Arc<dyn invoicecore_domain::repositories::TransactionRepository>,
    pipeline_version: String,
}

/// Outcome of a single transaction's run through the DAG (§5, §8.2).
#[derive(Debug, Clone)]
pub struct OrchestratorOutcome {
    pub transaction: ProcessedTransaction,
    pub stage_results: BTreeMap<StageKind, StageResult>,
}

impl Orchestrator {
    pub fn new(
        transaction_repository: Arc<dyn invoicecore_domain::repositories::TransactionRepository>,
        customer_matcher: Arc<dyn invoicecore_domain::services::CustomerMatcher>,
        pipeline_version: impl Into<String>,
    ) -> Self {
        let mut executors: BTreeMap<StageKind, Arc<dyn StageExecutor>> = BTreeMap::new();
        executors.insert(StageKind::Validation, Arc::new(ValidationStage::new()));
        executors.insert(
            StageKind::DuplicateDetection,
            Arc::new(DuplicateDetectionStage::new(transaction_repository.clone())),
        );
        executors.insert(
            StageKind::AmountValidation,
            Arc::new(AmountValidationStage::new(transaction_repository.clone())),
        );
        executors.insert(StageKind::BusinessRules, Arc::new(BusinessRulesStage::new()));
        executors.insert(StageKind::PatternMatching, Arc::new(PatternMatchingStage::new()));
        executors.insert(StageKind::Enrichment, Arc::new(EnrichmentStage::new(customer_matcher)));
        executors.insert(StageKind::Finalization, Arc::new(FinalizationStage::new()));

        Self {
            executors,
            transaction_repository,
            pipeline_version: pipeline_version.into(),
        }
    }

    /// Runs the full DAG for one transaction (§4.2, §5). The per-transaction
    /// deadline is the profile's `max_total_wall_time_secs`; a per-stage
    /// timeout of `StageConfig::timeout_secs` is enforced independently, so
    /// a single slow stage cannot silently consume the whole budget.
    pub async fn process(
        &self,
        universal: UniversalTransaction,
        tenant_id: TenantId,
        profile: ProcessingProfile,
        tenant_default_currency: Currency,
    ) -> Result<OrchestratorOutcome, CoreError> {
        let order = profile.to_dag().topological_sort()?;
        let pipeline_deadline = Instant::now() + Duration::from_secs(profile.max_total_wall_time_secs);

        let mut transaction = ProcessedTransaction::new_in_progress(universal, self.pipeline_version.clone());
        let mut context = StageExecutionContext {
            tenant_id,
            profile: profile.clone(),
            pipeline_deadline,
            tenant_default_currency,
            prior_results: BTreeMap::new(),
        };

        for stage in order {
            if stage == StageKind::RawInput {
                continue;
            }
            let Some(config) = profile.stages.get(&stage) else {
                continue;
            };
            if config.mode == ExecutionMode::Skip {
                continue;
            }

            if Instant::now() >= pipeline_deadline {
                transaction.mark_failed(format!("pipeline deadline exceeded before stage {stage:?}"));
                break;
            }

            let Some(executor) = self.executors.get(&stage) else {
                continue;
            };
            if !executor.can_execute(&context) {
                continue;
            }

            let per_stage_budget = Duration::from_secs(config.timeout_secs.max(1));
            let remaining = pipeline_deadline.saturating_duration_since(Instant::now());
            let budget = per_stage_budget.min(remaining);

            let result = self.run_with_retries(executor.as_ref(), &transaction, &context, config.retry_count, budget).await;

            let result = match result {
                Ok(result) => result,
                Err(err) => {
                    warn!(stage = ?stage, error = %err, "stage execution failed with an infrastructure error");
                    match config.failure_action {
                        FailureAction::FailPipeline => {
                            transaction.mark_failed(format!("{stage:?} failed: {err}"));
                            break;
                        }
                        _ => StageResult::failure(stage, 0, format!("infrastructure error: {err}")),
                    }
                }
            };

            if !result.success {
                match config.failure_action {
                    FailureAction::FailPipeline => {
                        transaction.mark_failed(format!(
                            "{stage:?} failed per fail-pipeline action: {:?}",
                            result.notes
                        ));
                        context.prior_results.insert(stage, result);
                        break;
                    }
                    FailureAction::ManualReview => {
                        transaction.flag_for_review(format!("{stage:?} requires manual review"));
                    }
                    FailureAction::ContinueWithWarning | FailureAction::RetryWithDefaults => {
                        debug!(stage = ?stage, "stage failed, continuing per configured failure action");
                    }
                }
            } else if stage == StageKind::AmountValidation
                && result.notes.iter().any(|n| n.contains("flagged for manual review"))
            {
                transaction.flag_for_review("amount validation flagged an elevated risk score");
            }

            Self::fold_result(&mut transaction, &result);
            context.prior_results.insert(stage, result);
        }

        if !transaction.is_terminal() {
            FinalizationStage::finalize(&mut transaction, &profile, &context);
            transaction.mark_completed();
        }

        self.transaction_repository.save(tenant_id, &transaction).await?;

        info!(
            tenant_id = %tenant_id,
            confidence = transaction.processing.confidence,
            ready_for_invoice = transaction.ready_for_invoice,
            requires_review = transaction.requires_review,
            "transaction processed"
        );

        Ok(OrchestratorOutcome {
            transaction,
            stage_results: context.prior_results,
        })
    }

    /// Runs every transaction in `batch` concurrently, bounded only by
    /// `tokio`'s task scheduler — the teacher's `process_batch` spawns one
    /// task per file; we spawn one per transaction (§5: "batches fan out
    /// across the async runtime, not a dedicated thread pool").
    pub async fn process_batch(
        self: &Arc<Self>,
        batch: Vec<UniversalTransaction>,
        tenant_id: TenantId,
        profile: ProcessingProfile,
        tenant_default_currency: Currency,
    ) -> Vec<Result<OrchestratorOutcome, CoreError>> {
        let tasks = batch.into_iter().map(|universal| {
            let orchestrator = self.clone();
            let profile = profile.clone();
            let tenant_default_currency = tenant_default_currency.clone();
            tokio::spawn(async move {
                orchestrator
                    .process(universal, tenant_id, profile, tenant_default_currency)
                    .await
            })
        });
        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(CoreError::internal(e.to_string()))))
            .collect()
    }

    /// Enforces the stage's own timeout on top of the shared
    /// `tokio::time::timeout`, retrying up to `retry_count` times on a
    /// recoverable `CoreError` (§4.2 `retry-with-defaults`).
    async fn run_with_retries(
        &self,
        executor: &dyn StageExecutor,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
        retry_count: u32,
        budget: Duration,
    ) -> Result<StageResult, CoreError> {
        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(budget, executor.execute(transaction, context)).await;
            match outcome {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(err)) if attempt < retry_count && err.is_recoverable() => {
                    attempt += 1;
                    continue;
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    if attempt < retry_count {
                        attempt += 1;
                        continue;
                    }
                    return Err(CoreError::TimeoutError(format!(
                        "stage {:?} exceeded its {:?} budget",
                        executor.stage(),
                        budget
                    )));
                }
            }
        }
    }

    /// Merges a stage's violations and enrichment fragment into the
    /// accumulating `ProcessedTransaction` (§4.3: stages never write the
    /// transaction directly, only the orchestrator does, after the fact).
    fn fold_result(transaction: &mut ProcessedTransaction, result: &StageResult) {
        transaction
            .processing
            .stage_latencies_ms
            .insert(result.stage, result.elapsed_ms);
        transaction.processing.processing_notes.extend(result.notes.iter().cloned());

        for violation in &result.violations {
            transaction.validation.record(violation.severity);
        }

        if let Some(customer_id) = result.enrichment.customer_id {
            transaction.enrichment.customer_id = Some(customer_id);
        }
        if let Some(name) = &result.enrichment.customer_name {
            transaction.enrichment.customer_name = Some(name.clone());
        }
        if let Some(merchant) = &result.enrichment.merchant_identity {
            transaction.enrichment.merchant_identity = Some(merchant.clone());
        }
        if let Some(category) = &result.enrichment.primary_category {
            transaction.enrichment.primary_category = Some(category.clone());
        }
        if let Some(purpose) = &result.enrichment.business_purpose {
            transaction.enrichment.business_purpose = Some(purpose.clone());
        }
        if let Some(verified) = result.enrichment.company_registration_verified {
            transaction.enrichment.company_registration_verified = verified;
        }
        if let Some(verified) = result.enrichment.tax_compliance_verified {
            transaction.enrichment.tax_compliance_verified = verified;
        }
        transaction
            .enrichment
            .regulatory_flags
            .extend(result.enrichment.regulatory_flags.iter().copied());

        if let Some(duplicate_of) = &result.duplicate_of {
            transaction.duplicate_match = Some(duplicate_of.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use invoicecore_domain::config::ProfileTag;
    use invoicecore_domain::entities::ConnectorMetadata;
    use invoicecore_domain::repositories::transaction_repository::{
        ExactFingerprint, FuzzyFingerprint, TenantAmountStatistics,
    };
    use invoicecore_domain::services::customer_matcher::{CandidateIdentity, MatchOutcome};
    use invoicecore_domain::value_objects::{ConnectorKind, CustomerId};
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;

    struct NullTransactionRepo {
        saved: StdMutex<Vec<ProcessedTransaction>>,
    }

    #[async_trait]
    impl invoicecore_domain::repositories::TransactionRepository for NullTransactionRepo {
        async fn save(&self, _tenant: TenantId, transaction: &ProcessedTransaction) -> Result<(), CoreError> {
            self.saved.lock().unwrap().push(transaction.clone());
            Ok(())
        }
        async fn find_by_exact_fingerprint(
            &self,
            _key: &ExactFingerprint,
        ) -> Result<Option<ProcessedTransaction>, CoreError> {
            Ok(None)
        }
        async fn find_by_fuzzy_fingerprint(
            &self,
            _key: &FuzzyFingerprint,
            _window: chrono::Duration,
        ) -> Result<Vec<ProcessedTransaction>, CoreError> {
            Ok(Vec::new())
        }
        async fn count_for_tenant_in_month(
            &self,
            _tenant_id: TenantId,
            _at: chrono::DateTime<chrono::Utc>,
        ) -> Result<u64, CoreError> {
            Ok(0)
        }
        async fn tenant_amount_statistics(&self, _tenant_id: TenantId) -> Result<TenantAmountStatistics, CoreError> {
            Ok(TenantAmountStatistics {
                mean: Decimal::ZERO,
                stddev: Decimal::ZERO,
                historic_hourly_velocity: 0.0,
            })
        }
        async fn count_same_account_since(
            &self,
            _tenant_id: TenantId,
            _account_hash: &str,
            _since: chrono::DateTime<chrono::Utc>,
        ) -> Result<u64, CoreError> {
            Ok(0)
        }
    }

    struct FixedMatcher;

    #[async_trait]
    impl invoicecore_domain::services::CustomerMatcher for FixedMatcher {
        async fn resolve_or_create(
            &self,
            _tenant_id: TenantId,
            _candidate: &CandidateIdentity,
            _strategy: invoicecore_domain::customer::MatchingStrategy,
        ) -> Result<MatchOutcome, CoreError> {
            Ok(MatchOutcome {
                customer_id: CustomerId::new(),
                customer_name: "Sample Customer".to_string(),
                confidence: invoicecore_domain::customer::MatchConfidence::High,
                score: 0.9,
                company_registration_verified: true,
                tax_compliance_verified: true,
            })
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(NullTransactionRepo { saved: StdMutex::new(Vec::new()) }),
            Arc::new(FixedMatcher),
            "1.0.0",
        )
    }

    fn sample_transaction() -> UniversalTransaction {
        UniversalTransaction::new(
            "INV-2024-0042",
            Decimal::new(50_000_00, 2),
            Currency::ngn(),
            chrono::Utc::now(),
            "consulting services",
            ConnectorMetadata::Erp(Default::default()),
            ConnectorKind::ErpSap,
            "sap-1",
            chrono::Utc::now(),
            serde_json::json!({"tin": "12345678901234"}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn a_clean_transaction_completes_and_is_ready_for_invoice() {
        let orchestrator = orchestrator();
        let outcome = orchestrator
            .process(
                sample_transaction(),
                TenantId::new(),
                ProcessingProfile::for_tag(ProfileTag::EnterpriseErp),
                Currency::ngn(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.transaction.status, invoicecore_domain::entities::TransactionStatus::Completed);
        assert!(outcome.stage_results.contains_key(&StageKind::Finalization));
    }

    #[tokio::test]
    async fn zero_amount_fails_the_pipeline_under_financial_data_profile() {
        let orchestrator = orchestrator();
        let mut universal = sample_transaction();
        universal.amount = Decimal::ZERO;
        let outcome = orchestrator
            .process(
                universal,
                TenantId::new(),
                ProcessingProfile::for_tag(ProfileTag::FinancialData),
                Currency::ngn(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.transaction.status, invoicecore_domain::entities::TransactionStatus::Failed);
        assert!(!outcome.transaction.ready_for_invoice);
    }

    #[tokio::test]
    async fn batch_processing_runs_every_transaction() {
        let orchestrator = Arc::new(orchestrator());
        let batch = vec![sample_transaction(), sample_transaction(), sample_transaction()];
        let results = orchestrator
            .process_batch(batch, TenantId::new(), ProcessingProfile::for_tag(ProfileTag::SmallBusiness), Currency::ngn())
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
