// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `StageExecutor` (C4): the common contract every one of the seven stages
//! implements. Keeps the teacher's `execute`/`can_execute`/
//! `estimate_processing_time`/`get_resource_requirements`/`prepare_stage`/
//! `cleanup_stage`/`validate_configuration` shape (repositories/stage_executor.rs)
//! with the per-stage body replaced per §4.3.1-4.3.7.

use crate::config::ProcessingProfile;
use crate::entities::ProcessedTransaction;
use crate::error::CoreError;
use crate::stage_result::{StageKind, StageResult};
use crate::value_objects::{Currency, TenantId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-invocation context threaded through every stage: which tenant, which
/// profile, and a deadline that the stage must honor independently of its
/// own per-stage timeout (§5 cancellation semantics).
#[derive(Debug, Clone)]
pub struct StageExecutionContext {
    pub tenant_id: TenantId,
    pub profile: ProcessingProfile,
    pub pipeline_deadline: std::time::Instant,
    /// The tenant's configured settlement currency, used by amount
    /// validation (§4.3.3) to flag currency mismatches.
    pub tenant_default_currency: Currency,
    /// Results already produced earlier in this DAG run, keyed by stage —
    /// lets a downstream stage (e.g. enrichment aggregating the business
    /// rules outcome, §4.3.6) consult an upstream stage's violations
    /// without the orchestrator threading bespoke fields through.
    pub prior_results: BTreeMap<StageKind, StageResult>,
}

/// Estimated resource footprint for a stage invocation — mirrors the
/// teacher's `ResourceRequirements` (repositories/stage_executor.rs), scaled
/// down to the fields this domain's stages actually need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceRequirements {
    pub estimated_duration: Duration,
    pub requires_database: bool,
    pub requires_cache: bool,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            estimated_duration: Duration::from_millis(50),
            requires_database: false,
            requires_cache: false,
        }
    }
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn stage(&self) -> StageKind;

    /// Executes this stage against the in-progress transaction. Never
    /// raises for business-rule/validation outcomes — those are carried in
    /// the returned `StageResult` (§7 propagation policy). Only
    /// infrastructure failures (database, cache, timeout) are `Err`.
    async fn execute(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError>;

    /// Whether this stage is enabled/applicable for the given profile
    /// (execution mode != Skip, and any conditional predicate holds).
    fn can_execute(&self, context: &StageExecutionContext) -> bool;

    fn estimate_processing_time(&self, context: &StageExecutionContext) -> Duration;

    fn get_resource_requirements(&self, context: &StageExecutionContext) -> ResourceRequirements;

    async fn prepare_stage(&self, context: &StageExecutionContext) -> Result<(), CoreError>;

    async fn cleanup_stage(&self, context: &StageExecutionContext) -> Result<(), CoreError>;

    fn validate_configuration(&self, profile: &ProcessingProfile) -> Result<(), CoreError>;
}
