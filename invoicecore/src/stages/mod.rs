// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The seven stage executors (C4), one module per §4.3.x. Each implements
//! `invoicecore_domain::services::stage_executor::StageExecutor`, grounded
//! on the teacher's `infrastructure/runtime/stage_executor.rs`
//! `BasicStageExecutor` shape: constructor-injected collaborators, a
//! `can_execute`/`execute` split, and timing captured around the actual
//! work rather than inside it.

pub mod amount_validation;
pub mod business_rules;
pub mod duplicate_detection;
pub mod enrichment;
pub mod finalization;
pub mod pattern_matching;
pub mod validation;

pub use amount_validation::AmountValidationStage;
pub use business_rules::BusinessRulesStage;
pub use duplicate_detection::DuplicateDetectionStage;
pub use enrichment::EnrichmentStage;
pub use finalization::FinalizationStage;
pub use pattern_matching::PatternMatchingStage;
pub use validation::ValidationStage;

use std::time::Instant;

/// Runs `body`, returning the elapsed wall time in milliseconds alongside
/// its result — shared by every stage so elapsed-time bookkeeping isn't
/// duplicated seven times.
pub(crate) fn timed<T>(body: impl FnOnce() -> T) -> (T, u64) {
    let start = Instant::now();
    let result = body();
    (result, start.elapsed().as_millis() as u64)
}
