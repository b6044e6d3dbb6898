// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Stage identity and the per-stage result shape emitted by every stage
//! executor (§4.3).

use crate::value_objects::{CustomerId, RegulatoryFlag, RuleCategory, Severity};
use serde::{Deserialize, Serialize};

/// The seven processing stages plus the synthetic `raw-input` root node,
/// forming the vertex set of the stage DAG (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    RawInput,
    Validation,
    DuplicateDetection,
    AmountValidation,
    BusinessRules,
    PatternMatching,
    Enrichment,
    Finalization,
}

impl StageKind {
    /// Canonical enumeration order, used to break topological-sort ties
    /// (§4.2: "a tie is broken by the canonical stage enumeration order").
    pub const ORDER: [StageKind; 8] = [
        StageKind::RawInput,
        StageKind::Validation,
        StageKind::DuplicateDetection,
        StageKind::AmountValidation,
        StageKind::BusinessRules,
        StageKind::PatternMatching,
        StageKind::Enrichment,
        StageKind::Finalization,
    ];

    pub fn enumeration_rank(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).unwrap()
    }
}

/// A single business-rule or validation violation (§4.3.4, §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub field: Option<String>,
    pub current_value: Option<String>,
    pub expected_value: Option<String>,
    pub remediation_hint: Option<String>,
}

impl Violation {
    pub fn new(rule_id: impl Into<String>, category: RuleCategory, severity: Severity) -> Self {
        Self {
            rule_id: rule_id.into(),
            category,
            severity,
            field: None,
            current_value: None,
            expected_value: None,
            remediation_hint: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_values(
        mut self,
        current: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        self.current_value = Some(current.into());
        self.expected_value = Some(expected.into());
        self
    }

    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation_hint = Some(hint.into());
        self
    }
}

/// Enrichment data a stage can contribute toward the final
/// `ProcessedTransaction` (merged by the orchestrator, never written
/// directly by a stage executor).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFragment {
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub merchant_identity: Option<String>,
    pub primary_category: Option<String>,
    pub business_purpose: Option<String>,
    pub regulatory_flags: Vec<RegulatoryFlag>,
    pub company_registration_verified: Option<bool>,
    pub tax_compliance_verified: Option<bool>,
}

/// Result emitted by a single stage executor invocation (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageKind,
    pub success: bool,
    pub elapsed_ms: u64,
    pub violations: Vec<Violation>,
    pub enrichment: EnrichmentFragment,
    pub notes: Vec<String>,
    /// Set only by duplicate-detection when an exact or fuzzy match fires.
    pub duplicate_of: Option<String>,
}

impl StageResult {
    pub fn success(stage: StageKind, elapsed_ms: u64) -> Self {
        Self {
            stage,
            success: true,
            elapsed_ms,
            violations: Vec::new(),
            enrichment: EnrichmentFragment::default(),
            notes: Vec::new(),
            duplicate_of: None,
        }
    }

    pub fn failure(stage: StageKind, elapsed_ms: u64, note: impl Into<String>) -> Self {
        Self {
            stage,
            success: false,
            elapsed_ms,
            violations: Vec::new(),
            enrichment: EnrichmentFragment::default(),
            notes: vec![note.into()],
            duplicate_of: None,
        }
    }

    /// Per §4.3.4: "A violation set with any severity >= error makes the
    /// stage fail per its configured failure-action."
    pub fn has_blocking_violation(&self) -> bool {
        self.violations.iter().any(|v| v.severity.is_blocking())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_stable_and_complete() {
        for (i, stage) in StageKind::ORDER.iter().enumerate() {
            assert_eq!(stage.enumeration_rank(), i);
        }
    }

    #[test]
    fn blocking_violation_detection() {
        let mut result = StageResult::success(StageKind::BusinessRules, 5);
        assert!(!result.has_blocking_violation());
        result.violations.push(Violation::new(
            "VAT_RATE_VALIDATION",
            RuleCategory::Tax,
            Severity::Error,
        ));
        assert!(result.has_blocking_violation());
    }
}
