// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Risk, compliance, and severity vocabularies shared across stages.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Risk bucket assigned by amount validation and carried through finalization.
///
/// Ordered so that `RiskLevel::Critical > RiskLevel::High`, matching the
/// score buckets in §4.3.3 (low <0.3, medium <0.6, high <0.85, critical
/// ≥0.85).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Low
    }
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Nigerian-compliance aggregate level computed during enrichment (§4.3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    Compliant,
    Partial,
    NonCompliant,
}

/// Closed regulatory flag set (supplements spec.md via
/// `firs_compliance_analytics.py`'s vocabulary — see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulatoryFlag {
    ForeignCurrencyReview,
    LargeCashReporting,
    CbnReview,
    VatExemption,
}

/// Rule category taxonomy for business-rule violations (§4.3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Tax,
    Accounting,
    DataQuality,
    ConsumerProtection,
    FinancialRegs,
    Sector,
    AntiFraud,
}

/// Violation / stage-result severity. Ordering matters: a violation set with
/// any severity `>= Error` fails the stage per its configured failure action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn is_blocking(self) -> bool {
        self >= Severity::Error
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(s: &Severity) -> u8 {
            match s {
                Severity::Info => 0,
                Severity::Warning => 1,
                Severity::Error => 2,
                Severity::Critical => 3,
            }
        }
        rank(self).cmp(&rank(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_bucket_boundaries_match_spec() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.84), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Critical);
    }

    #[test]
    fn severity_ordering_treats_error_and_above_as_blocking() {
        assert!(!Severity::Info.is_blocking());
        assert!(!Severity::Warning.is_blocking());
        assert!(Severity::Error.is_blocking());
        assert!(Severity::Critical.is_blocking());
        assert!(Severity::Critical > Severity::Error);
    }
}
