// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Customer identity (C7 types) and the scoring vocabulary the matching
//! engine uses, grounded verbatim on `customer_matching_engine.py`'s
//! weights and threshold tables (see DESIGN.md).

use crate::value_objects::{ConnectorKind, CustomerId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Weighted-similarity factor weights (§4.4): name 0.30, phone 0.25,
/// email 0.25, business-id 0.20.
pub const NAME_WEIGHT: f64 = 0.30;
pub const PHONE_WEIGHT: f64 = 0.25;
pub const EMAIL_WEIGHT: f64 = 0.25;
pub const BUSINESS_ID_WEIGHT: f64 = 0.20;

/// Multi-factor boost applied when at least two non-zero factor scores
/// contribute, capped at 1.0 (§4.4).
pub const MULTI_FACTOR_BOOST: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    High,
    Medium,
    Low,
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrategy {
    Strict,
    Balanced,
    Permissive,
}

/// The four threshold tables of §4.4, taken verbatim from
/// `customer_matching_engine.py`.
pub struct ConfidenceThresholds {
    pub exact: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl MatchingStrategy {
    pub fn thresholds(self) -> ConfidenceThresholds {
        match self {
            MatchingStrategy::Strict => ConfidenceThresholds {
                exact: 0.95,
                high: 0.85,
                medium: 0.75,
                low: 0.65,
            },
            MatchingStrategy::Balanced => ConfidenceThresholds {
                exact: 0.95,
                high: 0.80,
                medium: 0.60,
                low: 0.40,
            },
            MatchingStrategy::Permissive => ConfidenceThresholds {
                exact: 0.90,
                high: 0.70,
                medium: 0.50,
                low: 0.30,
            },
        }
    }

    pub fn classify(self, score: f64) -> MatchConfidence {
        let t = self.thresholds();
        if score >= t.exact {
            MatchConfidence::Exact
        } else if score >= t.high {
            MatchConfidence::High
        } else if score >= t.medium {
            MatchConfidence::Medium
        } else if score >= t.low {
            MatchConfidence::Low
        } else {
            MatchConfidence::NoMatch
        }
    }
}

/// Cross-connector customer identity (C7). Universal identifier is stable
/// once assigned; the four normalized sets grow monotonically — merge is a
/// union, never a mutation in place (design notes §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub universal_id: CustomerId,
    pub tenant_id: TenantId,
    pub primary_name: String,
    pub normalized_names: BTreeSet<String>,
    pub phone_numbers: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    pub addresses: BTreeSet<String>,
    /// e.g. "TIN" -> "12345678-0001", "CAC" -> "RC123456".
    pub business_identifiers: BTreeMap<String, String>,
    /// source-system -> that connector's local identifier for this customer.
    pub sources: BTreeMap<ConnectorKind, String>,
    pub confidence: f64,
    #[serde(with = "crate::value_objects::datetime_serde")]
    pub last_updated: DateTime<Utc>,
    pub verification: BTreeMap<String, bool>,
}

impl CustomerIdentity {
    pub fn new(
        tenant_id: TenantId,
        universal_id: CustomerId,
        primary_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let primary_name = primary_name.into();
        let mut normalized_names = BTreeSet::new();
        normalized_names.insert(primary_name.clone());
        Self {
            universal_id,
            tenant_id,
            primary_name,
            normalized_names,
            phone_numbers: BTreeSet::new(),
            emails: BTreeSet::new(),
            addresses: BTreeSet::new(),
            business_identifiers: BTreeMap::new(),
            sources: BTreeMap::new(),
            confidence: 1.0,
            last_updated: now,
            verification: BTreeMap::new(),
        }
    }

    /// Monotonic union merge (§3 invariant: "sets never shrink on merge").
    /// Does not touch `universal_id` — the caller decides which identity
    /// survives a merge; this method only grows `self`.
    pub fn merge_from(&mut self, other: &CustomerIdentity, now: DateTime<Utc>) {
        self.normalized_names.extend(other.normalized_names.iter().cloned());
        self.phone_numbers.extend(other.phone_numbers.iter().cloned());
        self.emails.extend(other.emails.iter().cloned());
        self.addresses.extend(other.addresses.iter().cloned());
        for (k, v) in &other.business_identifiers {
            self.business_identifiers.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.sources {
            self.sources.entry(*k).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.verification {
            self.verification.entry(k.clone()).or_insert(*v);
        }
        self.confidence = self.confidence.max(other.confidence);
        self.last_updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_thresholds_classify_as_documented() {
        let strict = MatchingStrategy::Strict;
        assert_eq!(strict.classify(0.96), MatchConfidence::Exact);
        assert_eq!(strict.classify(0.90), MatchConfidence::High);
        assert_eq!(strict.classify(0.80), MatchConfidence::Medium);
        assert_eq!(strict.classify(0.70), MatchConfidence::Low);
        assert_eq!(strict.classify(0.10), MatchConfidence::NoMatch);
    }

    #[test]
    fn merge_grows_sets_monotonically() {
        let now = Utc::now();
        let mut a = CustomerIdentity::new(TenantId::new(), CustomerId::new(), "ABC Ltd", now);
        let b = CustomerIdentity::new(TenantId::new(), CustomerId::new(), "ABC Limited", now);
        a.merge_from(&b, now);
        assert!(a.normalized_names.contains("ABC Ltd"));
        assert!(a.normalized_names.contains("ABC Limited"));
        assert_eq!(a.normalized_names.len(), 2);
    }
}
