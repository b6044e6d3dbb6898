// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Tenant configuration (C8 types), grounded on
//! `multi_tenant_manager.py`.

use crate::value_objects::{OrganizationId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Starter,
    Professional,
    Enterprise,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    Shared,
    SchemaPerTenant,
    DatabasePerTenant,
}

/// SI ("Systems Integrator") is commercial; APP is grant-funded (glossary).
/// Hybrid tenants subscribe to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceClass {
    Si,
    App,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Active,
    Suspended,
    Overdue,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingState {
    pub status: BillingStatus,
    pub tier: Tier,
    pub invoice_quota: u64,
    pub invoice_quota_used: u64,
    #[serde(with = "crate::value_objects::datetime_serde")]
    pub next_billing_date: DateTime<Utc>,
}

/// Grant-tracking state for APP-class tenants. Deliberately an opaque,
/// monotonic-counter struct with no asserted transition table — the source
/// platform's milestone logic isn't specified precisely enough to encode a
/// state machine (spec.md §9: "do not guess").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantTrackingState {
    pub milestone_stage: u32,
    pub taxpayer_count: u64,
    pub sectors: Vec<String>,
    pub transmission_rate: f64,
}

/// Per-tenant configuration resolved and cached by the tenant manager (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfiguration {
    pub tenant_id: TenantId,
    pub organization_id: OrganizationId,
    pub tier: Tier,
    pub isolation_level: IsolationLevel,
    pub monthly_invoice_ceiling: Option<u64>,
    pub user_ceiling: Option<u64>,
    pub rate_limit_per_minute: u32,
    pub cache_ttl_secs: u64,
    pub service_classes: Vec<ServiceClass>,
    pub billing: BillingState,
    pub grant_tracking: Option<GrantTrackingState>,
}

impl TenantConfiguration {
    /// Ceiling-approach warning threshold: §4.5 says "approaching 80%
    /// emits a warning in the response."
    pub const WARNING_FRACTION: f64 = 0.8;

    pub fn is_over_invoice_ceiling(&self, processed_this_month: u64) -> bool {
        match self.monthly_invoice_ceiling {
            Some(ceiling) => processed_this_month >= ceiling,
            None => false,
        }
    }

    pub fn is_approaching_invoice_ceiling(&self, processed_this_month: u64) -> bool {
        match self.monthly_invoice_ceiling {
            Some(ceiling) if ceiling > 0 => {
                (processed_this_month as f64) >= (ceiling as f64) * Self::WARNING_FRACTION
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{OrganizationId, TenantId};

    fn sample(ceiling: Option<u64>) -> TenantConfiguration {
        TenantConfiguration {
            tenant_id: TenantId::new(),
            organization_id: OrganizationId::new(),
            tier: Tier::Starter,
            isolation_level: IsolationLevel::Shared,
            monthly_invoice_ceiling: ceiling,
            user_ceiling: Some(5),
            rate_limit_per_minute: 60,
            cache_ttl_secs: 300,
            service_classes: vec![ServiceClass::Si],
            billing: BillingState {
                status: BillingStatus::Active,
                tier: Tier::Starter,
                invoice_quota: 1000,
                invoice_quota_used: 1000,
                next_billing_date: Utc::now(),
            },
            grant_tracking: None,
        }
    }

    #[test]
    fn quota_breach_at_exactly_the_ceiling() {
        let tenant = sample(Some(1000));
        assert!(tenant.is_over_invoice_ceiling(1000));
        assert!(!tenant.is_over_invoice_ceiling(999));
    }

    #[test]
    fn disabled_ceiling_never_breaches() {
        let tenant = sample(None);
        assert!(!tenant.is_over_invoice_ceiling(u64::MAX));
    }

    #[test]
    fn warning_fires_at_eighty_percent() {
        let tenant = sample(Some(1000));
        assert!(tenant.is_approaching_invoice_ceiling(800));
        assert!(!tenant.is_approaching_invoice_ceiling(799));
    }
}
