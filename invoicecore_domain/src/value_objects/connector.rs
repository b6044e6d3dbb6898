// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Connector taxonomy and the static characteristics registry (C2).

use serde::{Deserialize, Serialize};

/// Broad connector category — drives which business-rule subset applies
/// (§4.3.4) and which metadata variant a `UniversalTransaction` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorCategory {
    Erp,
    Pos,
    Crm,
    Ecommerce,
    Accounting,
    Banking,
}

/// A specific connector kind, e.g. `erp-sap`, `pos-retail`. The set is closed
/// per the design notes' guidance to replace duck-typed vendor dictionaries
/// with a tagged variant; `Generic` covers a category with no distinguished
/// vendor integration yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectorKind {
    ErpSap,
    ErpOracle,
    ErpGeneric,
    PosRetail,
    PosGeneric,
    CrmSalesforce,
    CrmGeneric,
    EcommerceShopify,
    EcommerceGeneric,
    AccountingQuickbooks,
    AccountingGeneric,
    BankingGeneric,
}

impl ConnectorKind {
    pub fn category(self) -> ConnectorCategory {
        match self {
            ConnectorKind::ErpSap | ConnectorKind::ErpOracle | ConnectorKind::ErpGeneric => {
                ConnectorCategory::Erp
            }
            ConnectorKind::PosRetail | ConnectorKind::PosGeneric => ConnectorCategory::Pos,
            ConnectorKind::CrmSalesforce | ConnectorKind::CrmGeneric => ConnectorCategory::Crm,
            ConnectorKind::EcommerceShopify | ConnectorKind::EcommerceGeneric => {
                ConnectorCategory::Ecommerce
            }
            ConnectorKind::AccountingQuickbooks | ConnectorKind::AccountingGeneric => {
                ConnectorCategory::Accounting
            }
            ConnectorKind::BankingGeneric => ConnectorCategory::Banking,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorKind::ErpSap => "erp-sap",
            ConnectorKind::ErpOracle => "erp-oracle",
            ConnectorKind::ErpGeneric => "erp-generic",
            ConnectorKind::PosRetail => "pos-retail",
            ConnectorKind::PosGeneric => "pos-generic",
            ConnectorKind::CrmSalesforce => "crm-salesforce",
            ConnectorKind::CrmGeneric => "crm-generic",
            ConnectorKind::EcommerceShopify => "ecommerce-shopify",
            ConnectorKind::EcommerceGeneric => "ecommerce-generic",
            ConnectorKind::AccountingQuickbooks => "accounting-quickbooks",
            ConnectorKind::AccountingGeneric => "accounting-generic",
            ConnectorKind::BankingGeneric => "banking-generic",
        }
    }
}

/// How deeply nested a connector's native payload tends to be; informs
/// adapter field-mapping defensiveness but carries no behavior here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStructureLevel {
    Flat,
    Nested,
    HighlyNested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeBucket {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityBand {
    Poor,
    Fair,
    Good,
    Excellent,
}

/// Regulatory regime tag attached to connector characteristics and to
/// processing profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceRegime {
    Vat,
    Firs,
    Cbn,
    ConsumerProtection,
    DataProtection,
    AntiMoneyLaundering,
}

use super::risk::RiskLevel;

/// Static taxonomy entry for a connector kind (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorCharacteristics {
    pub category: ConnectorCategory,
    pub data_structure_level: DataStructureLevel,
    pub default_risk_profile: RiskLevel,
    pub requires_fraud_detection: bool,
    pub requires_customer_matching: bool,
    pub supports_batch: bool,
    pub typical_volume: VolumeBucket,
    pub compliance_regimes: Vec<ComplianceRegime>,
    pub data_quality_band: DataQualityBand,
}

/// Returns the static characteristics for a connector kind. This is the
/// entire registry — a match, not a runtime-mutable map, since the taxonomy
/// is fixed per spec.md §3.
pub fn characteristics_for(kind: ConnectorKind) -> ConnectorCharacteristics {
    use ComplianceRegime::*;
    match kind {
        ConnectorKind::ErpSap | ConnectorKind::ErpOracle | ConnectorKind::ErpGeneric => {
            ConnectorCharacteristics {
                category: ConnectorCategory::Erp,
                data_structure_level: DataStructureLevel::HighlyNested,
                default_risk_profile: RiskLevel::Low,
                requires_fraud_detection: false,
                requires_customer_matching: true,
                supports_batch: true,
                typical_volume: VolumeBucket::High,
                compliance_regimes: vec![Vat, Firs],
                data_quality_band: DataQualityBand::Excellent,
            }
        }
        ConnectorKind::PosRetail | ConnectorKind::PosGeneric => ConnectorCharacteristics {
            category: ConnectorCategory::Pos,
            data_structure_level: DataStructureLevel::Flat,
            default_risk_profile: RiskLevel::Medium,
            requires_fraud_detection: true,
            requires_customer_matching: true,
            supports_batch: false,
            typical_volume: VolumeBucket::VeryHigh,
            compliance_regimes: vec![Vat, ConsumerProtection],
            data_quality_band: DataQualityBand::Fair,
        },
        ConnectorKind::CrmSalesforce | ConnectorKind::CrmGeneric => ConnectorCharacteristics {
            category: ConnectorCategory::Crm,
            data_structure_level: DataStructureLevel::Nested,
            default_risk_profile: RiskLevel::Low,
            requires_fraud_detection: false,
            requires_customer_matching: true,
            supports_batch: true,
            typical_volume: VolumeBucket::Medium,
            compliance_regimes: vec![ConsumerProtection],
            data_quality_band: DataQualityBand::Good,
        },
        ConnectorKind::EcommerceShopify | ConnectorKind::EcommerceGeneric => {
            ConnectorCharacteristics {
                category: ConnectorCategory::Ecommerce,
                data_structure_level: DataStructureLevel::Nested,
                default_risk_profile: RiskLevel::Medium,
                requires_fraud_detection: true,
                requires_customer_matching: true,
                supports_batch: true,
                typical_volume: VolumeBucket::VeryHigh,
                compliance_regimes: vec![Vat, ConsumerProtection],
                data_quality_band: DataQualityBand::Good,
            }
        }
        ConnectorKind::AccountingQuickbooks | ConnectorKind::AccountingGeneric => {
            ConnectorCharacteristics {
                category: ConnectorCategory::Accounting,
                data_structure_level: DataStructureLevel::Nested,
                default_risk_profile: RiskLevel::Low,
                requires_fraud_detection: false,
                requires_customer_matching: false,
                supports_batch: true,
                typical_volume: VolumeBucket::Medium,
                compliance_regimes: vec![Vat, Firs],
                data_quality_band: DataQualityBand::Excellent,
            }
        }
        ConnectorKind::BankingGeneric => ConnectorCharacteristics {
            category: ConnectorCategory::Banking,
            data_structure_level: DataStructureLevel::Flat,
            default_risk_profile: RiskLevel::High,
            requires_fraud_detection: true,
            requires_customer_matching: true,
            supports_batch: true,
            typical_volume: VolumeBucket::VeryHigh,
            compliance_regimes: vec![Cbn, AntiMoneyLaundering],
            data_quality_band: DataQualityBand::Good,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banking_requires_fraud_detection_and_cbn_regime() {
        let c = characteristics_for(ConnectorKind::BankingGeneric);
        assert!(c.requires_fraud_detection);
        assert!(c.compliance_regimes.contains(&ComplianceRegime::Cbn));
    }

    #[test]
    fn category_derivation_matches_registry_category() {
        for kind in [
            ConnectorKind::ErpSap,
            ConnectorKind::PosRetail,
            ConnectorKind::CrmSalesforce,
            ConnectorKind::EcommerceShopify,
            ConnectorKind::AccountingQuickbooks,
            ConnectorKind::BankingGeneric,
        ] {
            assert_eq!(kind.category(), characteristics_for(kind).category);
        }
    }
}
