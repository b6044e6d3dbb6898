// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Pattern matching stage (§4.3.5): a deterministic, static-phrase
//! classifier. No network or ML calls — the entire index is a compiled
//! table.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;

use invoicecore_domain::config::ProcessingProfile;
use invoicecore_domain::entities::ProcessedTransaction;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::stage_executor::{
    ResourceRequirements, StageExecutionContext, StageExecutor,
};
use invoicecore_domain::stage_result::{EnrichmentFragment, StageKind, StageResult};

use super::timed;

/// Category assignment requires the top category's weight ratio to clear
/// this floor (§4.3.5).
const MIN_CATEGORY_WEIGHT: f64 = 0.4;

/// ...and to beat the runner-up by at least this margin.
const RUNNER_UP_MARGIN: f64 = 0.15;

struct PhraseEntry {
    category: &'static str,
    business_purpose: &'static str,
    merchant_identity: Option<&'static str>,
    weight: f64,
}

fn phrase_index() -> &'static BTreeMap<&'static str, PhraseEntry> {
    static INDEX: OnceLock<BTreeMap<&'static str, PhraseEntry>> = OnceLock::new();
    INDEX.get_or_init(|| {
        BTreeMap::from([
            ("salary", PhraseEntry { category: "payroll", business_purpose: "employee compensation", merchant_identity: None, weight: 0.6 }),
            ("payroll", PhraseEntry { category: "payroll", business_purpose: "employee compensation", merchant_identity: None, weight: 0.6 }),
            ("wages", PhraseEntry { category: "payroll", business_purpose: "employee compensation", merchant_identity: None, weight: 0.5 }),
            ("rent", PhraseEntry { category: "rent", business_purpose: "lease payment", merchant_identity: None, weight: 0.6 }),
            ("lease", PhraseEntry { category: "rent", business_purpose: "lease payment", merchant_identity: None, weight: 0.5 }),
            ("vat", PhraseEntry { category: "tax", business_purpose: "tax remittance", merchant_identity: None, weight: 0.6 }),
            ("tax", PhraseEntry { category: "tax", business_purpose: "tax remittance", merchant_identity: None, weight: 0.5 }),
            ("firs", PhraseEntry { category: "tax", business_purpose: "tax remittance", merchant_identity: None, weight: 0.5 }),
            ("electricity", PhraseEntry { category: "utilities", business_purpose: "utility bill", merchant_identity: None, weight: 0.6 }),
            ("phcn", PhraseEntry { category: "utilities", business_purpose: "utility bill", merchant_identity: Some("phcn"), weight: 0.6 }),
            ("nepa", PhraseEntry { category: "utilities", business_purpose: "utility bill", merchant_identity: None, weight: 0.5 }),
            ("water", PhraseEntry { category: "utilities", business_purpose: "utility bill", merchant_identity: None, weight: 0.4 }),
            ("fuel", PhraseEntry { category: "fuel", business_purpose: "vehicle or generator fuel", merchant_identity: None, weight: 0.6 }),
            ("diesel", PhraseEntry { category: "fuel", business_purpose: "vehicle or generator fuel", merchant_identity: None, weight: 0.6 }),
            ("petrol", PhraseEntry { category: "fuel", business_purpose: "vehicle or generator fuel", merchant_identity: None, weight: 0.5 }),
            ("consulting", PhraseEntry { category: "professional_services", business_purpose: "consultancy engagement", merchant_identity: None, weight: 0.6 }),
            ("consultancy", PhraseEntry { category: "professional_services", business_purpose: "consultancy engagement", merchant_identity: None, weight: 0.6 }),
            ("legal", PhraseEntry { category: "professional_services", business_purpose: "legal services", merchant_identity: None, weight: 0.5 }),
            ("audit", PhraseEntry { category: "professional_services", business_purpose: "audit services", merchant_identity: None, weight: 0.5 }),
            ("stationery", PhraseEntry { category: "supplies", business_purpose: "office supplies", merchant_identity: None, weight: 0.5 }),
            ("supplies", PhraseEntry { category: "supplies", business_purpose: "office supplies", merchant_identity: None, weight: 0.5 }),
            ("logistics", PhraseEntry { category: "logistics", business_purpose: "freight or delivery", merchant_identity: None, weight: 0.6 }),
            ("delivery", PhraseEntry { category: "logistics", business_purpose: "freight or delivery", merchant_identity: None, weight: 0.5 }),
            ("dispatch", PhraseEntry { category: "logistics", business_purpose: "freight or delivery", merchant_identity: None, weight: 0.5 }),
            ("shoprite", PhraseEntry { category: "retail", business_purpose: "retail purchase", merchant_identity: Some("shoprite"), weight: 0.7 }),
            ("jumia", PhraseEntry { category: "retail", business_purpose: "retail purchase", merchant_identity: Some("jumia"), weight: 0.7 }),
            ("konga", PhraseEntry { category: "retail", business_purpose: "retail purchase", merchant_identity: Some("konga"), weight: 0.7 }),
        ])
    })
}

fn normalize_and_tokenize(description: &str) -> Vec<String> {
    let stripped: String = description
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    stripped.split_whitespace().map(str::to_string).collect()
}

pub struct PatternMatchingStage;

impl PatternMatchingStage {
    pub fn new() -> Self {
        Self
    }

    /// Returns the enrichment fragment this stage can populate: category,
    /// business purpose, and merchant identity when the weighted match is
    /// decisive (§4.3.5).
    pub fn classify(transaction: &ProcessedTransaction) -> EnrichmentFragment {
        let tokens = normalize_and_tokenize(&transaction.transaction.description);
        let mut enrichment = EnrichmentFragment::default();
        if tokens.is_empty() {
            return enrichment;
        }

        let index = phrase_index();
        let mut category_weight: BTreeMap<&'static str, f64> = BTreeMap::new();
        let mut category_purpose: BTreeMap<&'static str, &'static str> = BTreeMap::new();
        let mut category_merchant: BTreeMap<&'static str, &'static str> = BTreeMap::new();

        for token in &tokens {
            if let Some(entry) = index.get(token.as_str()) {
                *category_weight.entry(entry.category).or_insert(0.0) += entry.weight;
                category_purpose.entry(entry.category).or_insert(entry.business_purpose);
                if let Some(merchant) = entry.merchant_identity {
                    category_merchant.entry(entry.category).or_insert(merchant);
                }
            }
        }

        if category_weight.is_empty() {
            return enrichment;
        }

        let token_count = tokens.len() as f64;
        let mut ranked: Vec<(&'static str, f64)> = category_weight
            .into_iter()
            .map(|(category, weight)| (category, weight / token_count))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let (top_category, top_ratio) = ranked[0];
        let runner_up_ratio = ranked.get(1).map(|(_, r)| *r).unwrap_or(0.0);

        if top_ratio >= MIN_CATEGORY_WEIGHT && top_ratio - runner_up_ratio >= RUNNER_UP_MARGIN {
            enrichment.primary_category = Some(top_category.to_string());
            enrichment.business_purpose = category_purpose.get(top_category).map(|s| s.to_string());
            enrichment.merchant_identity = category_merchant.get(top_category).map(|s| s.to_string());
        }

        enrichment
    }
}

impl Default for PatternMatchingStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for PatternMatchingStage {
    fn stage(&self) -> StageKind {
        StageKind::PatternMatching
    }

    async fn execute(
        &self,
        transaction: &ProcessedTransaction,
        context: &StageExecutionContext,
    ) -> Result<StageResult, CoreError> {
        let _ = context;
        let (enrichment, elapsed_ms) = timed(|| Self::classify(transaction));
        let mut result = StageResult::success(StageKind::PatternMatching, elapsed_ms);
        result.enrichment = enrichment;
        Ok(result)
    }

    fn can_execute(&self, context: &StageExecutionContext) -> bool {
        context
            .profile
            .stages
            .get(&StageKind::PatternMatching)
            .map(|s| s.mode != invoicecore_domain::config::ExecutionMode::Skip)
            .unwrap_or(false)
    }

    fn estimate_processing_time(&self, _context: &StageExecutionContext) -> std::time::Duration {
        std::time::Duration::from_millis(2)
    }

    fn get_resource_requirements(&self, _context: &StageExecutionContext) -> ResourceRequirements {
        ResourceRequirements {
            estimated_duration: std::time::Duration::from_millis(2),
            requires_database: false,
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
    use chrono::Utc;
    use invoicecore_domain::entities::{ConnectorMetadata, UniversalTransaction};
    use invoicecore_domain::value_objects::{ConnectorKind, Currency};
    use rust_decimal::Decimal;

    fn txn(description: &str) -> ProcessedTransaction {
        let universal = UniversalTransaction::new(
            "INV-1",
            Decimal::ONE,
            Currency::ngn(),
            Utc::now(),
            description,
            ConnectorMetadata::None,
            ConnectorKind::ErpSap,
            "inst",
            Utc::now(),
            serde_json::json!({}),
        )
        .unwrap();
        ProcessedTransaction::new_in_progress(universal, "1.0.0")
    }

    #[test]
    fn decisive_match_assigns_category_and_purpose() {
        let t = txn("monthly salary payroll");
        let enrichment = PatternMatchingStage::classify(&t);
        assert_eq!(enrichment.primary_category.as_deref(), Some("payroll"));
        assert_eq!(enrichment.business_purpose.as_deref(), Some("employee compensation"));
    }

    #[test]
    fn unrecognized_description_yields_no_category() {
        let t = txn("xzq flibber wobsprocket");
        let enrichment = PatternMatchingStage::classify(&t);
        assert!(enrichment.primary_category.is_none());
    }

    #[test]
    fn merchant_token_sets_merchant_identity() {
        let t = txn("jumia");
        let enrichment = PatternMatchingStage::classify(&t);
        assert_eq!(enrichment.merchant_identity.as_deref(), Some("jumia"));
    }
}
