// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Customer matching engine (C7, §4.4): four in-memory inverted indexes
//! per tenant (name, phone, email, business id), rebuilt from
//! `CustomerRepository` on first touch and kept current as identities are
//! merged or created. Resolution for a given tenant is serialized through
//! a per-tenant async mutex, matching §5's ordering guarantee that two
//! transactions for the same tenant are never matched concurrently against
//! a half-updated index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use invoicecore_domain::customer::{
    CustomerIdentity, MatchConfidence, MatchingStrategy, BUSINESS_ID_WEIGHT, EMAIL_WEIGHT,
    MULTI_FACTOR_BOOST, NAME_WEIGHT, PHONE_WEIGHT,
};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::CustomerRepository;
use invoicecore_domain::services::customer_matcher::{CandidateIdentity, CustomerMatcher, MatchOutcome};
use invoicecore_domain::value_objects::{CustomerId, TenantId};

/// Corporate suffixes stripped before comparing names, so "Acme Ltd" and
/// "Acme Limited" normalize to the same key (§4.4).
const NAME_SUFFIXES: &[&str] = &[
    "limited", "ltd", "plc", "incorporated", "inc", "llc", "company", "co",
];

pub fn normalize_name(name: &str) -> String {
    let lower: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = lower.split_whitespace().collect();
    while let Some(last) = tokens.last() {
        if NAME_SUFFIXES.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }
    tokens.join(" ")
}

/// Strips formatting and a leading Nigerian country/trunk code so
/// `+234 803 123 4567`, `0803 123 4567`, and `803-123-4567` all normalize to
/// the same ten-digit subscriber number (§4.4).
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.strip_prefix("234").map(str::to_string).unwrap_or(digits);
    let digits = digits.strip_prefix('0').map(str::to_string).unwrap_or(digits);
    if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn normalize_business_id(id: &str) -> String {
    id.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_ascii_uppercase()
}

fn first_token(normalized_name: &str) -> Option<String> {
    normalized_name.split_whitespace().next().map(str::to_string)
}

#[derive(Default)]
struct TenantIndex {
    loaded: bool,
    identities: BTreeMap<CustomerId, CustomerIdentity>,
    by_name_token: BTreeMap<String, BTreeSet<CustomerId>>,
    by_phone: BTreeMap<String, CustomerId>,
    by_email: BTreeMap<String, CustomerId>,
    by_business_id: BTreeMap<String, CustomerId>,
}

impl TenantIndex {
    fn index(&mut self, identity: &CustomerIdentity) {
        for name in &identity.normalized_names {
            if let Some(token) = first_token(&normalize_name(name)) {
                self.by_name_token.entry(token).or_default().insert(identity.universal_id);
            }
        }
        for phone in &identity.phone_numbers {
            self.by_phone.insert(normalize_phone(phone), identity.universal_id);
        }
        for email in &identity.emails {
            self.by_email.insert(normalize_email(email), identity.universal_id);
        }
        for business_id in identity.business_identifiers.values() {
            self.by_business_id.insert(normalize_business_id(business_id), identity.universal_id);
        }
    }

    fn insert(&mut self, identity: CustomerIdentity) {
        self.index(&identity);
        self.identities.insert(identity.universal_id, identity);
    }

    /// Candidate ids from exact-match indexes plus a loose name-token join,
    /// de-duplicated. An empty result means "no existing identity is worth
    /// scoring" — the caller creates a new one.
    fn candidates(&self, candidate: &CandidateIdentity) -> BTreeSet<CustomerId> {
        let mut ids = BTreeSet::new();
        if let Some(phone) = candidate.phone.as_deref() {
            if let Some(id) = self.by_phone.get(&normalize_phone(phone)) {
                ids.insert(*id);
            }
        }
        if let Some(email) = candidate.email.as_deref() {
            if let Some(id) = self.by_email.get(&normalize_email(email)) {
                ids.insert(*id);
            }
        }
        if let Some(business_id) = candidate.business_id.as_deref() {
            if let Some(id) = self.by_business_id.get(&normalize_business_id(business_id)) {
                ids.insert(*id);
            }
        }
        if let Some(name) = candidate.name.as_deref() {
            if let Some(token) = first_token(&normalize_name(name)) {
                if let Some(set) = self.by_name_token.get(&token) {
                    ids.extend(set.iter().copied());
                }
            }
        }
        ids
    }
}

/// Weighted-similarity score (§4.4): each present factor contributes its
/// weight times a [0, 1] similarity, absent factors contribute nothing, and
/// a multi-factor boost rewards agreement across more than one signal.
fn score(candidate: &CandidateIdentity, identity: &CustomerIdentity) -> f64 {
    let mut weighted_sum = 0.0;
    let mut active_factors = 0u32;

    if let Some(name) = candidate.name.as_deref() {
        let normalized = normalize_name(name);
        let best = identity
            .normalized_names
            .iter()
            .map(|n| strsim::jaro_winkler(&normalized, &normalize_name(n)))
            .fold(0.0_f64, f64::max);
        if best > 0.0 {
            weighted_sum += NAME_WEIGHT * best;
            active_factors += 1;
        }
    }
    if let Some(phone) = candidate.phone.as_deref() {
        let normalized = normalize_phone(phone);
        if identity.phone_numbers.iter().any(|p| normalize_phone(p) == normalized) {
            weighted_sum += PHONE_WEIGHT;
            active_factors += 1;
        }
    }
    if let Some(email) = candidate.email.as_deref() {
        if identity.emails.iter().any(|e| normalize_email(e) == normalize_email(email)) {
            weighted_sum += EMAIL_WEIGHT;
            active_factors += 1;
        }
    }
    if let Some(business_id) = candidate.business_id.as_deref() {
        let normalized = normalize_business_id(business_id);
        if identity.business_identifiers.values().any(|v| normalize_business_id(v) == normalized) {
            weighted_sum += BUSINESS_ID_WEIGHT;
            active_factors += 1;
        }
    }

    if active_factors >= 2 {
        (weighted_sum * MULTI_FACTOR_BOOST).min(1.0)
    } else {
        weighted_sum
    }
}

fn identity_from_candidate(
    tenant_id: TenantId,
    candidate: &CandidateIdentity,
    now: chrono::DateTime<chrono::Utc>,
) -> CustomerIdentity {
    let name = candidate.name.clone().unwrap_or_else(|| "Unknown customer".to_string());
    let mut identity = CustomerIdentity::new(tenant_id, CustomerId::new(), name, now);
    merge_candidate_into(&mut identity, candidate, now);
    identity
}

fn merge_candidate_into(
    identity: &mut CustomerIdentity,
    candidate: &CandidateIdentity,
    now: chrono::DateTime<chrono::Utc>,
) {
    if let Some(name) = &candidate.name {
        identity.normalized_names.insert(name.clone());
    }
    if let Some(phone) = &candidate.phone {
        identity.phone_numbers.insert(phone.clone());
    }
    if let Some(email) = &candidate.email {
        identity.emails.insert(email.clone());
    }
    if let Some(address) = &candidate.address {
        identity.addresses.insert(address.clone());
    }
    if let Some(business_id) = &candidate.business_id {
        identity
            .business_identifiers
            .entry("business_id".to_string())
            .or_insert_with(|| business_id.clone());
    }
    if let (Some(source), Some(local_id)) = (candidate.source, &candidate.source_local_id) {
        identity.sources.entry(source).or_insert_with(|| local_id.clone());
    }
    identity.last_updated = now;
}

pub struct InMemoryCustomerMatcher {
    repository: Arc<dyn CustomerRepository>,
    tenants: DashMap<TenantId, Arc<AsyncMutex<TenantIndex>>>,
}

impl InMemoryCustomerMatcher {
    pub fn new(repository: Arc<dyn CustomerRepository>) -> Self {
        Self {
            repository,
            tenants: DashMap::new(),
        }
    }

    fn tenant_mutex(&self, tenant_id: TenantId) -> Arc<AsyncMutex<TenantIndex>> {
        self.tenants
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(TenantIndex::default())))
            .clone()
    }

    async fn ensure_loaded(&self, tenant_id: TenantId, index: &mut TenantIndex) -> Result<(), CoreError> {
        if index.loaded {
            return Ok(());
        }
        for identity in self.repository.list_for_tenant(tenant_id).await? {
            index.insert(identity);
        }
        index.loaded = true;
        Ok(())
    }
}

#[async_trait]
impl CustomerMatcher for InMemoryCustomerMatcher {
    async fn resolve_or_create(
        &self,
        tenant_id: TenantId,
        candidate: &CandidateIdentity,
        strategy: MatchingStrategy,
    ) -> Result<MatchOutcome, CoreError> {
        let mutex = self.tenant_mutex(tenant_id);
        let mut index = mutex.lock().await;
        self.ensure_loaded(tenant_id, &mut index).await?;

        let now = chrono::Utc::now();
        let candidate_ids = index.candidates(candidate);
        let best = candidate_ids
            .iter()
            .map(|id| (*id, score(candidate, &index.identities[id])))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let thresholds = strategy.thresholds();
        let (customer_id, confidence, outcome_score) = match best {
            // exact/high: merge into the existing identity (§4.4).
            Some((id, s)) if s >= thresholds.high => {
                let identity = index.identities.get_mut(&id).unwrap();
                merge_candidate_into(identity, candidate, now);
                let identity_clone = identity.clone();
                self.repository.save(&identity_clone).await?;
                index.index(&identity_clone);
                (id, strategy.classify(s), s)
            }
            // medium: return the candidate for manual review, do not merge.
            Some((id, s)) if s >= thresholds.medium => (id, strategy.classify(s), s),
            // low or below (including no candidates at all): create a new identity.
            _ => {
                let identity = identity_from_candidate(tenant_id, candidate, now);
                let id = identity.universal_id;
                self.repository.save(&identity).await?;
                index.insert(identity);
                (id, MatchConfidence::NoMatch, best.map(|(_, s)| s).unwrap_or(0.0))
            }
        };

        let identity = &index.identities[&customer_id];
        Ok(MatchOutcome {
            customer_id,
            customer_name: identity.primary_name.clone(),
            confidence,
            score: outcome_score,
            company_registration_verified: identity.verification.get("company_registration").copied().unwrap_or(false),
            tax_compliance_verified: identity.verification.get("tax_compliance").copied().unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeRepo {
        saved: StdMutex<BTreeMap<CustomerId, CustomerIdentity>>,
    }

    #[async_trait]
    impl CustomerRepository for FakeRepo {
        async fn save(&self, identity: &CustomerIdentity) -> Result<(), CoreError> {
            self.saved.lock().unwrap().insert(identity.universal_id, identity.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: CustomerId) -> Result<Option<CustomerIdentity>, CoreError> {
            Ok(self.saved.lock().unwrap().get(&id).cloned())
        }

        async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<CustomerIdentity>, CoreError> {
            Ok(self
                .saved
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.tenant_id == tenant_id)
                .cloned()
                .collect())
        }
    }

    #[test]
    fn normalizes_legal_suffixes_to_the_same_key() {
        assert_eq!(normalize_name("Acme Ltd"), normalize_name("Acme Limited"));
    }

    #[test]
    fn normalizes_phone_variants_to_ten_digits() {
        assert_eq!(normalize_phone("+234 803 123 4567"), normalize_phone("0803 123 4567"));
        assert_eq!(normalize_phone("0803 123 4567"), "8031234567");
    }

    #[tokio::test]
    async fn exact_email_match_merges_into_existing_identity() {
        let repo = Arc::new(FakeRepo::default());
        let matcher = InMemoryCustomerMatcher::new(repo.clone());
        let tenant = TenantId::new();

        // Name + email + phone all agree, pushing the boosted score above
        // the Balanced strategy's `high` threshold (§4.4 merges exact/high
        // only; name+email alone lands in the medium, no-merge band).
        let first = CandidateIdentity {
            name: Some("Acme Ltd".to_string()),
            email: Some("billing@acme.com".to_string()),
            phone: Some("+2348031234567".to_string()),
            ..Default::default()
        };
        let outcome1 = matcher.resolve_or_create(tenant, &first, MatchingStrategy::Balanced).await.unwrap();

        let second = CandidateIdentity {
            name: Some("Acme Limited".to_string()),
            email: Some("billing@acme.com".to_string()),
            phone: Some("08031234567".to_string()),
            ..Default::default()
        };
        let outcome2 = matcher.resolve_or_create(tenant, &second, MatchingStrategy::Balanced).await.unwrap();

        assert_eq!(outcome1.customer_id, outcome2.customer_id);
    }

    fn nigerian_subscriber_number() -> impl proptest::strategy::Strategy<Value = String> {
        use proptest::prelude::*;
        ("[789]", "[0-9]{9}").prop_map(|(lead, rest)| format!("{lead}{rest}"))
    }

    proptest::proptest! {
        /// Local (`0...`), country-code (`234...`), and bare ten-digit forms
        /// of the same subscriber number all collapse to it, and normalizing
        /// that result again is a no-op (§4.4).
        #[test]
        fn normalize_phone_converges_on_the_bare_subscriber_number(core in nigerian_subscriber_number()) {
            let local = format!("0{core}");
            let international = format!("+234 {core}");
            proptest::prop_assert_eq!(normalize_phone(&core), core.clone());
            proptest::prop_assert_eq!(normalize_phone(&local), core.clone());
            proptest::prop_assert_eq!(normalize_phone(&international), core.clone());
            proptest::prop_assert_eq!(normalize_phone(&normalize_phone(&local)), core);
        }

        #[test]
        fn normalize_email_is_idempotent(email in "[a-zA-Z0-9@. ]{0,40}") {
            let once = normalize_email(&email);
            let twice = normalize_email(&once);
            proptest::prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalize_business_id_is_idempotent(id in "[a-zA-Z0-9-]{0,20}") {
            let once = normalize_business_id(&id);
            let twice = normalize_business_id(&once);
            proptest::prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalize_name_is_idempotent(name in "[a-zA-Z ]{0,40}") {
            let once = normalize_name(&name);
            let twice = normalize_name(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }

    #[tokio::test]
    async fn no_overlapping_factors_creates_a_new_identity() {
        let repo = Arc::new(FakeRepo::default());
        let matcher = InMemoryCustomerMatcher::new(repo);
        let tenant = TenantId::new();

        let a = CandidateIdentity {
            name: Some("Acme Ltd".to_string()),
            email: Some("a@acme.com".to_string()),
            ..Default::default()
        };
        let b = CandidateIdentity {
            name: Some("Zephyr Traders".to_string()),
            email: Some("b@zephyr.com".to_string()),
            ..Default::default()
        };
        let outcome_a = matcher.resolve_or_create(tenant, &a, MatchingStrategy::Balanced).await.unwrap();
        let outcome_b = matcher.resolve_or_create(tenant, &b, MatchingStrategy::Balanced).await.unwrap();
        assert_ne!(outcome_a.customer_id, outcome_b.customer_id);
    }
}
