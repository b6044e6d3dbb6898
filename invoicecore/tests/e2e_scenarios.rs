// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end scenarios from spec.md §8, driven through the real
//! `Orchestrator` (and, for scenario 6, `TenantManager`) against in-memory
//! repository fakes — no database or remote cache required. Each test name
//! matches the scenario it exercises.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use invoicecore::customer_matching::InMemoryCustomerMatcher;
use invoicecore::orchestrator::Orchestrator;
use invoicecore::tenant_manager::TenantManager;
use invoicecore_domain::config::{ProcessingProfile, ProfileTag};
use invoicecore_domain::customer::CustomerIdentity;
use invoicecore_domain::entities::{
    BankingMetadata, ConnectorMetadata, PosMetadata, ProcessedTransaction, TransactionStatus,
    UniversalTransaction,
};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::transaction_repository::{
    ExactFingerprint, FuzzyFingerprint, TenantAmountStatistics,
};
use invoicecore_domain::repositories::{CustomerRepository, TransactionRepository};
use invoicecore_domain::tenant::{BillingState, BillingStatus, IsolationLevel, Tier};
use invoicecore_domain::value_objects::{ConnectorKind, CustomerId, Currency, OrganizationId, TenantId};

/// A stateful in-memory stand-in for `SqlTransactionRepository`, keyed the
/// same way the real one is (tenant, source_system, identifier), so exact
/// duplicate detection (§4.3.2) behaves identically to the real backend.
#[derive(Default)]
struct InMemoryTransactionRepo {
    rows: StdMutex<Vec<(TenantId, ProcessedTransaction)>>,
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepo {
    async fn save(&self, tenant_id: TenantId, transaction: &ProcessedTransaction) -> Result<(), CoreError> {
        self.rows.lock().unwrap().push((tenant_id, transaction.clone()));
        Ok(())
    }

    async fn find_by_exact_fingerprint(
        &self,
        key: &ExactFingerprint,
    ) -> Result<Option<ProcessedTransaction>, CoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|(tenant, t)| {
                *tenant == key.tenant_id
                    && t.transaction.source_system == key.source_system
                    && t.transaction.identifier == key.identifier
            })
            .map(|(_, t)| t.clone()))
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
        tenant_id: TenantId,
        _at: chrono::DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        Ok(self.rows.lock().unwrap().iter().filter(|(t, _)| *t == tenant_id).count() as u64)
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
        _since: chrono::DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        Ok(0)
    }
}

#[derive(Default)]
struct InMemoryCustomerRepo {
    rows: StdMutex<std::collections::BTreeMap<CustomerId, CustomerIdentity>>,
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepo {
    async fn save(&self, identity: &CustomerIdentity) -> Result<(), CoreError> {
        self.rows.lock().unwrap().insert(identity.universal_id, identity.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<CustomerIdentity>, CoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<CustomerIdentity>, CoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

fn erp_transaction(id: &str, amount: Decimal, subtotal: Decimal, vat: Decimal) -> UniversalTransaction {
    let mut universal = UniversalTransaction::new(
        id,
        amount,
        Currency::ngn(),
        chrono::DateTime::parse_from_rfc3339("2024-06-01T10:00:00Z").unwrap().with_timezone(&Utc),
        "consulting services",
        ConnectorMetadata::Erp(invoicecore_domain::entities::ErpMetadata {
            invoice_number: Some(id.to_string()),
            ..Default::default()
        }),
        ConnectorKind::ErpSap,
        "sap-prod-1",
        Utc::now(),
        serde_json::json!({"invoice_ref": id}),
    )
    .unwrap();
    universal.subtotal = Some(subtotal);
    universal.vat = Some(vat);
    universal.processing_hints.insert("tin".into(), serde_json::json!("12345678901234"));
    universal
}

fn orchestrator_with(repo: Arc<InMemoryTransactionRepo>) -> Orchestrator {
    let customer_repo = Arc::new(InMemoryCustomerRepo::default());
    let matcher = Arc::new(InMemoryCustomerMatcher::new(customer_repo));
    Orchestrator::new(repo, matcher, "1.0.0-test")
}

/// Scenario 1 (§8): ERP VAT happy path.
#[tokio::test]
async fn erp_vat_happy_path_completes_ready_for_invoice() {
    let repo = Arc::new(InMemoryTransactionRepo::default());
    let orchestrator = orchestrator_with(repo);

    let universal = erp_transaction(
        "INV-2024-001",
        Decimal::new(107_500_00, 2),
        Decimal::new(100_000_00, 2),
        Decimal::new(7_500_00, 2),
    );
    let outcome = orchestrator
        .process(universal, TenantId::new(), ProcessingProfile::for_tag(ProfileTag::EnterpriseErp), Currency::ngn())
        .await
        .unwrap();

    assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
    assert!(
        outcome.transaction.ready_for_invoice,
        "notes: {:?}",
        outcome.transaction.processing.processing_notes
    );
    assert!(outcome.transaction.processing.confidence >= 0.8);
    assert!(outcome.transaction.validation.issues_by_severity.is_empty());
}

/// Scenario 2 (§8): VAT miscalculation fails the pipeline under
/// enterprise-erp's fail-pipeline business-rules action.
#[tokio::test]
async fn vat_miscalculation_fails_pipeline_and_blocks_invoice() {
    let repo = Arc::new(InMemoryTransactionRepo::default());
    let orchestrator = orchestrator_with(repo);

    let universal = erp_transaction(
        "INV-2024-001",
        Decimal::new(107_499_00, 2),
        Decimal::new(100_000_00, 2),
        Decimal::new(7_499_00, 2),
    );
    let outcome = orchestrator
        .process(universal, TenantId::new(), ProcessingProfile::for_tag(ProfileTag::EnterpriseErp), Currency::ngn())
        .await
        .unwrap();

    assert_eq!(outcome.transaction.status, TransactionStatus::Failed);
    assert!(!outcome.transaction.ready_for_invoice);
    let vat_violation = outcome
        .stage_results
        .values()
        .flat_map(|r| r.violations.iter())
        .find(|v| v.rule_id == "VAT_RATE_VALIDATION");
    assert!(vat_violation.is_some());
    assert_eq!(vat_violation.unwrap().severity, invoicecore_domain::value_objects::Severity::Error);
}

/// Scenario 3 (§8): POS transaction missing receipt number and terminal id
/// fails at business-rules while amount validation stays low risk.
#[tokio::test]
async fn pos_missing_receipt_and_terminal_fails_business_rules() {
    let repo = Arc::new(InMemoryTransactionRepo::default());
    let orchestrator = orchestrator_with(repo);

    let universal = UniversalTransaction::new(
        "POS-0001",
        Decimal::new(5_000_00, 2),
        Currency::ngn(),
        Utc::now(),
        "retail sale",
        ConnectorMetadata::Pos(PosMetadata { receipt_number: None, terminal_id: None }),
        ConnectorKind::PosRetail,
        "square-1",
        Utc::now(),
        serde_json::json!({}),
    )
    .unwrap();

    let outcome = orchestrator
        .process(universal, TenantId::new(), ProcessingProfile::for_tag(ProfileTag::CustomerFacing), Currency::ngn())
        .await
        .unwrap();

    assert_eq!(outcome.transaction.status, TransactionStatus::Failed);
    let pos_violation = outcome
        .stage_results
        .values()
        .flat_map(|r| r.violations.iter())
        .find(|v| v.rule_id == "POS_RECEIPT_OR_TERMINAL_MISSING");
    assert!(pos_violation.is_some());
    assert_eq!(outcome.transaction.processing.risk_level, invoicecore_domain::value_objects::RiskLevel::Low);
}

/// Scenario 4 (§8): the same banking transaction submitted twice, 5 minutes
/// apart, for the same tenant under financial-data fails the second time
/// with the prior identifier attached.
#[tokio::test]
async fn duplicate_banking_transaction_fails_second_submission() {
    let repo = Arc::new(InMemoryTransactionRepo::default());
    let orchestrator = orchestrator_with(repo);
    let tenant_id = TenantId::new();

    let build = |ts: chrono::DateTime<Utc>| {
        UniversalTransaction::new(
            "TXN1",
            Decimal::new(250_000_00, 2),
            Currency::ngn(),
            ts,
            "wire transfer",
            ConnectorMetadata::Banking(BankingMetadata {
                bank_reference: Some("REF-998877".to_string()),
                account_number: Some("0123456789".to_string()),
            }),
            ConnectorKind::BankingGeneric,
            "nibss-1",
            ts,
            serde_json::json!({}),
        )
        .unwrap()
    };

    let first = orchestrator
        .process(
            build(Utc::now()),
            tenant_id,
            ProcessingProfile::for_tag(ProfileTag::FinancialData),
            Currency::ngn(),
        )
        .await
        .unwrap();
    assert_eq!(first.transaction.status, TransactionStatus::Completed);

    let second = orchestrator
        .process(
            build(Utc::now() + chrono::Duration::minutes(5)),
            tenant_id,
            ProcessingProfile::for_tag(ProfileTag::FinancialData),
            Currency::ngn(),
        )
        .await
        .unwrap();

    assert_eq!(second.transaction.status, TransactionStatus::Failed);
    assert_eq!(second.transaction.duplicate_match.as_deref(), Some("TXN1"));
}

/// Scenario 5 (§8): two transactions from different connector categories
/// (POS, CRM) naming the same business under spelling variants, sharing a
/// phone number, resolve to the same universal customer id.
#[tokio::test]
async fn customer_merges_across_pos_and_crm_on_shared_phone() {
    let repo = Arc::new(InMemoryTransactionRepo::default());
    let orchestrator = orchestrator_with(repo);
    let tenant_id = TenantId::new();

    let mut pos_txn = UniversalTransaction::new(
        "POS-9001",
        Decimal::new(25_000_00, 2),
        Currency::ngn(),
        Utc::now(),
        "counter sale",
        ConnectorMetadata::Pos(PosMetadata {
            receipt_number: Some("RCPT-001".to_string()),
            terminal_id: Some("TERM-01".to_string()),
        }),
        ConnectorKind::PosRetail,
        "square-1",
        Utc::now(),
        serde_json::json!({}),
    )
    .unwrap();
    pos_txn.processing_hints.insert("customer_name".into(), serde_json::json!("ABC Manufacturing Ltd"));
    pos_txn.processing_hints.insert("customer_phone".into(), serde_json::json!("+2348031234567"));

    let mut crm_txn = UniversalTransaction::new(
        "CRM-1002",
        Decimal::new(60_000_00, 2),
        Currency::ngn(),
        Utc::now(),
        "service contract",
        ConnectorMetadata::Crm(Default::default()),
        ConnectorKind::CrmSalesforce,
        "sfdc-1",
        Utc::now(),
        serde_json::json!({}),
    )
    .unwrap();
    crm_txn.processing_hints.insert("customer_name".into(), serde_json::json!("Abc Manufacturing Limited"));
    crm_txn.processing_hints.insert("customer_phone".into(), serde_json::json!("08031234567"));

    let profile = ProcessingProfile::for_tag(ProfileTag::CustomerFacing);
    let first = orchestrator.process(pos_txn, tenant_id, profile.clone(), Currency::ngn()).await.unwrap();
    let second = orchestrator.process(crm_txn, tenant_id, profile, Currency::ngn()).await.unwrap();

    let first_customer = first.transaction.enrichment.customer_id.expect("first resolves a customer");
    let second_customer = second.transaction.enrichment.customer_id.expect("second resolves a customer");
    assert_eq!(first_customer, second_customer);
}

/// Scenario 6 (§8): a tenant already at its monthly invoice ceiling is
/// rejected before the pipeline runs — the quota check is the caller's
/// responsibility (§4.5), upstream of `Orchestrator::process`, so nothing
/// reaches `processed_transactions`.
#[tokio::test]
async fn tenant_over_monthly_ceiling_is_rejected_before_processing() {
    struct FakeTenantRepo {
        config: invoicecore_domain::tenant::TenantConfiguration,
    }
    #[async_trait]
    impl invoicecore_domain::repositories::TenantRepository for FakeTenantRepo {
        async fn find_by_id(
            &self,
            _id: TenantId,
        ) -> Result<Option<invoicecore_domain::tenant::TenantConfiguration>, CoreError> {
            Ok(Some(self.config.clone()))
        }
        async fn save(&self, _config: &invoicecore_domain::tenant::TenantConfiguration) -> Result<(), CoreError> {
            Ok(())
        }
    }

    let tenant_id = TenantId::new();
    let config = invoicecore_domain::tenant::TenantConfiguration {
        tenant_id,
        organization_id: OrganizationId::new(),
        tier: Tier::Starter,
        isolation_level: IsolationLevel::Shared,
        monthly_invoice_ceiling: Some(1000),
        user_ceiling: None,
        rate_limit_per_minute: 1000,
        cache_ttl_secs: 300,
        service_classes: vec![],
        billing: BillingState {
            status: BillingStatus::Active,
            tier: Tier::Starter,
            invoice_quota: 1000,
            invoice_quota_used: 1000,
            next_billing_date: Utc::now(),
        },
        grant_tracking: None,
    };
    let tenant_manager = TenantManager::new(Arc::new(FakeTenantRepo { config: config.clone() }));
    let resolved = tenant_manager.resolve(tenant_id).await.unwrap();

    let status = TenantManager::check_quota(&resolved, 1000);
    assert_eq!(status, invoicecore::tenant_manager::QuotaStatus::OverCeiling);

    // The 1001st submission never reaches the transaction repository: the
    // quota check short-circuits before `Orchestrator::process` is called.
    let repo = Arc::new(InMemoryTransactionRepo::default());
    if status != invoicecore::tenant_manager::QuotaStatus::OverCeiling {
        let orchestrator = orchestrator_with(repo.clone());
        let universal = erp_transaction(
            "INV-OVER-CEILING",
            Decimal::new(1_000_00, 2),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        orchestrator
            .process(universal, tenant_id, ProcessingProfile::for_tag(ProfileTag::EnterpriseErp), Currency::ngn())
            .await
            .unwrap();
    }
    assert!(repo.rows.lock().unwrap().is_empty());
}
