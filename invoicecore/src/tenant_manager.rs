// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Tenant manager (C8, §4.5): a TTL-invalidated resolution cache over
//! `TenantRepository`, a per-tenant token-bucket rate limiter, and the
//! `with_tenant` scoped-context primitive that threads the active tenant
//! through an async call tree without an explicit parameter everywhere.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::TenantRepository;
use invoicecore_domain::tenant::TenantConfiguration;
use invoicecore_domain::value_objects::TenantId;

tokio::task_local! {
    static CURRENT_TENANT: TenantId;
}

/// Runs `fut` with `tenant_id` as the ambient tenant for its entire call
/// tree (§4.5). Nested calls shadow the outer tenant and the previous value
/// is restored once `fut` completes, whether by returning or unwinding.
pub async fn with_tenant<F, T>(tenant_id: TenantId, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT_TENANT.scope(tenant_id, fut).await
}

/// The tenant the current async task is scoped to, if any (§4.5). `None`
/// outside of a `with_tenant` call — e.g. in a background job that has not
/// yet entered a tenant's context.
pub fn current_tenant() -> Option<TenantId> {
    CURRENT_TENANT.try_with(|t| *t).ok()
}

struct CachedConfig {
    config: TenantConfiguration,
    cached_at: Instant,
}

/// Simple token bucket refilling continuously at `rate_per_minute / 60`
/// tokens per second, capped at `rate_per_minute` (§4.5 rate limiting).
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_minute: u32) -> Self {
        let capacity = (rate_per_minute.max(1)) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Quota status relative to a tenant's monthly invoice ceiling (§4.5: "an
/// over-ceiling request fails outright; an approaching-ceiling request
/// succeeds with a warning").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStatus {
    Ok,
    ApproachingCeiling,
    OverCeiling,
}

pub struct TenantManager {
    repository: Arc<dyn TenantRepository>,
    cache: DashMap<TenantId, CachedConfig>,
    rate_limiters: DashMap<TenantId, Mutex<TokenBucket>>,
}

impl TenantManager {
    pub fn new(repository: Arc<dyn TenantRepository>) -> Self {
        Self {
            repository,
            cache: DashMap::new(),
            rate_limiters: DashMap::new(),
        }
    }

    /// Resolves a tenant's configuration, serving from cache while its
    /// `cache_ttl_secs` has not elapsed (§4.5).
    pub async fn resolve(&self, tenant_id: TenantId) -> Result<TenantConfiguration, CoreError> {
        if let Some(entry) = self.cache.get(&tenant_id) {
            let ttl = Duration::from_secs(entry.config.cache_ttl_secs.max(1));
            if entry.cached_at.elapsed() < ttl {
                return Ok(entry.config.clone());
            }
        }

        let config = self
            .repository
            .find_by_id(tenant_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("tenant {tenant_id} not found")))?;

        self.cache.insert(
            tenant_id,
            CachedConfig {
                config: config.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(config)
    }

    /// Forces the next `resolve` to re-fetch, e.g. after an admin updates a
    /// tenant's configuration out of band.
    pub fn invalidate(&self, tenant_id: TenantId) {
        self.cache.remove(&tenant_id);
    }

    pub async fn save(&self, config: TenantConfiguration) -> Result<(), CoreError> {
        self.repository.save(&config).await?;
        self.cache.insert(
            config.tenant_id,
            CachedConfig {
                config,
                cached_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Consumes one token from the tenant's bucket, sized by its
    /// configured `rate_limit_per_minute` (§4.5).
    pub fn check_rate_limit(&self, config: &TenantConfiguration) -> Result<(), CoreError> {
        let mut bucket = self
            .rate_limiters
            .entry(config.tenant_id)
            .or_insert_with(|| Mutex::new(TokenBucket::new(config.rate_limit_per_minute)))
            .lock();
        if bucket.try_acquire() {
            Ok(())
        } else {
            Err(CoreError::RateLimitedError(format!(
                "tenant {} exceeded {} requests/minute",
                config.tenant_id, config.rate_limit_per_minute
            )))
        }
    }

    /// Monthly invoice-ceiling check (§4.5, §8.4): the caller supplies the
    /// already-counted `processed_this_month` (via `TransactionRepository`)
    /// since the tenant manager has no transaction-volume knowledge of its
    /// own.
    pub fn check_quota(config: &TenantConfiguration, processed_this_month: u64) -> QuotaStatus {
        if config.is_over_invoice_ceiling(processed_this_month) {
            QuotaStatus::OverCeiling
        } else if config.is_approaching_invoice_ceiling(processed_this_month) {
            QuotaStatus::ApproachingCeiling
        } else {
            QuotaStatus::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicecore_domain::tenant::{BillingState, BillingStatus, IsolationLevel, Tier};
    use invoicecore_domain::value_objects::OrganizationId;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeRepo {
        configs: StdMutex<std::collections::BTreeMap<TenantId, TenantConfiguration>>,
    }

    #[async_trait::async_trait]
    impl TenantRepository for FakeRepo {
        async fn find_by_id(&self, id: TenantId) -> Result<Option<TenantConfiguration>, CoreError> {
            Ok(self.configs.lock().unwrap().get(&id).cloned())
        }

        async fn save(&self, config: &TenantConfiguration) -> Result<(), CoreError> {
            self.configs.lock().unwrap().insert(config.tenant_id, config.clone());
            Ok(())
        }
    }

    fn sample(tenant_id: TenantId, rate_limit: u32) -> TenantConfiguration {
        TenantConfiguration {
            tenant_id,
            organization_id: OrganizationId::new(),
            tier: Tier::Starter,
            isolation_level: IsolationLevel::Shared,
            monthly_invoice_ceiling: Some(100),
            user_ceiling: None,
            rate_limit_per_minute: rate_limit,
            cache_ttl_secs: 300,
            service_classes: vec![],
            billing: BillingState {
                status: BillingStatus::Active,
                tier: Tier::Starter,
                invoice_quota: 100,
                invoice_quota_used: 0,
                next_billing_date: chrono::Utc::now(),
            },
            grant_tracking: None,
        }
    }

    #[tokio::test]
    async fn resolve_caches_until_invalidated() {
        let repo = Arc::new(FakeRepo::default());
        let tenant_id = TenantId::new();
        repo.save(&sample(tenant_id, 60)).await.unwrap();
        let manager = TenantManager::new(repo);

        let first = manager.resolve(tenant_id).await.unwrap();
        assert_eq!(first.tenant_id, tenant_id);
        manager.invalidate(tenant_id);
        let second = manager.resolve(tenant_id).await.unwrap();
        assert_eq!(second.tenant_id, tenant_id);
    }

    #[test]
    fn rate_limiter_rejects_once_the_bucket_is_empty() {
        let manager = TenantManager::new(Arc::new(FakeRepo::default()));
        let config = sample(TenantId::new(), 1);
        assert!(manager.check_rate_limit(&config).is_ok());
        assert!(manager.check_rate_limit(&config).is_err());
    }

    #[test]
    fn quota_status_distinguishes_warning_from_breach() {
        let config = sample(TenantId::new(), 60);
        assert_eq!(TenantManager::check_quota(&config, 50), QuotaStatus::Ok);
        assert_eq!(TenantManager::check_quota(&config, 85), QuotaStatus::ApproachingCeiling);
        assert_eq!(TenantManager::check_quota(&config, 100), QuotaStatus::OverCeiling);
    }

    #[tokio::test]
    async fn with_tenant_nests_and_restores() {
        let outer = TenantId::new();
        let inner = TenantId::new();
        with_tenant(outer, async {
            assert_eq!(current_tenant(), Some(outer));
            with_tenant(inner, async {
                assert_eq!(current_tenant(), Some(inner));
            })
            .await;
            assert_eq!(current_tenant(), Some(outer));
        })
        .await;
        assert_eq!(current_tenant(), None);
    }
}
