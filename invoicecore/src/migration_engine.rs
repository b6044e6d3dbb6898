// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Schema migration engine (C11): declarative SQL migration units, a
//! dependency-aware run order, dry-run validation, tenant-scoped execution,
//! and rollback, grounded on `migration_engine.py`'s `MigrationEngine`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use invoicecore_domain::error::CoreError;
use invoicecore_domain::migration::{MigrationDirection, MigrationMetadata, MigrationRecord, MigrationStatus};
use invoicecore_domain::repositories::MigrationRepository;
use invoicecore_domain::value_objects::TenantId;

use crate::db::DbPool;

/// A single runnable migration. `SqlMigration` is the only implementation
/// shipped here (declarative `.sql` files, §6); the trait exists so a
/// future code-based migration can be registered the same way the
/// teacher's ports let an adapter be swapped without touching the engine.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    fn metadata(&self) -> &MigrationMetadata;

    /// Most migrations have no extra precondition beyond "hasn't run yet",
    /// which the engine already checks; override for anything stricter.
    async fn validate_preconditions(&self, _db: &DbPool, _tenant_id: Option<TenantId>) -> Result<bool, CoreError> {
        Ok(true)
    }

    async fn validate_postconditions(&self, _db: &DbPool, _tenant_id: Option<TenantId>) -> Result<bool, CoreError> {
        Ok(true)
    }

    async fn up(&self, db: &DbPool, tenant_id: Option<TenantId>) -> Result<u64, CoreError>;
    async fn down(&self, db: &DbPool, tenant_id: Option<TenantId>) -> Result<u64, CoreError>;
}

/// A migration expressed as a pair of SQL statement bodies, loaded from a
/// `-- @key: value` header plus `-- UP` / `-- DOWN` sections (§6).
pub struct SqlMigration {
    metadata: MigrationMetadata,
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(metadata: MigrationMetadata, up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            metadata,
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    /// Parses a migration file's full text: a leading run of `-- @key: value`
    /// comment lines, then `-- UP` and (optionally) `-- DOWN` markers
    /// separating the two statement bodies. Missing `-- DOWN` leaves
    /// `rollback_safe` migrations without a working rollback body — the
    /// engine rejects a rollback attempt on such a migration at run time
    /// rather than here, mirroring the Python loader's own leniency.
    pub fn from_file(id: &str, content: &str) -> Result<Self, CoreError> {
        let metadata = Self::parse_metadata(id, content)?;

        let after_header = content
            .find("-- UP")
            .map(|idx| &content[idx + "-- UP".len()..])
            .ok_or_else(|| CoreError::invalid_config(format!("migration {id} has no `-- UP` section")))?;

        let (up_sql, down_sql) = match after_header.find("-- DOWN") {
            Some(idx) => (after_header[..idx].trim().to_string(), after_header[idx + "-- DOWN".len()..].trim().to_string()),
            None => (after_header.trim().to_string(), String::new()),
        };

        Ok(Self::new(metadata, up_sql, down_sql))
    }

    fn parse_metadata(id: &str, content: &str) -> Result<MigrationMetadata, CoreError> {
        let mut name = id.to_string();
        let mut version = "1".to_string();
        let mut author = "unknown".to_string();
        let mut dependencies = Vec::new();
        let mut breaking_change = false;
        let mut estimated_duration_minutes = 1u32;
        let mut requires_maintenance_mode = false;
        let mut tenant_specific = false;
        let mut rollback_safe = true;

        for line in content.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix("-- @") else {
                if line.starts_with("-- UP") {
                    break;
                }
                continue;
            };
            let Some((key, value)) = rest.split_once(':') else { continue };
            let key = key.trim();
            let value = value.trim();
            match key {
                "name" => name = value.to_string(),
                "version" => version = value.to_string(),
                "author" => author = value.to_string(),
                "dependencies" => {
                    dependencies = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "breaking_change" => breaking_change = is_truthy(value),
                "estimated_duration_minutes" => {
                    estimated_duration_minutes = value.parse().unwrap_or(estimated_duration_minutes)
                }
                "requires_maintenance_mode" => requires_maintenance_mode = is_truthy(value),
                "tenant_specific" => tenant_specific = is_truthy(value),
                "rollback_safe" => rollback_safe = is_truthy(value),
                _ => {}
            }
        }

        Ok(MigrationMetadata {
            id: id.to_string(),
            name,
            version,
            author,
            authored_at: chrono::Utc::now(),
            dependencies,
            breaking_change,
            estimated_duration_minutes,
            requires_maintenance_mode,
            tenant_specific,
            rollback_safe,
            content_checksum: checksum(content),
        })
    }

    fn apply_tenant_filter(sql: &str, tenant_id: TenantId) -> String {
        let clause = format!("organization_id = '{tenant_id}'");
        if sql.to_uppercase().contains("WHERE") {
            format!("{sql} AND {clause}")
        } else {
            format!("{sql} WHERE {clause}")
        }
    }
}

#[async_trait]
impl MigrationUnit for SqlMigration {
    fn metadata(&self) -> &MigrationMetadata {
        &self.metadata
    }

    async fn up(&self, db: &DbPool, tenant_id: Option<TenantId>) -> Result<u64, CoreError> {
        let sql = match tenant_id {
            Some(tenant) if self.metadata.tenant_specific => Self::apply_tenant_filter(&self.up_sql, tenant),
            _ => self.up_sql.clone(),
        };
        db.execute_dml(&sql).await
    }

    async fn down(&self, db: &DbPool, tenant_id: Option<TenantId>) -> Result<u64, CoreError> {
        if self.down_sql.is_empty() {
            return Err(CoreError::MigrationError(format!(
                "migration {} has no `-- DOWN` section to roll back to",
                self.metadata.id
            )));
        }
        let sql = match tenant_id {
            Some(tenant) if self.metadata.tenant_specific => Self::apply_tenant_filter(&self.down_sql, tenant),
            _ => self.down_sql.clone(),
        };
        db.execute_dml(&sql).await
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1")
}

fn checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Runs and tracks migration units against `schema_migrations` (§6).
pub struct MigrationEngine {
    units: BTreeMap<String, Arc<dyn MigrationUnit>>,
    repository: Arc<dyn MigrationRepository>,
    db: Arc<DbPool>,
}

impl MigrationEngine {
    pub fn new(repository: Arc<dyn MigrationRepository>, db: Arc<DbPool>) -> Self {
        Self {
            units: BTreeMap::new(),
            repository,
            db,
        }
    }

    pub fn register(&mut self, unit: Arc<dyn MigrationUnit>) {
        self.units.insert(unit.metadata().id.clone(), unit);
    }

    /// Migrations not yet applied for this tenant scope, in dependency
    /// order. A global run only considers global migrations and a
    /// tenant-scoped run only considers tenant-specific ones — the two
    /// migration sets are mutually exclusive (§6).
    pub async fn pending(&self, tenant_id: Option<TenantId>) -> Result<Vec<Arc<dyn MigrationUnit>>, CoreError> {
        let applied: BTreeSet<String> = self.repository.applied_ids(tenant_id).await?.into_iter().collect();
        let candidates: Vec<Arc<dyn MigrationUnit>> = self
            .units
            .values()
            .filter(|u| !applied.contains(&u.metadata().id))
            .filter(|u| u.metadata().tenant_specific == tenant_id.is_some())
            .cloned()
            .collect();
        Ok(Self::sort_by_dependencies(candidates))
    }

    /// Repeated ready-set sort: pull every migration whose dependencies are
    /// already ordered or absent from the remaining set, repeat. A cycle
    /// (or a dependency on a migration that was filtered out above) leaves
    /// a non-empty remainder with no ready candidate; rather than failing
    /// the whole run, the remainder is appended in its original order and a
    /// warning is logged, matching the lenient behavior of the migration
    /// loader this is grounded on — unlike the stage DAG (§4.2), a broken
    /// migration dependency should not block every other pending migration.
    fn sort_by_dependencies(units: Vec<Arc<dyn MigrationUnit>>) -> Vec<Arc<dyn MigrationUnit>> {
        let mut remaining = units;
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let remaining_ids: BTreeSet<String> = remaining.iter().map(|u| u.metadata().id.clone()).collect();
            let (ready, not_ready): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|u| u.metadata().dependencies.iter().all(|dep| !remaining_ids.contains(dep)));

            if ready.is_empty() {
                warn!(count = not_ready.len(), "circular or unresolved migration dependency, applying remaining migrations in file order");
                ordered.extend(not_ready);
                break;
            }

            ordered.extend(ready);
            remaining = not_ready;
        }

        ordered
    }

    /// Applies pending migrations in order, stopping at the first failure.
    /// `target_migration`, if set, truncates the pending list to (and
    /// including) that migration. `dry_run` validates preconditions without
    /// executing or persisting a run record — the record returned for a
    /// dry-run migration is never written to `schema_migrations`.
    pub async fn run_migrations(
        &self,
        tenant_id: Option<TenantId>,
        target_migration: Option<&str>,
        dry_run: bool,
    ) -> Result<Vec<MigrationRecord>, CoreError> {
        let mut pending = self.pending(tenant_id).await?;

        if let Some(target) = target_migration {
            match pending.iter().position(|u| u.metadata().id == target) {
                Some(idx) => pending.truncate(idx + 1),
                None => {
                    warn!(target, "target migration not found among pending migrations");
                    return Ok(Vec::new());
                }
            }
        }

        if pending.is_empty() {
            info!("no pending migrations to run");
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(pending.len());
        for unit in &pending {
            let record = self
                .execute_unit(unit.as_ref(), MigrationDirection::Up, tenant_id, dry_run)
                .await?;
            let failed = record.status == MigrationStatus::Failed;
            records.push(record);
            if failed {
                warn!("migration failed, stopping the remaining run");
                break;
            }
        }
        Ok(records)
    }

    async fn execute_unit(
        &self,
        unit: &dyn MigrationUnit,
        direction: MigrationDirection,
        tenant_id: Option<TenantId>,
        dry_run: bool,
    ) -> Result<MigrationRecord, CoreError> {
        let metadata = unit.metadata();
        let mut record = MigrationRecord::pending(metadata.id.clone(), metadata, tenant_id);
        record.direction = direction;

        if !unit.validate_preconditions(&self.db, tenant_id).await? {
            record.status = MigrationStatus::Failed;
            record.error_message = Some("preconditions not met".to_string());
            self.repository.record(&record).await?;
            return Ok(record);
        }

        if dry_run {
            record.metadata = serde_json::json!({"dry_run": true});
            info!(migration_id = %metadata.id, "dry run: skipping execution");
            return Ok(record);
        }

        record.status = MigrationStatus::Running;
        record.started_at = Some(chrono::Utc::now());
        self.repository.record(&record).await?;

        info!(migration_id = %metadata.id, direction = ?direction, "executing migration");
        let start = Instant::now();
        let outcome = match direction {
            MigrationDirection::Up => unit.up(&self.db, tenant_id).await,
            MigrationDirection::Down => unit.down(&self.db, tenant_id).await,
        };

        match outcome {
            Ok(affected_rows) => {
                let postconditions_ok = unit.validate_postconditions(&self.db, tenant_id).await.unwrap_or(false);
                record.duration_ms = Some(start.elapsed().as_millis() as u64);
                record.affected_rows = Some(affected_rows);
                record.completed_at = Some(chrono::Utc::now());
                record.status = if postconditions_ok {
                    MigrationStatus::Completed
                } else {
                    MigrationStatus::Failed
                };
                if !postconditions_ok {
                    record.error_message = Some("postconditions not met".to_string());
                }
            }
            Err(err) => {
                record.duration_ms = Some(start.elapsed().as_millis() as u64);
                record.completed_at = Some(chrono::Utc::now());
                record.status = MigrationStatus::Failed;
                record.error_message = Some(err.to_string());
            }
        }

        self.repository.record(&record).await?;
        Ok(record)
    }

    /// Rolls back a single previously-applied migration. Refuses migrations
    /// not marked `rollback_safe` and migrations that are not currently
    /// applied for this tenant scope (§6).
    pub async fn rollback_migration(
        &self,
        migration_id: &str,
        tenant_id: Option<TenantId>,
        reason: &str,
    ) -> Result<MigrationRecord, CoreError> {
        let unit = self
            .units
            .get(migration_id)
            .ok_or_else(|| CoreError::NotFound(format!("migration {migration_id} is not registered")))?;

        if !unit.metadata().rollback_safe {
            return Err(CoreError::MigrationError(format!(
                "migration {migration_id} is not marked rollback_safe"
            )));
        }

        let applied: BTreeSet<String> = self.repository.applied_ids(tenant_id).await?.into_iter().collect();
        if !applied.contains(migration_id) {
            return Err(CoreError::MigrationError(format!(
                "migration {migration_id} is not currently applied"
            )));
        }

        let mut record = self
            .execute_unit(unit.as_ref(), MigrationDirection::Down, tenant_id, false)
            .await?;
        record.metadata = serde_json::json!({"rollback_reason": reason});
        self.repository.record(&record).await?;
        Ok(record)
    }

    /// Flags migrations whose recorded checksum no longer matches their
    /// current in-memory content — the Rust equivalent of the Python
    /// engine's file-drift check, minus the filesystem re-read since units
    /// here are registered in memory rather than re-parsed per call.
    pub fn validate_checksums(&self, expected: &BTreeMap<String, String>) -> Vec<String> {
        self.units
            .values()
            .filter_map(|unit| {
                let metadata = unit.metadata();
                match expected.get(&metadata.id) {
                    Some(checksum) if checksum != &metadata.content_checksum => Some(metadata.id.clone()),
                    _ => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicecore_domain::value_objects::TenantId as DomainTenantId;

    fn meta(id: &str, deps: &[&str], tenant_specific: bool) -> MigrationMetadata {
        MigrationMetadata {
            id: id.to_string(),
            name: id.to_string(),
            version: "1".to_string(),
            author: "core".to_string(),
            authored_at: chrono::Utc::now(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            breaking_change: false,
            estimated_duration_minutes: 1,
            requires_maintenance_mode: false,
            tenant_specific,
            rollback_safe: true,
            content_checksum: "x".to_string(),
        }
    }

    struct StubUnit(MigrationMetadata);

    #[async_trait]
    impl MigrationUnit for StubUnit {
        fn metadata(&self) -> &MigrationMetadata {
            &self.0
        }
        async fn up(&self, _db: &DbPool, _tenant_id: Option<DomainTenantId>) -> Result<u64, CoreError> {
            Ok(1)
        }
        async fn down(&self, _db: &DbPool, _tenant_id: Option<DomainTenantId>) -> Result<u64, CoreError> {
            Ok(1)
        }
    }

    #[test]
    fn sorts_dependents_after_their_dependencies() {
        let a: Arc<dyn MigrationUnit> = Arc::new(StubUnit(meta("a", &[], false)));
        let b: Arc<dyn MigrationUnit> = Arc::new(StubUnit(meta("b", &["a"], false)));
        let c: Arc<dyn MigrationUnit> = Arc::new(StubUnit(meta("c", &["b"], false)));
        let sorted = MigrationEngine::sort_by_dependencies(vec![c, a, b]);
        let ids: Vec<&str> = sorted.iter().map(|u| u.metadata().id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn unresolved_dependency_falls_back_to_original_order_instead_of_blocking() {
        let orphan: Arc<dyn MigrationUnit> = Arc::new(StubUnit(meta("orphan", &["missing"], false)));
        let sorted = MigrationEngine::sort_by_dependencies(vec![orphan]);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].metadata().id, "orphan");
    }

    #[test]
    fn sql_migration_parses_header_and_up_down_sections() {
        let content = "-- @name: add customers\n-- @tenant_specific: true\n-- @rollback_safe: true\n-- UP\nCREATE TABLE t (id INT);\n-- DOWN\nDROP TABLE t;\n";
        let migration = SqlMigration::from_file("0001_add_customers", content).unwrap();
        assert!(migration.metadata.tenant_specific);
        assert_eq!(migration.up_sql.trim(), "CREATE TABLE t (id INT);");
        assert_eq!(migration.down_sql.trim(), "DROP TABLE t;");
    }

    #[test]
    fn tenant_filter_appends_and_clause_when_where_already_present() {
        let filtered = SqlMigration::apply_tenant_filter(
            "UPDATE invoices SET status = 'archived' WHERE created_at < '2020-01-01'",
            TenantId::new(),
        );
        assert!(filtered.contains("AND organization_id ="));
    }

    #[test]
    fn tenant_filter_adds_where_clause_when_absent() {
        let filtered = SqlMigration::apply_tenant_filter("DELETE FROM stale_rows", TenantId::new());
        assert!(filtered.contains("WHERE organization_id ="));
    }
}
