// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Migration engine (C11) types, grounded on `migration_engine.py`.

use crate::value_objects::{MigrationRunId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
}

/// Declared metadata for a migration unit — parsed from a declarative
/// file's `-- @key: value` header (§6) or supplied by a code-based unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: String,
    #[serde(with = "crate::value_objects::datetime_serde")]
    pub authored_at: DateTime<Utc>,
    pub dependencies: Vec<String>,
    pub breaking_change: bool,
    pub estimated_duration_minutes: u32,
    pub requires_maintenance_mode: bool,
    pub tenant_specific: bool,
    pub rollback_safe: bool,
    /// SHA-256 hex digest of the migration's content, used to detect drift
    /// between the recorded run and the file currently on disk.
    pub content_checksum: String,
}

/// A row in `schema_migrations` (§6): the record of one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub run_id: MigrationRunId,
    pub migration_id: String,
    pub direction: MigrationDirection,
    pub status: MigrationStatus,
    pub tenant_id: Option<TenantId>,
    #[serde(with = "crate::value_objects::datetime_serde::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::value_objects::datetime_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub affected_rows: Option<u64>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub dependencies: Vec<String>,
    pub rollback_safe: bool,
}

impl MigrationRecord {
    pub fn pending(migration_id: impl Into<String>, metadata: &MigrationMetadata, tenant_id: Option<TenantId>) -> Self {
        Self {
            run_id: MigrationRunId::new(),
            migration_id: migration_id.into(),
            direction: MigrationDirection::Up,
            status: MigrationStatus::Pending,
            tenant_id,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            affected_rows: None,
            error_message: None,
            metadata: serde_json::Value::Null,
            dependencies: metadata.dependencies.clone(),
            rollback_safe: metadata.rollback_safe,
        }
    }

    /// Applying a migration already `Completed` is a no-op (§8 idempotence).
    pub fn is_noop_apply(&self) -> bool {
        self.status == MigrationStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> MigrationMetadata {
        MigrationMetadata {
            id: "0001_init".into(),
            name: "init".into(),
            version: "1".into(),
            author: "core".into(),
            authored_at: Utc::now(),
            dependencies: vec![],
            breaking_change: false,
            estimated_duration_minutes: 1,
            requires_maintenance_mode: false,
            tenant_specific: false,
            rollback_safe: true,
            content_checksum: "deadbeef".into(),
        }
    }

    #[test]
    fn completed_migration_is_a_noop_on_reapply() {
        let mut record = MigrationRecord::pending("0001_init", &meta(), None);
        assert!(!record.is_noop_apply());
        record.status = MigrationStatus::Completed;
        assert!(record.is_noop_apply());
    }
}
