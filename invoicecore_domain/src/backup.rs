// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Backup orchestrator (C12) types, grounded on `backup_orchestrator.py`.

use crate::value_objects::{BackupJobId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupType {
    Full,
    Incremental,
    Differential,
    TenantSpecific,
    TxnLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionFormat {
    None,
    Gzip,
    Bzip2,
}

impl Default for CompressionFormat {
    fn default() -> Self {
        CompressionFormat::Gzip
    }
}

impl CompressionFormat {
    pub fn extension(self) -> &'static str {
        match self {
            CompressionFormat::None => "",
            CompressionFormat::Gzip => ".gz",
            CompressionFormat::Bzip2 => ".bz2",
        }
    }
}

/// A scheduled backup job (C12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupJob {
    pub job_id: BackupJobId,
    pub backup_type: BackupType,
    pub status: BackupStatus,
    pub tenant_id: Option<TenantId>,
    pub file_path: Option<String>,
    pub bytes_before: Option<u64>,
    pub bytes_after: Option<u64>,
    pub checksum_sha256: Option<String>,
    pub error: Option<String>,
    #[serde(with = "crate::value_objects::datetime_serde::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::value_objects::datetime_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl BackupJob {
    pub fn new_pending(backup_type: BackupType, tenant_id: Option<TenantId>) -> Self {
        Self {
            job_id: BackupJobId::new(),
            backup_type,
            status: BackupStatus::Pending,
            tenant_id,
            file_path: None,
            bytes_before: None,
            bytes_after: None,
            checksum_sha256: None,
            error: None,
            started_at: None,
            completed_at: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// §8 invariant 7: every job reaching `completed` has a non-empty
    /// checksum.
    pub fn satisfies_completion_invariant(&self) -> bool {
        if self.status != BackupStatus::Completed {
            return true;
        }
        self.checksum_sha256.as_deref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_job_without_checksum_violates_invariant() {
        let mut job = BackupJob::new_pending(BackupType::Full, None);
        job.status = BackupStatus::Completed;
        assert!(!job.satisfies_completion_invariant());
        job.checksum_sha256 = Some("abc123".into());
        assert!(job.satisfies_completion_invariant());
    }

    #[test]
    fn default_compression_is_gzip() {
        assert_eq!(CompressionFormat::default(), CompressionFormat::Gzip);
    }
}
