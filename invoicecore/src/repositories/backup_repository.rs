// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `backup_jobs` persistence (C12): job lifecycle rows plus the retention
//! sweep and incremental-checkpoint queries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use invoicecore_domain::backup::{BackupJob, BackupStatus};
use invoicecore_domain::error::CoreError;
use invoicecore_domain::repositories::BackupRepository;
use invoicecore_domain::value_objects::BackupJobId;

use crate::db::DbPool;

pub struct SqlBackupRepository {
    db: Arc<DbPool>,
}

impl SqlBackupRepository {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    fn row_to_job(row: &sqlx::any::AnyRow) -> Result<BackupJob, CoreError> {
        let json: String = row
            .try_get("job_json")
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        serde_json::from_str(&json).map_err(CoreError::from)
    }
}

fn status_str(status: BackupStatus) -> &'static str {
    match status {
        BackupStatus::Pending => "pending",
        BackupStatus::Running => "running",
        BackupStatus::Completed => "completed",
        BackupStatus::Failed => "failed",
        BackupStatus::Cancelled => "cancelled",
    }
}

#[async_trait]
impl BackupRepository for SqlBackupRepository {
    async fn save(&self, job: &BackupJob) -> Result<(), CoreError> {
        let json = serde_json::to_string(job)?;
        sqlx::query(
            "INSERT INTO backup_jobs (job_id, tenant_id, status, completed_at, job_json, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (job_id) DO UPDATE SET \
                status = excluded.status, completed_at = excluded.completed_at, \
                job_json = excluded.job_json, updated_at = excluded.updated_at",
        )
        .bind(job.job_id.to_string())
        .bind(job.tenant_id.map(|t| t.to_string()))
        .bind(status_str(job.status))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;
        Ok(())
    }

    async fn find_by_id(&self, id: BackupJobId) -> Result<Option<BackupJob>, CoreError> {
        let row = sqlx::query("SELECT job_json FROM backup_jobs WHERE job_id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        row.map(|row| Self::row_to_job(&row)).transpose()
    }

    async fn find_latest_completed(&self) -> Result<Option<BackupJob>, CoreError> {
        let row = sqlx::query(
            "SELECT job_json FROM backup_jobs WHERE status = 'completed' \
             ORDER BY completed_at DESC LIMIT 1",
        )
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        row.map(|row| Self::row_to_job(&row)).transpose()
    }

    async fn find_older_than(&self, older_than: DateTime<Utc>) -> Result<Vec<BackupJob>, CoreError> {
        let rows = sqlx::query(
            "SELECT job_json FROM backup_jobs \
             WHERE status = 'completed' AND completed_at < ?",
        )
        .bind(older_than.to_rfc3339())
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CoreError::DatabaseQueryError(e.to_string()))?;

        rows.iter().map(Self::row_to_job).collect()
    }
}
