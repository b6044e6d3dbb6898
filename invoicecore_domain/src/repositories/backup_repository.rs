// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for `backup_jobs` (C12).

use crate::backup::BackupJob;
use crate::error::CoreError;
use crate::value_objects::BackupJobId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait BackupRepository: Send + Sync {
    async fn save(&self, job: &BackupJob) -> Result<(), CoreError>;

    async fn find_by_id(&self, id: BackupJobId) -> Result<Option<BackupJob>, CoreError>;

    /// The most recent completed full or incremental job, used to compute
    /// the `updated_at` checkpoint for the next incremental backup (§4.9).
    async fn find_latest_completed(&self) -> Result<Option<BackupJob>, CoreError>;

    /// Jobs whose completion predates `older_than`, for the retention sweep.
    async fn find_older_than(&self, older_than: DateTime<Utc>) -> Result<Vec<BackupJob>, CoreError>;
}
