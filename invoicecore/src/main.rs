// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Process entry point: parses and validates CLI arguments through
//! `invoicecore_bootstrap`, loads [`invoicecore::config::AppConfig`], wires
//! the database pool and repositories, and dispatches to one of `serve`,
//! `validate-config`, `migrate`, or `backup`. Grounded on the teacher's
//! `main.rs` shape (resource init, then a `match` over CLI commands) but
//! without the file-processing-specific setup the teacher's binary did
//! (no resource-manager tokens, no `.adapipe` restore path) since this
//! core has no equivalent concept.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use invoicecore::backup_orchestrator::{BackupOrchestrator, NullObjectStore};
use invoicecore::config::AppConfig;
use invoicecore::customer_matching::InMemoryCustomerMatcher;
use invoicecore::db::DbPool;
use invoicecore::migration_engine::{MigrationEngine, SqlMigration};
use invoicecore::orchestrator::Orchestrator;
use invoicecore::repositories::{
    ensure_schema, SqlBackupRepository, SqlCustomerRepository, SqlMigrationRepository,
    SqlTenantRepository, SqlTransactionRepository,
};
use invoicecore::tenant_manager::TenantManager;
use invoicecore::{logging, metrics};
use invoicecore_bootstrap::cli::{ValidatedCli, ValidatedCommand};
use invoicecore_bootstrap::shutdown::ShutdownCoordinator;
use invoicecore_bootstrap::signals::install_signal_handlers;
use invoicecore_bootstrap::{bootstrap_cli, result_to_exit_code, ExitCode};
use invoicecore_domain::backup::BackupType;
use invoicecore_domain::error::CoreError;
use invoicecore_domain::value_objects::TenantId;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("invoicecore: {e}");
            return std::process::ExitCode::from(ExitCode::DataErr);
        }
    };

    result_to_exit_code(run(cli).await)
}

async fn run(cli: ValidatedCli) -> Result<(), CoreError> {
    let config = AppConfig::load(cli.config.as_deref().and_then(|p| p.to_str()))?;
    config.validate()?;
    logging::init(&config.telemetry);

    let _metrics = metrics::CoreMetrics::new();

    match cli.command {
        ValidatedCommand::ValidateConfig { config: path } => validate_config(&path),
        ValidatedCommand::Serve => serve(config).await,
        ValidatedCommand::Migrate { down, dry_run, tenant } => {
            migrate(config, down, dry_run, tenant.as_deref()).await
        }
        ValidatedCommand::Backup { kind, tenant } => backup(config, &kind, tenant.as_deref()).await,
    }
}

fn validate_config(path: &Path) -> Result<(), CoreError> {
    let config = AppConfig::load(path.to_str())?;
    config.validate()?;
    tracing::info!(path = %path.display(), "configuration is valid");
    Ok(())
}

async fn serve(config: AppConfig) -> Result<(), CoreError> {
    let db = Arc::new(DbPool::connect(&config.database).await?);
    ensure_schema(&db).await?;

    let transaction_repository = Arc::new(SqlTransactionRepository::new(db.clone()));
    let customer_repository = Arc::new(SqlCustomerRepository::new(db.clone()));
    let tenant_repository = Arc::new(SqlTenantRepository::new(db.clone()));

    let tenant_manager = TenantManager::new(tenant_repository);
    let customer_matcher = Arc::new(InMemoryCustomerMatcher::new(customer_repository));
    let _orchestrator = Orchestrator::new(transaction_repository, customer_matcher, env!("CARGO_PKG_VERSION"));
    let _tenant_manager = tenant_manager;

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(10));
    install_signal_handlers(coordinator.clone());
    let token = coordinator.token();

    tracing::info!("invoicecore core ready, awaiting connector traffic and shutdown signal");
    token.cancelled().await;
    coordinator.complete_shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn migrate(
    config: AppConfig,
    down: bool,
    dry_run: bool,
    tenant: Option<&str>,
) -> Result<(), CoreError> {
    let tenant_id = tenant.map(TenantId::from_string).transpose()?;
    let db = Arc::new(DbPool::connect(&config.database).await?);
    ensure_schema(&db).await?;
    let repository = Arc::new(SqlMigrationRepository::new(db.clone()));
    let mut engine = MigrationEngine::new(repository, db.clone());

    for unit in discover_migrations(&config.migration.path)? {
        engine.register(Arc::new(unit));
    }

    if down {
        return Err(CoreError::invalid_config(
            "migrate --down requires a specific migration id, which the CLI does not currently accept; \
             use the migration engine's rollback_migration directly for a targeted rollback",
        ));
    }

    let records = engine.run_migrations(tenant_id, None, dry_run).await?;
    tracing::info!(applied = records.len(), dry_run, "migration run complete");
    Ok(())
}

fn discover_migrations(path: &str) -> Result<Vec<SqlMigration>, CoreError> {
    let dir = Path::new(path);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| CoreError::invalid_config(format!("cannot read migrations directory {path}: {e}")))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    entries
        .into_iter()
        .map(|entry| {
            let id = entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            let content = std::fs::read_to_string(entry.path())
                .map_err(|e| CoreError::invalid_config(format!("cannot read migration {id}: {e}")))?;
            SqlMigration::from_file(&id, &content)
        })
        .collect()
}

async fn backup(config: AppConfig, kind: &str, tenant: Option<&str>) -> Result<(), CoreError> {
    let tenant_id = tenant.map(TenantId::from_string).transpose()?;
    let backup_type = match kind {
        "full" => BackupType::Full,
        "incremental" => BackupType::Incremental,
        other => return Err(CoreError::invalid_config(format!("unknown backup kind: {other}"))),
    };

    let db = Arc::new(DbPool::connect(&config.database).await?);
    ensure_schema(&db).await?;
    let repository = Arc::new(SqlBackupRepository::new(db.clone()));
    let orchestrator = BackupOrchestrator::new(db, repository, Arc::new(NullObjectStore), config.backup.clone());

    let job = orchestrator.run_backup(backup_type, tenant_id).await?;
    tracing::info!(job_id = %job.job_id, status = ?job.status, "backup job finished");

    let swept = orchestrator.sweep_retention().await?;
    tracing::info!(swept, "retention sweep complete");
    Ok(())
}
