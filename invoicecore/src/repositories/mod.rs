// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `sqlx`-backed implementations of the domain's repository ports,
//! grounded on the teacher's generic SQLite repository
//! (`infrastructure/repositories/sqlite_repository.rs`): entities are
//! stored as a handful of indexed columns plus a JSON payload column,
//! matching the logical schemas of spec.md §6.

pub mod backup_repository;
pub mod customer_repository;
pub mod migration_repository;
pub mod schema;
pub mod tenant_repository;
pub mod transaction_repository;

pub use backup_repository::SqlBackupRepository;
pub use customer_repository::SqlCustomerRepository;
pub use migration_repository::SqlMigrationRepository;
pub use schema::ensure_schema;
pub use tenant_repository::SqlTenantRepository;
pub use transaction_repository::SqlTransactionRepository;
