// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # invoicecore
//!
//! Application and infrastructure layer for the e-invoicing processing
//! core: connector adapters (C6), stage executors (C4), the processor
//! orchestrator (C5), customer matching (C7), tenant management (C8),
//! the two-level cache (C9), the database abstraction (C10), the
//! migration engine (C11), and the backup orchestrator (C12).
//!
//! Everything here implements a port declared in `invoicecore_domain`
//! against real infrastructure (`sqlx`, `redis`, `tokio`, the filesystem).
//! The domain crate stays pure; this crate is where I/O happens.
//!
//! ## Module structure
//!
//! - [`connectors`] — vendor adapters (C6): ERP, POS, CRM, e-commerce,
//!   accounting, banking.
//! - [`stages`] — the seven stage executors (C4).
//! - [`orchestrator`] — the per-transaction and batch driver (C5).
//! - [`customer_matching`] — the cross-connector identity resolution
//!   engine (C7).
//! - [`tenant_manager`] — tenant config cache, scoped context, rate
//!   limiting, and quota enforcement (C8).
//! - [`cache`] — L1 LRU + L2 remote store with circuit breaker (C9).
//! - [`db`] — engine-neutral session/transaction abstraction (C10).
//! - [`migration_engine`] — schema migration discovery and execution
//!   (C11).
//! - [`backup_orchestrator`] — scheduled backup jobs (C12).
//! - [`repositories`] — `sqlx`-backed implementations of the domain's
//!   repository ports.
//! - [`config`] / [`logging`] / [`metrics`] — the ambient stack:
//!   configuration surface, structured logging, and Prometheus metrics.

pub mod backup_orchestrator;
pub mod cache;
pub mod config;
pub mod connectors;
pub mod customer_matching;
pub mod db;
pub mod logging;
pub mod metrics;
pub mod migration_engine;
pub mod orchestrator;
pub mod repositories;
pub mod stages;
pub mod tenant_manager;
