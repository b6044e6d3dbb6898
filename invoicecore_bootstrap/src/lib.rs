// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application layers
//! (domain, application, infrastructure) and provides:
//!
//! - **Entry point** - Application lifecycle management
//! - **Platform abstraction** - OS-specific operations (POSIX vs Windows)
//! - **Signal handling** - Graceful shutdown (SIGTERM, SIGINT, SIGHUP)
//! - **Argument parsing** - Secure CLI argument validation
//! - **Configuration loading** - File + environment configuration
//! - **Error handling** - Unix exit code mapping
//! - **Async coordination** - Shutdown coordination and cancellation
//!
//! ## Architecture Position
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          BOOTSTRAP (This Module)            │
//! │  - Entry Point                              │
//! │  - Platform Abstraction                     │
//! │  - Signal Handling                          │
//! │  - Secure Arg Parsing                       │
//! │  - Configuration Loading                    │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │         APPLICATION LAYER                   │
//! │  - Stage executors, orchestrator            │
//! │  - Connector adapters, matching engine      │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │           DOMAIN LAYER                      │
//! │  - Business Logic                           │
//! │  - Domain Services                          │
//! │  - Entities & Value Objects                 │
//! └─────────────────────────────────────────────┘
//!                      ▲
//!                      │
//! ┌─────────────────────────────────────────────┐
//! │       INFRASTRUCTURE LAYER                  │
//! │  - Repositories                             │
//! │  - Cache, database, external services       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Key Design Principles
//!
//! 1. **Separation from Enterprise Layers**
//!    - Bootstrap can access all layers
//!    - Enterprise layers cannot access bootstrap
//!    - Clear architectural boundary
//!
//! 2. **Platform Abstraction**
//!    - Abstract OS-specific functionality behind traits
//!    - POSIX implementation for Linux/macOS
//!    - Windows implementation with cross-platform stubs
//!    - Compile-time platform selection
//!
//! 3. **Graceful Shutdown**
//!    - Signal handlers (SIGTERM, SIGINT, SIGHUP)
//!    - Cancellation token propagation
//!    - Grace period with timeout enforcement
//!
//! 4. **Security First**
//!    - Input validation for all arguments
//!    - Path traversal prevention
//!    - Privilege checking
//!
//! 5. **Testability**
//!    - All components behind traits
//!    - No-op implementations for testing
//!
//! ## Module Structure
//!
//! - `platform` - OS abstraction (Unix/Windows)
//! - `signals` - Signal handling (SIGTERM, SIGINT, SIGHUP)
//! - `cli` - Secure argument parsing
//! - `config` - Bootstrap configuration loading
//! - `exit_code` - Unix exit code enumeration
//! - `logger` - Bootstrap-specific logging
//! - `shutdown` - Shutdown coordination

pub mod cli;
pub mod config;
pub mod exit_code;
pub mod logger;
pub mod platform;
pub mod shutdown;
pub mod signals;

pub use cli::{parse_and_validate, ValidatedCli, ValidatedCommand};
pub use config::BootstrapConfig;
pub use exit_code::{map_error_to_exit_code, result_to_exit_code, ExitCode};

/// Bootstrap and parse CLI arguments.
///
/// This is the main entry point for the bootstrap layer. It handles:
/// 1. CLI parsing with clap
/// 2. Security validation
/// 3. Returns validated configuration
///
/// The caller is responsible for:
/// - Loading [`BootstrapConfig`] using the validated `config` path
/// - Running the application logic
/// - Mapping results to exit codes using [`result_to_exit_code`]
///
/// # Errors
///
/// Returns `cli::ParseError` if CLI parsing or validation fails.
/// Clap will handle `--help` and `--version` automatically and exit the
/// process.
///
/// # Example
///
/// ```no_run
/// use invoicecore_bootstrap::{bootstrap_cli, result_to_exit_code};
///
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     let validated_cli = match bootstrap_cli() {
///         Ok(cli) => cli,
///         Err(e) => {
///             eprintln!("CLI Error: {}", e);
///             return std::process::ExitCode::from(65); // EX_DATAERR
///         }
///     };
///
///     let result = run_application(validated_cli).await;
///     result_to_exit_code(result)
/// }
///
/// async fn run_application(
///     cli: invoicecore_bootstrap::ValidatedCli,
/// ) -> Result<(), invoicecore_domain::CoreError> {
///     let _ = cli;
///     Ok(())
/// }
/// ```
pub fn bootstrap_cli() -> Result<ValidatedCli, cli::ParseError> {
    cli::parse_and_validate()
}
