// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Structure
//!
//! The command-line surface is intentionally thin: the processing core
//! is designed to run as a long-lived service wired up by this
//! bootstrap layer, with the migration and backup subsystems exposed
//! as operator commands. Wire protocols, tenant onboarding, and
//! connector configuration all live behind the config file, not flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// invoicecore - multi-tenant e-invoicing processing core
#[derive(Parser, Debug)]
#[command(name = "invoicecore", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (TOML/YAML/JSON via `config`)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Maximum number of worker tasks for the processing pipeline
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the processing service (connector polling + pipeline + API wiring)
    Serve,

    /// Validate a configuration file without starting the service
    ValidateConfig {
        /// Path to the configuration file to validate
        config: PathBuf,
    },

    /// Run pending schema migrations
    Migrate {
        /// Roll back instead of applying
        #[arg(long)]
        down: bool,

        /// Only print the migration plan, do not execute
        #[arg(long)]
        dry_run: bool,

        /// Restrict migration to a single tenant (tenant-scoped units only)
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Run a one-off backup job outside the scheduled cadence
    Backup {
        /// "full" or "incremental"
        #[arg(long, default_value = "incremental")]
        kind: String,

        /// Restrict the backup to a single tenant
        #[arg(long)]
        tenant: Option<String>,
    },
}

/// Parse CLI arguments using clap, exiting the process on `--help`/`--version`
/// or on unrecoverable parse errors (clap's own behavior).
pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::parse_from(["invoicecore", "serve"]);
        assert!(matches!(cli.command, Commands::Serve));
    }

    #[test]
    fn parses_migrate_with_flags() {
        let cli = Cli::parse_from(["invoicecore", "migrate", "--dry-run", "--tenant", "acme"]);
        match cli.command {
            Commands::Migrate { down, dry_run, tenant } => {
                assert!(!down);
                assert!(dry_run);
                assert_eq!(tenant.as_deref(), Some("acme"));
            }
            other => panic!("expected Migrate, got {other:?}"),
        }
    }
}
