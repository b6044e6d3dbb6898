// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parser::parse()                 │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validator::validate()           │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `parser` - CLI structure and clap parsing
//! - `validator` - Security validation layer

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

/// Validated CLI configuration.
///
/// Holds all CLI arguments after security validation: paths are
/// canonicalized (when they must already exist) and free-form strings
/// are checked against the disallowed-character set.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub workers: Option<usize>,
}

/// Validated command variants, one per [`Commands`] subcommand.
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Serve,
    ValidateConfig {
        config: PathBuf,
    },
    Migrate {
        down: bool,
        dry_run: bool,
        tenant: Option<String>,
    },
    Backup {
        kind: String,
        tenant: Option<String>,
    },
}

/// Parse and validate CLI arguments.
///
/// 1. Parse with clap.
/// 2. Validate all paths and free-form strings with [`SecureArgParser`].
/// 3. Return [`ValidatedCli`] on success.
///
/// # Errors
///
/// Returns [`ParseError`] if any validation fails.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = match &cli.config {
        Some(path) => Some(SecureArgParser::validate_path(&path.to_string_lossy())?),
        None => None,
    };

    if let Some(workers) = cli.workers {
        if workers == 0 || workers > 1024 {
            return Err(ParseError::InvalidValue {
                arg: "workers".to_string(),
                reason: "must be between 1 and 1024".to_string(),
            });
        }
    }

    let command = match cli.command {
        Commands::Serve => ValidatedCommand::Serve,
        Commands::ValidateConfig { config } => {
            let validated = SecureArgParser::validate_path(&config.to_string_lossy())?;
            ValidatedCommand::ValidateConfig { config: validated }
        }
        Commands::Migrate { down, dry_run, tenant } => {
            if let Some(ref t) = tenant {
                SecureArgParser::validate_argument(t)?;
            }
            ValidatedCommand::Migrate { down, dry_run, tenant }
        }
        Commands::Backup { kind, tenant } => {
            SecureArgParser::validate_argument(&kind)?;
            if kind != "full" && kind != "incremental" {
                return Err(ParseError::InvalidValue {
                    arg: "kind".to_string(),
                    reason: "must be 'full' or 'incremental'".to_string(),
                });
            }
            if let Some(ref t) = tenant {
                SecureArgParser::validate_argument(t)?;
            }
            ValidatedCommand::Backup { kind, tenant }
        }
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config,
        workers: cli.workers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_requires_no_extra_validation() {
        let cli = Cli {
            config: None,
            verbose: false,
            workers: None,
            command: Commands::Serve,
        };
        let validated = validate_cli(cli).expect("serve should validate");
        assert!(matches!(validated.command, ValidatedCommand::Serve));
    }

    #[test]
    fn backup_rejects_unknown_kind() {
        let cli = Cli {
            config: None,
            verbose: false,
            workers: None,
            command: Commands::Backup {
                kind: "weekly".to_string(),
                tenant: None,
            },
        };
        assert!(validate_cli(cli).is_err());
    }

    #[test]
    fn workers_out_of_range_rejected() {
        let cli = Cli {
            config: None,
            verbose: false,
            workers: Some(0),
            command: Commands::Serve,
        };
        assert!(validate_cli(cli).is_err());
    }
}
