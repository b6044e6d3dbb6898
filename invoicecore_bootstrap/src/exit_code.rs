// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Mapping
//!
//! Maps domain and CLI errors onto conventional Unix exit codes (the
//! `sysexits.h` family) so operators and process supervisors can branch
//! on `$?` without parsing log output.

use invoicecore_domain::CoreError;

use crate::cli::ParseError;

/// Unix process exit codes, loosely following `sysexits.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Successful termination
    Ok = 0,
    /// Catchall for unclassified internal errors
    Software = 70,
    /// Input data was incorrect in some way
    DataErr = 65,
    /// Required input file does not exist or is not readable
    NoInput = 66,
    /// A remote service (database, cache, connector) is unavailable
    Unavailable = 69,
    /// Temporary failure, the operation may be retried
    TempFail = 75,
    /// Configuration error
    Config = 78,
    /// Process was cancelled (graceful shutdown mid-operation)
    Interrupted = 130,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

/// Map a [`CoreError`] to its corresponding [`ExitCode`].
pub fn map_error_to_exit_code(error: &CoreError) -> ExitCode {
    match error {
        CoreError::InvalidConfiguration(_) => ExitCode::Config,
        CoreError::ConnectorError(_) => ExitCode::Unavailable,
        CoreError::TimeoutError(_) => ExitCode::TempFail,
        CoreError::DatabaseConnectionError(_) => ExitCode::Unavailable,
        CoreError::DatabaseQueryError(_) => ExitCode::Software,
        CoreError::CacheError(_) => ExitCode::TempFail,
        CoreError::CircuitOpenError(_) => ExitCode::Unavailable,
        CoreError::ServiceUnavailable(_) => ExitCode::Unavailable,
        CoreError::TenantLimitError(_) => ExitCode::DataErr,
        CoreError::RateLimitedError(_) => ExitCode::TempFail,
        CoreError::MigrationError(_) => ExitCode::Software,
        CoreError::SerializationError(_) => ExitCode::DataErr,
        CoreError::NotFound(_) => ExitCode::NoInput,
        CoreError::Cancelled(_) => ExitCode::Interrupted,
        CoreError::InternalError(_) => ExitCode::Software,
    }
}

/// Map a CLI [`ParseError`] to its corresponding [`ExitCode`].
pub fn map_parse_error_to_exit_code(error: &ParseError) -> ExitCode {
    match error {
        ParseError::PathNotFound(_) => ExitCode::NoInput,
        _ => ExitCode::DataErr,
    }
}

/// Convert a `Result<(), CoreError>` into a process exit code, logging the
/// error (if any) before returning.
pub fn result_to_exit_code(result: Result<(), CoreError>) -> std::process::ExitCode {
    match result {
        Ok(()) => std::process::ExitCode::from(ExitCode::Ok),
        Err(e) => {
            tracing::error!("application exited with error: {e}");
            std::process::ExitCode::from(map_error_to_exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_config_exit_code() {
        let err = CoreError::invalid_config("missing field");
        assert_eq!(map_error_to_exit_code(&err), ExitCode::Config);
    }

    #[test]
    fn tenant_limit_maps_to_data_err() {
        let err = CoreError::TenantLimitError("monthly ceiling exceeded".to_string());
        assert_eq!(map_error_to_exit_code(&err), ExitCode::DataErr);
    }

    #[test]
    fn cancelled_maps_to_interrupted() {
        let err = CoreError::Cancelled("shutdown".to_string());
        assert_eq!(map_error_to_exit_code(&err), ExitCode::Interrupted);
    }

    #[test]
    fn result_ok_does_not_panic() {
        // std::process::ExitCode has no PartialEq; just verify the mapping
        // doesn't panic and returns without logging an error.
        let _code = result_to_exit_code(Ok(()));
    }
}
