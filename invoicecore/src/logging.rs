// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Structured logging initialization, grounded on the teacher's
//! `infrastructure/logging.rs` intent (structured, leveled, low-overhead)
//! but implemented against `tracing-subscriber` rather than left as
//! doc-only filler.

use crate::config::TelemetryConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber. Idempotent-enough for
/// tests: repeated calls after the first are a silent no-op (`set_global_default`
/// only succeeds once per process).
pub fn init(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Truncates a SQL statement to a safe log prefix for slow-query telemetry
/// (§4.7: "logged with a truncated SQL prefix and elapsed time").
pub fn truncate_sql(sql: &str, max_len: usize) -> String {
    if sql.len() <= max_len {
        sql.to_string()
    } else {
        format!("{}…", &sql[..max_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_statements() {
        let sql = "SELECT * FROM processed_transactions WHERE tenant_id = $1 AND updated_at > $2";
        let truncated = truncate_sql(sql, 20);
        assert_eq!(truncated.chars().count(), 21);
    }

    #[test]
    fn leaves_short_statements_untouched() {
        assert_eq!(truncate_sql("SELECT 1", 20), "SELECT 1");
    }
}
