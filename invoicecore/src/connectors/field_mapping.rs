// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Shared field-mapping helpers for the connector adapters (§4.1). Grounded
//! on `erp_connector_adapter.py`/`pos_connector_adapter.py`/
//! `crm_connector_adapter.py`'s repeated `a.get(x) or a.get(y) or ...`
//! priority chains, expressed as a single probing function instead of
//! duplicating the chain seven times per adapter.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use invoicecore_domain::value_objects::Currency;

/// Walks a dotted path (`"total_money.amount"`) into a JSON value, used so
/// a priority chain can probe nested vendor fields without a bespoke match
/// arm per connector.
fn dig<'a>(native: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(native, |v, segment| v.get(segment))
}

/// Returns the first non-null string found at any of `paths`, in order —
/// the Rust shape of the Python adapters' `a.get(x) or a.get(y)` chains.
pub fn probe_str(native: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| {
        dig(native, p).and_then(|v| v.as_str()).map(str::to_string)
    })
}

/// Returns the first present value at any of `paths`, converting minor
/// units to major units on a `/100.0` when the field name ends in
/// `_money.amount` or similar integer-cents field (§4.1: "connectors that
/// report amounts in minor units must be converted before reaching the
/// pipeline" — mirrors Square's `total_money.amount` being integer cents
/// in `pos_connector_adapter.py`).
pub fn probe_amount(native: &Value, paths: &[(&str, bool)]) -> Decimal {
    for (path, is_minor_units) in paths {
        if let Some(value) = dig(native, path) {
            let amount = if let Some(n) = value.as_f64() {
                Decimal::from_f64_retain(n).unwrap_or(Decimal::ZERO)
            } else if let Some(s) = value.as_str() {
                s.parse().unwrap_or(Decimal::ZERO)
            } else {
                continue;
            };
            return if *is_minor_units {
                (amount / Decimal::ONE_HUNDRED).round_dp(2)
            } else {
                amount.round_dp(2)
            };
        }
    }
    Decimal::ZERO
}

/// Parses an ISO-8601 timestamp at any of `paths`, falling back to `now`
/// and signalling the fallback through the returned `bool` so the caller
/// can append a processing note (§4.1: "unparseable or absent timestamps
/// default to ingestion time with a processing note").
pub fn probe_timestamp(native: &Value, paths: &[&str], now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    for path in paths {
        if let Some(raw) = dig(native, path).and_then(|v| v.as_str()) {
            let normalized = raw.replace('Z', "+00:00");
            if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
                return (parsed.with_timezone(&Utc), false);
            }
        }
    }
    (now, true)
}

/// Currency at any of `paths`, defaulting to NGN (§3: "absent currency
/// defaults to the tenant's settlement currency, NGN unless configured
/// otherwise").
pub fn probe_currency(native: &Value, paths: &[&str]) -> Currency {
    probe_str(native, paths)
        .and_then(|code| Currency::new(code).ok())
        .unwrap_or_else(Currency::ngn)
}

/// The `"<kind> <identifier>"` description fallback used by every adapter
/// when no vendor description field is present (§4.1).
pub fn fallback_description(kind_label: &str, identifier: &str) -> String {
    format!("{kind_label} {identifier}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_str_follows_priority_order() {
        let native = serde_json::json!({"b": "second", "c": "third"});
        assert_eq!(probe_str(&native, &["a", "b", "c"]), Some("second".to_string()));
    }

    #[test]
    fn probe_str_digs_into_nested_paths() {
        let native = serde_json::json!({"device": {"id": "TERM-1"}});
        assert_eq!(probe_str(&native, &["terminal_id", "device.id"]), Some("TERM-1".to_string()));
    }

    #[test]
    fn probe_amount_converts_minor_units() {
        let native = serde_json::json!({"total_money": {"amount": 150000}});
        assert_eq!(
            probe_amount(&native, &[("total_money.amount", true)]),
            Decimal::new(1500, 0)
        );
    }

    #[test]
    fn probe_timestamp_falls_back_to_now_and_flags_it() {
        let native = serde_json::json!({});
        let now = Utc::now();
        let (ts, fell_back) = probe_timestamp(&native, &["invoice_date"], now);
        assert_eq!(ts, now);
        assert!(fell_back);
    }

    #[test]
    fn probe_timestamp_parses_zulu_suffix() {
        let native = serde_json::json!({"invoice_date": "2024-06-01T10:00:00Z"});
        let (ts, fell_back) = probe_timestamp(&native, &["invoice_date"], Utc::now());
        assert!(!fell_back);
        assert_eq!(ts.to_rfc3339(), "2024-06-01T10:00:00+00:00");
    }
}
