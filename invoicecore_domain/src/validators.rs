// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Stateless format validators shared by the business-rules stage (§4.3.4)
//! and the customer-matching normalizers (§4.4). Pure functions — domain
//! services with no entity or value-object home of their own.

use regex::Regex;
use std::sync::OnceLock;

fn invoice_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]*-?\d{4}[-/]?\d{3,6}$").unwrap())
}

/// ERP invoice numbering rule (§4.3.4): `^[A-Z]*-?\d{4}[-/]?\d{3,6}$`.
pub fn is_valid_invoice_number(value: &str) -> bool {
    invoice_number_pattern().is_match(value)
}

/// Nigerian bank account numbers are exactly 10 digits (§4.3.1, §4.3.4).
pub fn is_valid_nigerian_account_number(value: &str) -> bool {
    value.len() == 10 && value.chars().all(|c| c.is_ascii_digit())
}

/// TIN format: 10-digit `XXXXXXXXXX` or 14-digit `XXXXXXXXXX-XXXX` (§4.4).
pub fn is_valid_tin_format(value: &str) -> bool {
    let digits_only: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits_only.len() {
        10 => !value.contains('-'),
        14 => value.contains('-'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_number_accepts_documented_shapes() {
        assert!(is_valid_invoice_number("INV-2024-001"));
        assert!(is_valid_invoice_number("2024001"));
        assert!(!is_valid_invoice_number("bad"));
    }

    #[test]
    fn account_number_requires_exactly_ten_digits() {
        assert!(is_valid_nigerian_account_number("1234567890"));
        assert!(!is_valid_nigerian_account_number("123456789"));
        assert!(!is_valid_nigerian_account_number("12345678901"));
        assert!(!is_valid_nigerian_account_number("12345abcde"));
    }

    #[test]
    fn tin_accepts_ten_or_fourteen_digit_forms() {
        assert!(is_valid_tin_format("1234567890"));
        assert!(is_valid_tin_format("12345678901234"));
        assert!(!is_valid_tin_format("123"));
    }
}
