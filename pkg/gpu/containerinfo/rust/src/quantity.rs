// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Kubernetes resource quantity parsing.
//!
//! Quantities are held as signed nano-units so that `100m`, `0.1` and `1e-1`
//! compare equal without floating point.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Parses a quantity into nano-units, rounding up sub-nano fractions.
/// Returns `None` for anything outside the quantity grammar.
pub fn nanos(quantity: &Quantity) -> Option<i128> {
    parse_nanos(quantity.0.trim())
}

/// Whole-unit value of a quantity, rounded up like `Quantity.Value()`.
pub fn value(quantity: &Quantity) -> Option<i64> {
    let n = nanos(quantity)?;
    let units = ceil_div(n, NANOS_PER_UNIT);
    i64::try_from(units).ok()
}

fn parse_nanos(s: &str) -> Option<i128> {
    let (negative, s) = match (s.strip_prefix('-'), s.strip_prefix('+')) {
        (Some(rest), _) => (true, rest),
        (None, Some(rest)) => (false, rest),
        (None, None) => (false, s),
    };

    let number_len = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(number_len);
    if number.is_empty() || number == "." {
        return None;
    }

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.contains('.') {
        return None;
    }
    let digits = format!("{whole}{fraction}");
    let mantissa: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse().ok()?
    };

    let (multiplier, exponent) = suffix_scale(suffix)?;
    let shift = exponent.checked_sub(i32::try_from(fraction.len()).ok()?)?;

    let scaled = mantissa.checked_mul(multiplier)?;
    let magnitude = if shift >= 0 {
        scaled.checked_mul(10_i128.checked_pow(shift.unsigned_abs())?)?
    } else {
        ceil_div(scaled, 10_i128.checked_pow(shift.unsigned_abs())?)
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// Returns the nano-unit multiplier and decimal exponent for a suffix.
fn suffix_scale(suffix: &str) -> Option<(i128, i32)> {
    const BINARY: [(&str, u32); 6] = [
        ("Ki", 10),
        ("Mi", 20),
        ("Gi", 30),
        ("Ti", 40),
        ("Pi", 50),
        ("Ei", 60),
    ];

    if let Some((_, bits)) = BINARY.iter().find(|(s, _)| *s == suffix) {
        return Some((NANOS_PER_UNIT << bits, 0));
    }

    let exponent = match suffix {
        "n" => -9,
        "u" => -6,
        "m" => -3,
        "" => 0,
        "k" => 3,
        "M" => 6,
        "G" => 9,
        "T" => 12,
        "P" => 15,
        "E" => 18,
        _ => {
            let exp = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            exp.parse::<i32>().ok()?
        }
    };
    Some((NANOS_PER_UNIT, exponent))
}

fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d > 0 { q + 1 } else { q }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn test_plain_integers() {
        assert_eq!(value(&q("1")), Some(1));
        assert_eq!(value(&q("0")), Some(0));
        assert_eq!(value(&q("8")), Some(8));
    }

    #[test]
    fn test_decimal_forms_compare_equal() {
        assert_eq!(nanos(&q("100m")), nanos(&q("0.1")));
        assert_eq!(nanos(&q("1e3")), nanos(&q("1k")));
        assert_eq!(nanos(&q("1Gi")), nanos(&q("1073741824")));
        assert_eq!(nanos(&q("1.5Gi")), nanos(&q("1536Mi")));
    }

    #[test]
    fn test_value_rounds_up() {
        assert_eq!(value(&q("500m")), Some(1));
        assert_eq!(value(&q("1001m")), Some(2));
        assert_eq!(value(&q("-500m")), Some(0));
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["", "abc", "1.2.3", "1Qi", ".", "1e", "1.5e-2147483648"] {
            assert_eq!(nanos(&q(bad)), None, "{bad:?}");
        }
    }
}
