//! Lenient cell parsing and fixed formatting for station data.
//!
//! None of these functions fail: anything that cannot be interpreted becomes
//! `None` and is later written as an empty cell.

use chrono::NaiveDate;

/// Parse an integer cell, accepting float-typed integers such as `"123.0"`.
///
/// Fractional values are truncated toward zero.
///
/// # Examples
/// ```
/// use ghcn_harvester::utils::parse_lenient_int;
///
/// assert_eq!(parse_lenient_int(" -56 "), Some(-56));
/// assert_eq!(parse_lenient_int("123.0"), Some(123));
/// assert_eq!(parse_lenient_int("T"), None);
/// ```
pub fn parse_lenient_int(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    if let Ok(value) = cell.parse::<i64>() {
        return Some(value);
    }

    let value = cell.parse::<f64>().ok()?;
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(value.trunc() as i64)
}

pub fn parse_coordinate(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a year from the first four digits of a cell, so `2020` and `20201231` both give 2020.
pub fn parse_year(cell: &str) -> Option<i32> {
    let cell = cell.trim();
    let prefix = cell.get(..4)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// Read a full calendar date from `20201231` or `2020-12-31`; a bare year gives `None`.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    NaiveDate::parse_from_str(cell, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(cell, "%Y-%m-%d"))
        .ok()
}

/// Format a value given in tenths with exactly one fractional digit (`-56` -> `-5.6`).
pub fn format_tenths(tenths: i64) -> String {
    let sign = if tenths < 0 { "-" } else { "" };
    let magnitude = tenths.unsigned_abs();
    format!("{}{}.{}", sign, magnitude / 10, magnitude % 10)
}

/// Format with `precision` significant digits using general (`%g`) rules:
/// trailing zeros are dropped and scientific notation is used for very
/// large or very small magnitudes.
pub fn format_significant(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => return scientific,
    };

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
