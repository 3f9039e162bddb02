// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

const UA: &str = concat!(
    "fintrack/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/fintrack)"
);

pub fn http_client() -> Result<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent(UA)
        .build()?;
    Ok(c)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_month(s: &str) -> Result<String> {
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", s))?;
    Ok(s.to_string())
}

/// Parse a decimal amount string ("12.34", "-7") into signed integer
/// minor units. The ledger never stores floating point; the decimal
/// form exists only at the CLI boundary.
pub fn parse_amount_minor(s: &str) -> Result<i64> {
    let d = s
        .parse::<Decimal>()
        .with_context(|| format!("Invalid amount '{}'", s))?;
    let minor = d * Decimal::from(100);
    if minor.fract() != Decimal::ZERO {
        anyhow::bail!("Amount '{}' has more than two decimal places", s);
    }
    minor
        .to_i64()
        .with_context(|| format!("Amount '{}' out of range", s))
}

/// Render minor units back as a two-decimal string for display.
pub fn fmt_minor(minor: i64) -> String {
    format!("{:.2}", Decimal::new(minor, 2))
}

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Z]{3}$").expect("static regex"));

pub fn normalize_currency(s: &str) -> Result<String> {
    let ccy = s.trim().to_uppercase();
    if !CURRENCY_RE.is_match(&ccy) {
        anyhow::bail!("Invalid currency code '{}', expected 3 letters", s);
    }
    Ok(ccy)
}

pub fn currency_ok(s: &str) -> bool {
    CURRENCY_RE.is_match(s)
}

pub fn get_base_currency(conn: &Connection) -> Result<String> {
    Ok(crate::db::get_setting(conn, "base_currency")?.unwrap_or_else(|| "USD".to_string()))
}

pub fn set_base_currency(conn: &Connection, ccy: &str) -> Result<()> {
    let ccy = normalize_currency(ccy)?;
    crate::db::set_setting(conn, "base_currency", &ccy)?;
    Ok(())
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_roundtrip() {
        assert_eq!(parse_amount_minor("12.34").unwrap(), 1234);
        assert_eq!(parse_amount_minor("-7").unwrap(), -700);
        assert_eq!(parse_amount_minor("0").unwrap(), 0);
        assert_eq!(fmt_minor(-2500), "-25.00");
        assert_eq!(fmt_minor(5), "0.05");
    }

    #[test]
    fn amount_rejects_sub_cent() {
        assert!(parse_amount_minor("1.005").is_err());
        assert!(parse_amount_minor("abc").is_err());
    }

    #[test]
    fn currency_codes() {
        assert_eq!(normalize_currency(" usd ").unwrap(), "USD");
        assert!(normalize_currency("US").is_err());
        assert!(normalize_currency("DOLLARS").is_err());
    }
}
