// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Pure mapping from API-shaped JSON to staging rows.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{CurrencyRecord, ExchangeRateRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedCurrencies {
    pub records: Vec<CurrencyRecord>,
    /// Source records without a usable `short_code`, or repeating one.
    pub dropped: usize,
}

impl ProjectedCurrencies {
    /// Codes of the projected records, in load order.
    pub fn codes(&self) -> Vec<String> {
        self.records.iter().map(|r| r.currency_code.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRates {
    pub records: Vec<ExchangeRateRecord>,
    /// Entries with a present but unusable value (non-numeric or not positive).
    pub skipped: usize,
}

/// Map raw currency objects onto `stg_currencies` rows stamped with `at`.
pub fn project_currencies(raw: &[Value], at: DateTime<Utc>) -> ProjectedCurrencies {
    let mut records = Vec::with_capacity(raw.len());
    let mut seen = HashSet::new();
    let mut dropped = 0;

    for item in raw {
        let Some(fields) = item.as_object() else {
            dropped += 1;
            continue;
        };
        let Some(code) = text(fields, "short_code").filter(|c| !c.is_empty()) else {
            tracing::debug!(id = ?fields.get("id"), "dropping currency without short_code");
            dropped += 1;
            continue;
        };
        if !seen.insert(code.clone()) {
            tracing::debug!(currency_code = %code, "dropping repeated currency code");
            dropped += 1;
            continue;
        }

        records.push(CurrencyRecord {
            source_ident_nbr: integer(fields, "id"),
            currency_code: code,
            currency_name: text(fields, "name"),
            numeric_code: numeric_code(fields),
            precision: integer(fields, "precision"),
            subunit: integer(fields, "subunit"),
            symbol: text(fields, "symbol"),
            symbol_first: fields.get("symbol_first").and_then(Value::as_bool),
            decimal_mark: text(fields, "decimal_mark"),
            thousands_separator: text(fields, "thousands_separator"),
            load_timestamp: at,
        });
    }

    ProjectedCurrencies { records, dropped }
}

/// Flatten a `{base, rates: {code: rate}}` payload into one row per pair,
/// in the key order of the `rates` map.
///
/// Null rates are skipped. A payload without `base` is malformed; a payload
/// without `rates` yields no rows.
pub fn project_rates(raw: &Value, at: DateTime<Utc>) -> Result<ProjectedRates> {
    let fields = raw
        .as_object()
        .ok_or_else(|| Error::MalformedResponse("rates payload is not a JSON object".into()))?;
    let base = match fields.get("base") {
        Some(Value::String(base)) if !base.is_empty() => base.clone(),
        Some(other) => {
            return Err(Error::MalformedResponse(format!(
                "rates payload has an invalid base: {other}"
            )))
        }
        None => return Err(Error::MalformedResponse("rates payload has no base".into())),
    };

    let empty = Map::new();
    let rates = match fields.get("rates") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(rates)) => rates,
        Some(_) => {
            return Err(Error::MalformedResponse(
                "rates payload field `rates` is not an object".into(),
            ))
        }
    };

    let mut records = Vec::with_capacity(rates.len());
    let mut skipped = 0;
    for (currency, value) in rates {
        match value {
            Value::Null => continue,
            Value::Number(n) => match n.as_f64() {
                Some(rate) if rate.is_finite() && rate > 0.0 => {
                    records.push(ExchangeRateRecord {
                        load_timestamp: at,
                        base: base.clone(),
                        currency: currency.clone(),
                        rate,
                    });
                }
                _ => {
                    tracing::debug!(%currency, %value, "skipping non-positive rate");
                    skipped += 1;
                }
            },
            _ => {
                tracing::debug!(%currency, %value, "skipping non-numeric rate");
                skipped += 1;
            }
        }
    }

    Ok(ProjectedRates { records, skipped })
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn integer(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    fields.get(key).and_then(Value::as_i64)
}

// ISO 4217 numeric codes keep their leading zeros, so they are staged as text.
fn numeric_code(fields: &Map<String, Value>) -> Option<String> {
    match fields.get("code")? {
        Value::String(code) => Some(code.clone()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}
