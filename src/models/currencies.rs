// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::utils::parse_load_timestamp;

/// One row of `stg_currencies`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyRecord {
    pub source_ident_nbr: Option<i64>,
    pub currency_code: String,
    pub currency_name: Option<String>,
    pub numeric_code: Option<String>,
    pub precision: Option<i64>,
    pub subunit: Option<i64>,
    pub symbol: Option<String>,
    pub symbol_first: Option<bool>,
    pub decimal_mark: Option<String>,
    pub thousands_separator: Option<String>,
    pub load_timestamp: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for CurrencyRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let raw_timestamp: String = row.try_get("load_timestamp")?;
        let load_timestamp =
            parse_load_timestamp(&raw_timestamp).map_err(|e| sqlx::Error::ColumnDecode {
                index: "load_timestamp".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            source_ident_nbr: row.try_get("source_ident_nbr")?,
            currency_code: row.try_get("currency_code")?,
            currency_name: row.try_get("currency_name")?,
            numeric_code: row.try_get("numeric_code")?,
            precision: row.try_get("precision")?,
            subunit: row.try_get("subunit")?,
            symbol: row.try_get("symbol")?,
            symbol_first: row.try_get("symbol_first")?,
            decimal_mark: row.try_get("decimal_mark")?,
            thousands_separator: row.try_get("thousands_separator")?,
            load_timestamp,
        })
    }
}
