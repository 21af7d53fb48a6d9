// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::utils::parse_load_timestamp;

/// One (base, target) pair of `stg_exchange_rates`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateRecord {
    pub load_timestamp: DateTime<Utc>,
    pub base: String,
    pub currency: String,
    pub rate: f64,
}

impl<'r> FromRow<'r, SqliteRow> for ExchangeRateRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let raw_timestamp: String = row.try_get("load_timestamp")?;
        let load_timestamp =
            parse_load_timestamp(&raw_timestamp).map_err(|e| sqlx::Error::ColumnDecode {
                index: "load_timestamp".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            load_timestamp,
            base: row.try_get("base")?,
            currency: row.try_get("currency")?,
            rate: row.try_get("rate")?,
        })
    }
}
