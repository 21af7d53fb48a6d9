// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Staging tables: layout, reset policy and bulk ingestion.
//!
//! `stg_currencies` and `stg_exchange_rates` are the contract with the
//! downstream transformation job. Their column sets are fixed; changing them
//! needs a matching downstream migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnection, SqlitePool},
    QueryBuilder, Sqlite,
};
use std::fmt;
use std::str::FromStr;

use crate::db;
use crate::error::{Error, Result};
use crate::models::{CurrencyRecord, ExchangeRateRecord};
use crate::utils::{format_load_timestamp, parse_load_timestamp};

// 11 binds per currency row stays well under SQLite's variable limit.
const INSERT_CHUNK_ROWS: usize = 500;

const TABLE_COLUMNS_SQL: &str = "SELECT name, type FROM pragma_table_info(?) ORDER BY cid";

/// What `reset` does to the existing staging tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Drop and rebuild both tables. Loses any history.
    DropRecreate,
    /// Keep the tables, delete their rows. The layout must already match.
    TruncateExisting,
    /// Keep tables and rows; each run appends a generation.
    CreateIfMissing,
}

impl ResetPolicy {
    /// Whether retrying a failed write after a fresh `reset` cannot duplicate rows.
    pub fn is_full_replace(self) -> bool {
        !matches!(self, ResetPolicy::CreateIfMissing)
    }
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResetPolicy::DropRecreate => "drop_recreate",
            ResetPolicy::TruncateExisting => "truncate_existing",
            ResetPolicy::CreateIfMissing => "create_if_missing",
        })
    }
}

impl FromStr for ResetPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drop_recreate" => Ok(ResetPolicy::DropRecreate),
            "truncate_existing" => Ok(ResetPolicy::TruncateExisting),
            "create_if_missing" => Ok(ResetPolicy::CreateIfMissing),
            other => Err(format!(
                "unknown reset policy `{other}` (expected drop_recreate, truncate_existing or create_if_missing)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingTable {
    Currencies,
    ExchangeRates,
}

impl StagingTable {
    pub const ALL: [StagingTable; 2] = [StagingTable::Currencies, StagingTable::ExchangeRates];

    pub fn name(self) -> &'static str {
        match self {
            StagingTable::Currencies => "stg_currencies",
            StagingTable::ExchangeRates => "stg_exchange_rates",
        }
    }

    /// Column names and declared types, in table order.
    pub fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            StagingTable::Currencies => &[
                ("source_ident_nbr", "INTEGER"),
                ("currency_code", "TEXT"),
                ("currency_name", "TEXT"),
                ("numeric_code", "TEXT"),
                ("precision", "INTEGER"),
                ("subunit", "INTEGER"),
                ("symbol", "TEXT"),
                ("symbol_first", "BOOLEAN"),
                ("decimal_mark", "TEXT"),
                ("thousands_separator", "TEXT"),
                ("load_timestamp", "TEXT"),
            ],
            StagingTable::ExchangeRates => &[
                ("load_timestamp", "TEXT"),
                ("base", "TEXT"),
                ("currency", "TEXT"),
                ("rate", "REAL"),
            ],
        }
    }

    fn create_sql(self) -> &'static str {
        match self {
            StagingTable::Currencies => {
                r#"
                CREATE TABLE IF NOT EXISTS stg_currencies (
                    source_ident_nbr INTEGER,
                    currency_code TEXT NOT NULL,
                    currency_name TEXT,
                    numeric_code TEXT,
                    "precision" INTEGER,
                    subunit INTEGER,
                    symbol TEXT,
                    symbol_first BOOLEAN,
                    decimal_mark TEXT,
                    thousands_separator TEXT,
                    load_timestamp TEXT NOT NULL,
                    UNIQUE (load_timestamp, currency_code)
                )
                "#
            }
            StagingTable::ExchangeRates => {
                r#"
                CREATE TABLE IF NOT EXISTS stg_exchange_rates (
                    load_timestamp TEXT NOT NULL,
                    base TEXT NOT NULL,
                    currency TEXT NOT NULL,
                    rate REAL NOT NULL CHECK (rate > 0),
                    UNIQUE (load_timestamp, currency)
                )
                "#
            }
        }
    }

    /// The fixed layout rendered as `name TYPE, ...`.
    fn expected_layout(self) -> String {
        describe(self.columns())
    }

    fn matches_layout(self, found: &[(String, String)]) -> bool {
        let expected = self.columns();
        found.len() == expected.len()
            && found
                .iter()
                .zip(expected)
                .all(|((name, ty), (want_name, want_ty))| {
                    name == want_name && ty.eq_ignore_ascii_case(want_ty)
                })
    }
}

impl fmt::Display for StagingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rows sharing one load timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub load_timestamp: DateTime<Utc>,
    pub rows: i64,
}

/// The staging tables in one SQLite database.
///
/// The store does not arbitrate concurrent generations: one `reset` plus its
/// writes must finish before the next run starts.
#[derive(Debug, Clone)]
pub struct StagingStore {
    pool: SqlitePool,
}

impl StagingStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = db::create_db_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Make sure both staging tables exist with the fixed layout, then apply
    /// `policy`. Runs in one transaction and is idempotent.
    pub async fn reset(&self, policy: ResetPolicy) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in StagingTable::ALL {
            if policy == ResetPolicy::DropRecreate {
                let drop_sql = format!("DROP TABLE IF EXISTS {}", table.name());
                sqlx::query(&drop_sql).execute(&mut *tx).await?;
            }

            sqlx::query(table.create_sql()).execute(&mut *tx).await?;
            verify_layout(&mut *tx, table).await?;

            if policy == ResetPolicy::TruncateExisting {
                let delete_sql = format!("DELETE FROM {}", table.name());
                sqlx::query(&delete_sql).execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        tracing::info!(%policy, "staging tables reset");
        Ok(())
    }

    /// Append currency rows in one transaction. Returns the number written.
    ///
    /// On failure nothing from this call is kept. Retrying is only safe from
    /// duplicates after a fresh `reset` under a full-replace policy; under
    /// `CreateIfMissing` a retry of an already committed batch appends again
    /// (or trips the per-generation uniqueness constraint).
    pub async fn write_currencies(&self, rows: &[CurrencyRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.insert_currencies(rows)
            .await
            .map_err(|source| Error::WriteFailed {
                table: StagingTable::Currencies.name(),
                attempted: rows.len(),
                source,
            })?;

        tracing::info!(rows = rows.len(), table = %StagingTable::Currencies, "rows written");
        Ok(rows.len())
    }

    /// Append exchange-rate rows in one transaction. Same retry caveats as
    /// [`StagingStore::write_currencies`].
    pub async fn write_rates(&self, rows: &[ExchangeRateRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.insert_rates(rows)
            .await
            .map_err(|source| Error::WriteFailed {
                table: StagingTable::ExchangeRates.name(),
                attempted: rows.len(),
                source,
            })?;

        tracing::info!(rows = rows.len(), table = %StagingTable::ExchangeRates, "rows written");
        Ok(rows.len())
    }

    async fn insert_currencies(&self, rows: &[CurrencyRecord]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                r#"INSERT INTO stg_currencies (
                    source_ident_nbr, currency_code, currency_name, numeric_code, "precision",
                    subunit, symbol, symbol_first, decimal_mark, thousands_separator, load_timestamp
                ) "#,
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.source_ident_nbr)
                    .push_bind(record.currency_code.clone())
                    .push_bind(record.currency_name.clone())
                    .push_bind(record.numeric_code.clone())
                    .push_bind(record.precision)
                    .push_bind(record.subunit)
                    .push_bind(record.symbol.clone())
                    .push_bind(record.symbol_first)
                    .push_bind(record.decimal_mark.clone())
                    .push_bind(record.thousands_separator.clone())
                    .push_bind(format_load_timestamp(&record.load_timestamp));
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await
    }

    async fn insert_rates(&self, rows: &[ExchangeRateRecord]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "INSERT INTO stg_exchange_rates (load_timestamp, base, currency, rate) ",
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(format_load_timestamp(&record.load_timestamp))
                    .push_bind(record.base.clone())
                    .push_bind(record.currency.clone())
                    .push_bind(record.rate);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await
    }

    /// All staged currencies, oldest generation first.
    pub async fn currencies(&self) -> Result<Vec<CurrencyRecord>> {
        let records = sqlx::query_as::<_, CurrencyRecord>(
            r#"
            SELECT source_ident_nbr, currency_code, currency_name, numeric_code, "precision",
                   subunit, symbol, symbol_first, decimal_mark, thousands_separator, load_timestamp
            FROM stg_currencies
            ORDER BY load_timestamp, currency_code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// All staged exchange rates, oldest generation first.
    pub async fn rates(&self) -> Result<Vec<ExchangeRateRecord>> {
        let records = sqlx::query_as::<_, ExchangeRateRecord>(
            r#"
            SELECT load_timestamp, base, currency, rate
            FROM stg_exchange_rates
            ORDER BY load_timestamp, currency
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn row_count(&self, table: StagingTable) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Load generations present in `table`, oldest first.
    pub async fn generations(&self, table: StagingTable) -> Result<Vec<Generation>> {
        let sql = format!(
            "SELECT load_timestamp, COUNT(*) FROM {} GROUP BY load_timestamp ORDER BY load_timestamp",
            table.name()
        );
        let records = sqlx::query_as::<_, (String, i64)>(&sql)
            .fetch_all(&self.pool)
            .await?;

        records
            .into_iter()
            .map(|(raw, rows)| {
                let load_timestamp = parse_load_timestamp(&raw)
                    .map_err(|e| Error::Store(sqlx::Error::Decode(Box::new(e))))?;
                Ok(Generation { load_timestamp, rows })
            })
            .collect()
    }

    /// Column names and declared types of `table`; empty if it does not exist.
    pub async fn columns(&self, table: StagingTable) -> Result<Vec<(String, String)>> {
        let columns = sqlx::query_as::<_, (String, String)>(TABLE_COLUMNS_SQL)
            .bind(table.name())
            .fetch_all(&self.pool)
            .await?;
        Ok(columns)
    }
}

async fn verify_layout(conn: &mut SqliteConnection, table: StagingTable) -> Result<()> {
    let found = sqlx::query_as::<_, (String, String)>(TABLE_COLUMNS_SQL)
        .bind(table.name())
        .fetch_all(&mut *conn)
        .await?;

    if table.matches_layout(&found) {
        return Ok(());
    }

    Err(Error::SchemaMismatch {
        table: table.name(),
        expected: table.expected_layout(),
        found: describe(found.as_slice()),
    })
}

fn describe<N: AsRef<str>, T: AsRef<str>>(columns: &[(N, T)]) -> String {
    columns
        .iter()
        .map(|(name, ty)| format!("{} {}", name.as_ref(), ty.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    async fn test_store() -> anyhow::Result<StagingStore> {
        Ok(StagingStore::new(db::create_test_pool().await?))
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, hour, 0, 0).unwrap()
    }

    fn currency(code: &str, at: DateTime<Utc>) -> CurrencyRecord {
        CurrencyRecord {
            source_ident_nbr: Some(1),
            currency_code: code.to_string(),
            currency_name: Some(format!("{code} name")),
            numeric_code: Some("840".to_string()),
            precision: Some(2),
            subunit: Some(100),
            symbol: Some("$".to_string()),
            symbol_first: Some(true),
            decimal_mark: Some(".".to_string()),
            thousands_separator: None,
            load_timestamp: at,
        }
    }

    fn rate(currency: &str, rate: f64, at: DateTime<Utc>) -> ExchangeRateRecord {
        ExchangeRateRecord {
            load_timestamp: at,
            base: "USD".to_string(),
            currency: currency.to_string(),
            rate,
        }
    }

    #[test]
    fn test_reset_policy_parsing() {
        assert_eq!("drop_recreate".parse::<ResetPolicy>(), Ok(ResetPolicy::DropRecreate));
        assert_eq!("Truncate-Existing".parse::<ResetPolicy>(), Ok(ResetPolicy::TruncateExisting));
        assert_eq!(" create_if_missing ".parse::<ResetPolicy>(), Ok(ResetPolicy::CreateIfMissing));
        assert!("append".parse::<ResetPolicy>().is_err());
        assert_eq!(ResetPolicy::TruncateExisting.to_string(), "truncate_existing");
        assert!(!ResetPolicy::CreateIfMissing.is_full_replace());
    }

    #[tokio::test]
    async fn test_drop_recreate_then_empty_write() -> anyhow::Result<()> {
        let store = test_store().await?;
        store.reset(ResetPolicy::DropRecreate).await?;

        assert_eq!(store.write_currencies(&[]).await?, 0);
        assert_eq!(store.row_count(StagingTable::Currencies).await?, 0);

        for table in StagingTable::ALL {
            let columns = store.columns(table).await?;
            let names: Vec<_> = columns.iter().map(|(name, _)| name.as_str()).collect();
            let expected: Vec<_> = table.columns().iter().map(|(name, _)| *name).collect();
            assert_eq!(names, expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_written_rows_read_back() -> anyhow::Result<()> {
        let store = test_store().await?;
        store.reset(ResetPolicy::DropRecreate).await?;

        let currencies = vec![currency("EUR", at(9)), currency("USD", at(9))];
        assert_eq!(store.write_currencies(&currencies).await?, 2);
        assert_eq!(store.currencies().await?, currencies);

        let rates = vec![rate("EUR", 0.92, at(9))];
        assert_eq!(store.write_rates(&rates).await?, 1);
        let stored = store.rates().await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].currency, "EUR");
        assert_relative_eq!(stored[0].rate, 0.92, epsilon = 1e-12);
        assert_eq!(stored[0].load_timestamp, at(9));
        Ok(())
    }

    #[tokio::test]
    async fn test_truncate_twice_is_noop() -> anyhow::Result<()> {
        let store = test_store().await?;
        store.reset(ResetPolicy::TruncateExisting).await?;
        store.write_currencies(&[currency("USD", at(9))]).await?;
        store.write_rates(&[rate("EUR", 0.92, at(9))]).await?;

        store.reset(ResetPolicy::TruncateExisting).await?;
        assert_eq!(store.row_count(StagingTable::Currencies).await?, 0);
        assert_eq!(store.row_count(StagingTable::ExchangeRates).await?, 0);

        store.reset(ResetPolicy::TruncateExisting).await?;
        assert_eq!(store.row_count(StagingTable::Currencies).await?, 0);
        assert_eq!(store.row_count(StagingTable::ExchangeRates).await?, 0);
        assert_eq!(store.columns(StagingTable::ExchangeRates).await?.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_if_missing_keeps_history() -> anyhow::Result<()> {
        let store = test_store().await?;
        store.reset(ResetPolicy::CreateIfMissing).await?;
        store.write_currencies(&[currency("USD", at(9))]).await?;

        store.reset(ResetPolicy::CreateIfMissing).await?;
        store
            .write_currencies(&[currency("USD", at(10)), currency("EUR", at(10))])
            .await?;

        let generations = store.generations(StagingTable::Currencies).await?;
        assert_eq!(
            generations,
            vec![
                Generation { load_timestamp: at(9), rows: 1 },
                Generation { load_timestamp: at(10), rows: 2 },
            ]
        );

        store.reset(ResetPolicy::DropRecreate).await?;
        assert_eq!(store.row_count(StagingTable::Currencies).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_keeps_nothing() -> anyhow::Result<()> {
        let store = test_store().await?;
        store.reset(ResetPolicy::DropRecreate).await?;

        // Second row violates the one-row-per-currency-per-generation constraint
        let rows = vec![rate("EUR", 0.92, at(9)), rate("EUR", 0.93, at(9))];
        match store.write_rates(&rows).await {
            Err(Error::WriteFailed { table, attempted, .. }) => {
                assert_eq!(table, "stg_exchange_rates");
                assert_eq!(attempted, 2);
            }
            other => panic!("expected WriteFailed, got {other:?}"),
        }
        assert_eq!(store.row_count(StagingTable::ExchangeRates).await?, 0);

        let rows = vec![rate("EUR", 0.92, at(9)), rate("JPY", -1.0, at(9))];
        assert!(matches!(
            store.write_rates(&rows).await,
            Err(Error::WriteFailed { attempted: 2, .. })
        ));
        assert_eq!(store.row_count(StagingTable::ExchangeRates).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_before_reset_fails() -> anyhow::Result<()> {
        let store = test_store().await?;
        let result = store.write_currencies(&[currency("USD", at(9))]).await;
        assert!(matches!(result, Err(Error::WriteFailed { attempted: 1, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_layout_is_refused() -> anyhow::Result<()> {
        let store = test_store().await?;
        sqlx::query("CREATE TABLE stg_currencies (id INTEGER, short_code TEXT)")
            .execute(store.pool())
            .await?;
        sqlx::query("INSERT INTO stg_currencies VALUES (1, 'USD')")
            .execute(store.pool())
            .await?;

        for policy in [ResetPolicy::TruncateExisting, ResetPolicy::CreateIfMissing] {
            match store.reset(policy).await {
                Err(Error::SchemaMismatch {
                    table: "stg_currencies",
                    expected,
                    found,
                }) => {
                    assert_eq!(expected, StagingTable::Currencies.expected_layout());
                    assert!(expected.starts_with("source_ident_nbr INTEGER, currency_code TEXT"));
                    assert_eq!(found, "id INTEGER, short_code TEXT");
                }
                other => panic!("expected SchemaMismatch, got {other:?}"),
            }
        }
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stg_currencies")
            .fetch_one(store.pool())
            .await?;
        assert_eq!(count, 1);

        store.reset(ResetPolicy::DropRecreate).await?;
        assert_eq!(store.columns(StagingTable::Currencies).await?.len(), 11);
        assert_eq!(store.row_count(StagingTable::Currencies).await?, 0);
        Ok(())
    }
}
