// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use std::fs;
use std::path::{Path, PathBuf};

use crate::staging::{StagingStore, StagingTable};
use crate::utils::format_load_timestamp;

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// Write both staging tables to timestamped CSV files in `output_dir`.
pub async fn export_staging_csv(store: &StagingStore, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");

    let currencies_path = output_dir.join(format!("{}_{}.csv", StagingTable::Currencies, timestamp));
    let mut writer = Writer::from_path(&currencies_path)?;
    writer.write_record(StagingTable::Currencies.columns().iter().map(|(name, _)| *name))?;
    for currency in store.currencies().await? {
        writer.write_record(&[
            opt(&currency.source_ident_nbr),
            currency.currency_code,
            opt(&currency.currency_name),
            opt(&currency.numeric_code),
            opt(&currency.precision),
            opt(&currency.subunit),
            opt(&currency.symbol),
            opt(&currency.symbol_first),
            opt(&currency.decimal_mark),
            opt(&currency.thousands_separator),
            format_load_timestamp(&currency.load_timestamp),
        ])?;
    }
    writer.flush()?;

    let rates_path = output_dir.join(format!("{}_{}.csv", StagingTable::ExchangeRates, timestamp));
    let mut writer = Writer::from_path(&rates_path)?;
    writer.write_record(StagingTable::ExchangeRates.columns().iter().map(|(name, _)| *name))?;
    for rate in store.rates().await? {
        writer.write_record(&[
            format_load_timestamp(&rate.load_timestamp),
            rate.base,
            rate.currency,
            rate.rate.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(vec![currencies_path, rates_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{CurrencyRecord, ExchangeRateRecord};
    use crate::staging::ResetPolicy;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_export_writes_both_tables() -> Result<()> {
        let store = StagingStore::new(db::create_test_pool().await?);
        store.reset(ResetPolicy::DropRecreate).await?;
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        store
            .write_currencies(&[CurrencyRecord {
                source_ident_nbr: Some(147),
                currency_code: "USD".to_string(),
                currency_name: Some("US Dollar".to_string()),
                numeric_code: Some("840".to_string()),
                precision: Some(2),
                subunit: Some(100),
                symbol: Some("$".to_string()),
                symbol_first: Some(true),
                decimal_mark: Some(".".to_string()),
                thousands_separator: None,
                load_timestamp: at,
            }])
            .await?;
        store
            .write_rates(&[ExchangeRateRecord {
                load_timestamp: at,
                base: "USD".to_string(),
                currency: "EUR".to_string(),
                rate: 0.92,
            }])
            .await?;

        let dir = tempdir()?;
        let paths = export_staging_csv(&store, dir.path()).await?;
        assert_eq!(paths.len(), 2);

        let currencies = fs::read_to_string(&paths[0])?;
        let mut lines = currencies.lines();
        assert_eq!(
            lines.next(),
            Some("source_ident_nbr,currency_code,currency_name,numeric_code,precision,subunit,symbol,symbol_first,decimal_mark,thousands_separator,load_timestamp")
        );
        assert_eq!(
            lines.next(),
            Some("147,USD,US Dollar,840,2,100,$,true,.,,2026-10-18T09:30:00.000000Z")
        );

        let rates = fs::read_to_string(&paths[1])?;
        assert!(rates.contains("2026-10-18T09:30:00.000000Z,USD,EUR,0.92"));
        Ok(())
    }
}
