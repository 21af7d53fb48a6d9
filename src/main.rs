// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

mod api;
mod config;
mod db;
mod error;
mod export;
mod models;
mod pipeline;
mod projector;
mod staging;
mod trigger;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::api::CurrencyBeaconClient;
use crate::config::{Config, API_KEY_VAR, DBT_TOKEN_VAR};
use crate::error::Error;
use crate::pipeline::{Pipeline, RunSummary, StageOutcome, TriggerOutcome};
use crate::staging::{ResetPolicy, StagingStore, StagingTable};
use crate::trigger::DbtCloudTrigger;
use crate::utils::format_load_timestamp;

#[derive(Parser)]
#[command(
    name = "currency-staging",
    about = "Load CurrencyBeacon currencies and exchange rates into staging tables"
)]
struct Cli {
    /// Path to the TOML config file. Built-in defaults apply when it is missing.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one load generation: reset, currencies, exchange rates, trigger.
    Run {
        /// Override the configured reset policy.
        #[arg(long, value_enum)]
        policy: Option<ResetPolicy>,

        /// Do not notify the downstream job even if configured.
        #[arg(long, default_value_t = false)]
        no_trigger: bool,
    },
    /// Create or reset the staging tables without loading anything.
    Reset {
        #[arg(long, value_enum)]
        policy: Option<ResetPolicy>,
    },
    /// Show row counts and load generations of the staging tables.
    Status,
    /// Export the staging tables to CSV.
    Export {
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Write a config file with the default settings.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Commands::InitConfig { force } = cli.command {
        return init_config(&cli.config, force);
    }

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { policy, no_trigger } => run_pipeline(&config, policy, no_trigger).await?,
        Commands::Reset { policy } => reset_tables(&config, policy).await?,
        Commands::Status => show_status(&config).await?,
        Commands::Export { output_dir } => export_tables(&config, &output_dir).await?,
        Commands::InitConfig { .. } => unreachable!(),
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(path)?;
    println!("✅ Default config written to {}", path.display());
    Ok(())
}

async fn run_pipeline(config: &Config, policy: Option<ResetPolicy>, no_trigger: bool) -> Result<()> {
    let api_key = config
        .source
        .api_key
        .clone()
        .with_context(|| format!("{} must be set", API_KEY_VAR))?;
    let client = CurrencyBeaconClient::new(&config.source, api_key)?;

    let trigger = if config.trigger.enabled && !no_trigger {
        let token = config
            .trigger
            .token
            .clone()
            .with_context(|| format!("{} must be set when the trigger is enabled", DBT_TOKEN_VAR))?;
        let trigger = DbtCloudTrigger::new(&config.trigger, token)?;
        println!("Downstream job: {}", trigger.endpoint());
        Some(trigger)
    } else {
        None
    };

    let policy = policy.unwrap_or(config.store.reset_policy);
    let store = StagingStore::connect(&config.store.database_url).await?;

    let mut pipeline =
        Pipeline::new(&client, &store, policy).with_base_currency(&config.source.base_currency);
    if let Some(trigger) = &trigger {
        pipeline = pipeline.with_trigger(trigger);
    }

    println!("Staging currencies into {} ({})...", config.store.database_url, policy);
    let result = pipeline.run().await;
    store.close().await;

    match result {
        Ok(summary) => {
            print_summary(&summary);
            if !summary.is_success() {
                anyhow::bail!("generation finished with a failed stage");
            }
            Ok(())
        }
        Err(e @ Error::WriteFailed { .. }) => {
            if policy.is_full_replace() {
                eprintln!("Re-running is safe: the next reset ({policy}) clears partial loads.");
            } else {
                eprintln!("Check for committed rows before re-running: {policy} appends.");
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("Generation {}", format_load_timestamp(&summary.load_timestamp));
    for (label, outcome) in [("currencies", &summary.currencies), ("exchange rates", &summary.rates)] {
        match outcome {
            StageOutcome::Loaded { rows, dropped } => {
                println!("✅ {label}: {rows} rows loaded ({dropped} dropped)")
            }
            StageOutcome::Skipped(reason) => println!("⚠️  {label}: skipped, {reason}"),
            StageOutcome::Failed(reason) => println!("❌ {label}: failed, {reason}"),
        }
    }
    match &summary.trigger {
        TriggerOutcome::NotConfigured => {}
        TriggerOutcome::Withheld => println!("⚠️  downstream job not triggered"),
        TriggerOutcome::Notified => println!("✅ downstream job triggered"),
        TriggerOutcome::Failed(reason) => println!("❌ downstream job trigger failed: {reason}"),
    }
}

async fn reset_tables(config: &Config, policy: Option<ResetPolicy>) -> Result<()> {
    let policy = policy.unwrap_or(config.store.reset_policy);
    let store = StagingStore::connect(&config.store.database_url).await?;
    store.reset(policy).await?;
    store.close().await;
    println!("✅ Staging tables reset ({})", policy);
    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    let store = StagingStore::connect(&config.store.database_url).await?;

    for table in StagingTable::ALL {
        if store.columns(table).await?.is_empty() {
            println!("{table}: missing (run `reset` or `run` first)");
            continue;
        }
        println!("{table}: {} rows", store.row_count(table).await?);
        for generation in store.generations(table).await? {
            println!(
                "  {}  {} rows",
                format_load_timestamp(&generation.load_timestamp),
                generation.rows
            );
        }
    }

    store.close().await;
    Ok(())
}

async fn export_tables(config: &Config, output_dir: &Path) -> Result<()> {
    let store = StagingStore::connect(&config.store.database_url).await?;
    let paths = export::export_staging_csv(&store, output_dir).await?;
    store.close().await;

    for path in paths {
        println!("📁 CSV file created: {}", path.display());
    }
    Ok(())
}
