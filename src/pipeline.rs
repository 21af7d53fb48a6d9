// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! One load generation: reset, currencies, rates, downstream notification.

use chrono::{DateTime, Utc};
use tracing::Instrument;

use crate::api::SourceClient;
use crate::error::{Error, Result};
use crate::projector::{project_currencies, project_rates};
use crate::staging::{ResetPolicy, StagingStore};
use crate::trigger::DownstreamTrigger;
use crate::utils::{format_load_timestamp, generation_timestamp};

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Loaded { rows: usize, dropped: usize },
    Skipped(String),
    Failed(String),
}

impl StageOutcome {
    pub fn rows(&self) -> usize {
        match self {
            StageOutcome::Loaded { rows, .. } => *rows,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    NotConfigured,
    /// Not sent because nothing usable was staged this run.
    Withheld,
    Notified,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub load_timestamp: DateTime<Utc>,
    pub policy: ResetPolicy,
    pub currencies: StageOutcome,
    pub rates: StageOutcome,
    pub trigger: TriggerOutcome,
}

impl RunSummary {
    /// False when a stage failed. Trigger failures do not count.
    pub fn is_success(&self) -> bool {
        !self.currencies.is_failed() && !self.rates.is_failed()
    }
}

/// Runs one generation against a source, a store and an optional trigger.
///
/// Runs must not overlap; schedule them one after another.
pub struct Pipeline<'a> {
    source: &'a dyn SourceClient,
    store: &'a StagingStore,
    trigger: Option<&'a dyn DownstreamTrigger>,
    policy: ResetPolicy,
    base_currency: String,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn SourceClient, store: &'a StagingStore, policy: ResetPolicy) -> Self {
        Self {
            source,
            store,
            trigger: None,
            policy,
            base_currency: "USD".to_string(),
        }
    }

    pub fn with_trigger(mut self, trigger: &'a dyn DownstreamTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_base_currency(mut self, base_currency: impl Into<String>) -> Self {
        self.base_currency = base_currency.into();
        self
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_at(generation_timestamp()).await
    }

    /// Run a generation stamped with `at`.
    ///
    /// Returns `Err` when the run aborts: reset failure, fetch failure or a
    /// failed write. Rows committed before the abort stay in place; re-run
    /// `reset` before retrying.
    pub async fn run_at(&self, at: DateTime<Utc>) -> Result<RunSummary> {
        let span = tracing::info_span!("generation", load_timestamp = %format_load_timestamp(&at));
        self.stage(at).instrument(span).await
    }

    async fn stage(&self, at: DateTime<Utc>) -> Result<RunSummary> {
        let mut committed = 0;

        self.store
            .reset(self.policy)
            .await
            .map_err(|e| abort("reset", committed, e))?;

        let raw_currencies = self
            .source
            .fetch_currencies()
            .await
            .map_err(|e| abort("fetch currencies", committed, e.into()))?;

        let mut summary = RunSummary {
            load_timestamp: at,
            policy: self.policy,
            currencies: StageOutcome::Skipped("no currency data returned".to_string()),
            rates: StageOutcome::Skipped("no currencies loaded".to_string()),
            trigger: TriggerOutcome::NotConfigured,
        };

        if raw_currencies.is_empty() {
            tracing::warn!("no currency data returned from source, skipping currencies and rates");
            return Ok(self.finish(summary).await);
        }

        let currencies = project_currencies(&raw_currencies, at);
        if currencies.dropped > 0 {
            tracing::warn!(dropped = currencies.dropped, "currency records dropped during projection");
        }
        if currencies.records.is_empty() {
            tracing::warn!("no currency records projected, skipping currencies and rates");
            summary.currencies = StageOutcome::Skipped(format!(
                "no currency records projected ({} dropped)",
                currencies.dropped
            ));
            return Ok(self.finish(summary).await);
        }

        let written = self
            .store
            .write_currencies(&currencies.records)
            .await
            .map_err(|e| abort("write currencies", committed, e))?;
        committed += written;
        summary.currencies = StageOutcome::Loaded {
            rows: currencies.records.len(),
            dropped: currencies.dropped,
        };

        // Targets come from what was just projected, not from the raw payload
        let targets = currencies.codes();

        let raw_rates = self
            .source
            .fetch_rates(&self.base_currency, &targets)
            .await
            .map_err(|e| abort("fetch rates", committed, e.into()))?;

        let Some(raw_rates) = raw_rates else {
            tracing::warn!(base = %self.base_currency, "no exchange-rate data returned from source");
            summary.rates = StageOutcome::Skipped("no exchange-rate data returned".to_string());
            return Ok(self.finish(summary).await);
        };

        summary.rates = match project_rates(&raw_rates, at) {
            Ok(rates) => {
                if rates.skipped > 0 {
                    tracing::warn!(skipped = rates.skipped, "unusable rate values skipped");
                }
                let written = self
                    .store
                    .write_rates(&rates.records)
                    .await
                    .map_err(|e| abort("write rates", committed, e))?;
                committed += written;
                StageOutcome::Loaded {
                    rows: rates.records.len(),
                    dropped: rates.skipped,
                }
            }
            Err(e @ Error::MalformedResponse(_)) => {
                tracing::error!(stage = "project rates", committed, error = %e, "stage failed");
                StageOutcome::Failed(e.to_string())
            }
            Err(e) => return Err(abort("project rates", committed, e)),
        };

        tracing::info!(committed, "generation staged");
        Ok(self.finish(summary).await)
    }

    async fn finish(&self, mut summary: RunSummary) -> RunSummary {
        let Some(trigger) = self.trigger else {
            return summary;
        };

        if summary.currencies.rows() == 0 || !summary.is_success() {
            tracing::warn!("downstream job not triggered for an incomplete generation");
            summary.trigger = TriggerOutcome::Withheld;
            return summary;
        }

        summary.trigger = match trigger.notify_ready().await {
            Ok(()) => TriggerOutcome::Notified,
            Err(e) => {
                tracing::error!(error = %e, "downstream job trigger failed");
                TriggerOutcome::Failed(e.to_string())
            }
        };
        summary
    }
}

fn abort(stage: &str, committed: usize, error: Error) -> Error {
    tracing::error!(stage, committed, error = %error, "generation aborted");
    error
}
