// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::config::TriggerConfig;
use crate::error::TriggerError;

/// Tells the downstream transformation job that a new generation is staged.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownstreamTrigger: Send + Sync {
    async fn notify_ready(&self) -> Result<(), TriggerError>;
}

/// Starts a dbt Cloud job run.
pub struct DbtCloudTrigger {
    client: Client,
    endpoint: String,
    token: String,
    cause: String,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    cause: &'a str,
}

impl DbtCloudTrigger {
    pub fn new(config: &TriggerConfig, token: String) -> Result<Self, TriggerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(TriggerError::Client)?;

        let endpoint = format!(
            "{}/accounts/{}/jobs/{}/run/",
            config.base_url.trim_end_matches('/'),
            config.account_id,
            config.job_id
        );

        Ok(Self {
            client,
            endpoint,
            token,
            cause: config.cause.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DownstreamTrigger for DbtCloudTrigger {
    async fn notify_ready(&self) -> Result<(), TriggerError> {
        tracing::info!(endpoint = %self.endpoint, "triggering downstream job");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Token {}", self.token))
            .json(&RunRequest { cause: &self.cause })
            .send()
            .await
            .map_err(|source| TriggerError::Request {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TriggerError::Status {
                endpoint: self.endpoint.clone(),
                status,
                body,
            });
        }

        Ok(())
    }
}
