// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::SourceClient;
use crate::config::SourceConfig;
use crate::error::FetchError;

/// Client for the CurrencyBeacon REST API.
#[derive(Clone)]
pub struct CurrencyBeaconClient {
    client: Client,
    base_url: String,
    api_key: String,
    currency_type: String,
}

/// Every CurrencyBeacon endpoint wraps its payload in `response`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    response: Value,
}

impl CurrencyBeaconClient {
    pub fn new(config: &SourceConfig, api_key: String) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            currency_type: config.currency_type.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let endpoint = self.endpoint(path);
        tracing::info!(%endpoint, "fetching");

        let response = self
            .client
            .get(&endpoint)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                endpoint: endpoint.clone(),
                source: source.without_url(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| FetchError::Request {
            endpoint: endpoint.clone(),
            source: source.without_url(),
        })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint,
                status,
                body: text,
            });
        }

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|source| FetchError::Decode { endpoint, source })?;
        Ok(envelope.response)
    }
}

#[async_trait]
impl SourceClient for CurrencyBeaconClient {
    async fn fetch_currencies(&self) -> Result<Vec<Value>, FetchError> {
        let payload = self
            .get("currencies", &[("type", self.currency_type.as_str())])
            .await?;

        match payload {
            Value::Array(currencies) => Ok(currencies),
            Value::Null => Ok(Vec::new()),
            other => Err(FetchError::Unexpected {
                endpoint: self.endpoint("currencies"),
                kind: json_kind(&other),
            }),
        }
    }

    async fn fetch_rates(
        &self,
        base: &str,
        targets: &[String],
    ) -> Result<Option<Value>, FetchError> {
        let symbols = targets.join(",");
        let payload = self
            .get("latest", &[("base", base), ("symbols", symbols.as_str())])
            .await?;

        Ok(match payload {
            Value::Null => None,
            Value::Object(ref fields) if fields.is_empty() => None,
            payload => Some(payload),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
