// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::staging::ResetPolicy;

pub const API_KEY_VAR: &str = "CURRENCYBEACON_API_KEY";
pub const DBT_TOKEN_VAR: &str = "DBT_CLOUD_API_TOKEN";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const RESET_POLICY_VAR: &str = "STAGING_RESET_POLICY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Passed as `type` to the currencies endpoint.
    pub currency_type: String,
    pub base_currency: String,
    pub timeout_secs: u64,
    /// Only read from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.currencybeacon.com/v1".to_string(),
            currency_type: "fiat".to_string(),
            base_currency: "USD".to_string(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    pub reset_policy: ResetPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://staging.db".to_string(),
            reset_policy: ResetPolicy::TruncateExisting,
        }
    }
}

/// dbt Cloud job started after a successful load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub base_url: String,
    pub account_id: u64,
    pub job_id: u64,
    pub cause: String,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://cloud.getdbt.com/api/v2".to_string(),
            account_id: 0,
            job_id: 0,
            cause: "Triggered after currency staging load".to_string(),
            timeout_secs: 30,
            token: None,
        }
    }
}

impl Config {
    /// Read `path` if it exists (built-in defaults otherwise), then apply the
    /// environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let config_str = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&config_str)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        if let Some(api_key) = var(API_KEY_VAR) {
            self.source.api_key = Some(api_key);
        }
        if let Some(token) = var(DBT_TOKEN_VAR) {
            self.trigger.token = Some(token);
        }
        if let Some(database_url) = var(DATABASE_URL_VAR) {
            self.store.database_url = database_url;
        }
        if let Some(policy) = var(RESET_POLICY_VAR) {
            self.store.reset_policy = policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}", RESET_POLICY_VAR))?;
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.source.base_url, "https://api.currencybeacon.com/v1");
        assert_eq!(config.source.base_currency, "USD");
        assert_eq!(config.store.reset_policy, ResetPolicy::TruncateExisting);
        assert!(!config.trigger.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [store]
            reset_policy = "drop_recreate"

            [trigger]
            enabled = true
            account_id = 12
            job_id = 34
            "#,
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.store.reset_policy, ResetPolicy::DropRecreate);
        assert_eq!(config.store.database_url, "sqlite://staging.db");
        assert!(config.trigger.enabled);
        assert_eq!(config.trigger.job_id, 34);
        assert_eq!(config.source.currency_type, "fiat");
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let vars: HashMap<&str, &str> = HashMap::from([
            (API_KEY_VAR, "secret"),
            (DATABASE_URL_VAR, "sqlite::memory:"),
            (RESET_POLICY_VAR, "create_if_missing"),
            (DBT_TOKEN_VAR, "  "),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()))?;

        assert_eq!(config.source.api_key.as_deref(), Some("secret"));
        assert_eq!(config.store.database_url, "sqlite::memory:");
        assert_eq!(config.store.reset_policy, ResetPolicy::CreateIfMissing);
        assert_eq!(config.trigger.token, None);
        Ok(())
    }

    #[test]
    fn test_invalid_policy_env_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == RESET_POLICY_VAR).then(|| "append".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_skips_secrets() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.source.api_key = Some("secret".to_string());
        config.save(&path)?;

        let written = fs::read_to_string(&path)?;
        assert!(!written.contains("secret"));
        assert!(written.contains("reset_policy = \"truncate_existing\""));
        Ok(())
    }
}
