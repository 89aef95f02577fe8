use crate::core::convert::MissingRatePolicy;
use crate::core::currency::CurrencyCode;
use crate::core::ledger::Account;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_EXCHANGERATE_HOST_URL: &str = "https://api.exchangerate.host";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeRateHostConfig {
    pub base_url: String,
    #[serde(default)]
    pub access_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub exchangerate_host: Option<ExchangeRateHostConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            exchangerate_host: Some(ExchangeRateHostConfig {
                base_url: DEFAULT_EXCHANGERATE_HOST_URL.to_string(),
                access_key: None,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub base_currency: CurrencyCode,
    /// Initial display currency; falls back to the base currency.
    #[serde(default)]
    pub display_currency: Option<CurrencyCode>,
    #[serde(default)]
    pub missing_rate_policy: MissingRatePolicy,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl AppConfig {
    /// Loads the default config file. A missing file yields the defaults.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("app", "casho", "casho")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn initial_display_currency(&self) -> CurrencyCode {
        self.display_currency
            .clone()
            .unwrap_or_else(|| self.base_currency.clone())
    }

    pub fn exchangerate_host(&self) -> ExchangeRateHostConfig {
        self.providers
            .exchangerate_host
            .clone()
            .unwrap_or_else(|| ExchangeRateHostConfig {
                base_url: DEFAULT_EXCHANGERATE_HOST_URL.to_string(),
                access_key: None,
            })
    }
}
