use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::currency::{CurrencyCode, RateProvider, RateTable};
use crate::core::symbols::{SymbolEntry, SymbolProvider};

const USER_AGENT: &str = "casho/0.1";

/// Client for an exchangerate.host compatible service.
///
/// Every call is a single attempt; callers decide how to degrade.
pub struct ExchangeRateHostProvider {
    base_url: String,
    access_key: Option<String>,
}

impl ExchangeRateHostProvider {
    pub fn new(base_url: &str, access_key: Option<String>) -> Self {
        ExchangeRateHostProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let mut url = reqwest::Url::parse(&format!("{}{}", self.base_url, endpoint))
            .with_context(|| format!("Invalid URL for {what}: {}{}", self.base_url, endpoint))?;
        let mut params = query.to_vec();
        if let Some(key) = &self.access_key {
            params.push(("access_key", key.as_str()));
        }
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        debug!("Requesting {} from {}", what, url.path());

        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let request = client.get(url.clone());

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for {} URL: {}", e, what, url))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for {}", response.status(), what));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", what, e))
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    rates: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    symbols: Option<HashMap<String, SymbolInfo>>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    description: String,
}

#[async_trait]
impl RateProvider for ExchangeRateHostProvider {
    #[instrument(name = "ExchangeRateFetch", skip(self), fields(base = %base))]
    async fn fetch_rates(&self, base: &CurrencyCode) -> Result<RateTable> {
        let what = format!("rates with base {base}");
        let data: LatestResponse = self
            .get_json("/latest", &[("base", base.as_str())], &what)
            .await?;

        let rates = data
            .rates
            .ok_or_else(|| anyhow!("No rate data found for base currency: {}", base))?;
        debug!(count = rates.len(), "Received exchange rates");

        Ok(RateTable::from_rates(base, rates, Utc::now()))
    }
}

#[async_trait]
impl SymbolProvider for ExchangeRateHostProvider {
    #[instrument(name = "SymbolFetch", skip(self))]
    async fn fetch_symbols(&self) -> Result<Vec<SymbolEntry>> {
        let data: SymbolsResponse = self.get_json("/symbols", &[], "currency symbols").await?;

        let symbols = data
            .symbols
            .ok_or_else(|| anyhow!("No symbol data found in response"))?;

        Ok(symbols
            .into_iter()
            .map(|(code, info)| SymbolEntry::new(&code, &info.description))
            .collect())
    }
}
