//! Currency codes, monetary amounts and exchange rate snapshots

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use tracing::{debug, warn};

/// Currency every rate is quoted against unless configured otherwise.
pub const DEFAULT_BASE_CURRENCY: &str = "USD";

/// A short uppercase currency identifier such as `USD`.
///
/// Input is trimmed and upper-cased on construction; codes are otherwise
/// opaque and compared by exact match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: &str) -> Self {
        CurrencyCode(code.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        CurrencyCode::new(DEFAULT_BASE_CURRENCY)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        CurrencyCode::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        CurrencyCode::new(&s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A numeric value tagged with the currency it is denominated in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryAmount {
    pub value: f64,
    pub currency: CurrencyCode,
}

impl MonetaryAmount {
    pub fn new(value: f64, currency: impl Into<CurrencyCode>) -> Self {
        MonetaryAmount {
            value,
            currency: currency.into(),
        }
    }

    /// Returns a new amount expressed in `to` using the pass-through fallback.
    pub fn converted_to(&self, to: &CurrencyCode, rates: &RateTable) -> MonetaryAmount {
        MonetaryAmount {
            value: crate::core::convert::convert(self, to, rates),
            currency: to.clone(),
        }
    }
}

impl Display for MonetaryAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {}", self.value, self.currency)
    }
}

/// Where a [`RateTable`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Base-only table used before the fetch resolves or after it failed.
    Fallback,
    Fetched { fetched_at: DateTime<Utc> },
}

/// Immutable snapshot of rates relative to a single base currency.
///
/// The base currency is always present with a rate of exactly `1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    base: CurrencyCode,
    rates: BTreeMap<CurrencyCode, f64>,
    source: RateSource,
}

impl RateTable {
    pub fn fallback(base: &CurrencyCode) -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(base.clone(), 1.0);
        RateTable {
            base: base.clone(),
            rates,
            source: RateSource::Fallback,
        }
    }

    /// Builds a fetched table from raw upstream rates.
    ///
    /// Negative and non-finite rates are dropped. Zero is kept as-is.
    pub fn from_rates(
        base: &CurrencyCode,
        raw: HashMap<String, f64>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let mut rates = BTreeMap::new();
        for (code, rate) in raw {
            let code = CurrencyCode::new(&code);
            if !rate.is_finite() || rate < 0.0 {
                warn!(%code, rate, "Dropping invalid exchange rate");
                continue;
            }
            rates.insert(code, rate);
        }

        match rates.insert(base.clone(), 1.0) {
            Some(upstream) if upstream != 1.0 => {
                warn!(base = %base, upstream, "Base currency rate was not 1, overriding")
            }
            None => debug!(base = %base, "Base currency missing from rates, inserting 1"),
            _ => {}
        }

        RateTable {
            base: base.clone(),
            rates,
            source: RateSource::Fetched { fetched_at },
        }
    }

    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    pub fn source(&self) -> RateSource {
        self.source
    }

    pub fn is_fallback(&self) -> bool {
        self.source == RateSource::Fallback
    }

    pub fn get(&self, code: &CurrencyCode) -> Option<f64> {
        self.rates.get(code).copied()
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.rates.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterates rates ordered by currency code.
    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, f64)> {
        self.rates.iter().map(|(code, rate)| (code, *rate))
    }
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rates(&self, base: &CurrencyCode) -> Result<RateTable>;
}

/// Single best-effort fetch. Failures degrade to the base-only table.
pub async fn fetch_rates_or_fallback(
    provider: &dyn RateProvider,
    base: &CurrencyCode,
) -> RateTable {
    match provider.fetch_rates(base).await {
        Ok(table) => {
            debug!(base = %base, count = table.len(), "Fetched exchange rates");
            table
        }
        Err(e) => {
            warn!(base = %base, error = %e, "Failed to fetch exchange rates, using fallback");
            RateTable::fallback(base)
        }
    }
}
