//! Cross-rate conversion and aggregation over a [`RateTable`].
//!
//! Every rate in a table is quoted against the same base currency, so the
//! direct rate between two currencies is the ratio of their base rates.
use crate::core::currency::{CurrencyCode, MonetaryAmount, RateTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// What to do when a currency is absent from the rate table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingRatePolicy {
    /// Treat the missing rate as `1`. Totals may be silently wrong.
    #[default]
    PassThrough,
    /// Fail the conversion.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("No exchange rate available for {currency}")]
    MissingRate { currency: CurrencyCode },
}

fn rate_or_one(rates: &RateTable, code: &CurrencyCode) -> f64 {
    rates.get(code).unwrap_or_else(|| {
        debug!(currency = %code, "Missing exchange rate, assuming 1");
        1.0
    })
}

fn lookup(
    rates: &RateTable,
    code: &CurrencyCode,
    policy: MissingRatePolicy,
) -> Result<f64, ConversionError> {
    match policy {
        MissingRatePolicy::PassThrough => Ok(rate_or_one(rates, code)),
        MissingRatePolicy::Strict => rates.get(code).ok_or_else(|| ConversionError::MissingRate {
            currency: code.clone(),
        }),
    }
}

/// Converts `amount` into `to` under the given policy.
///
/// Converting into the amount's own currency returns the value unchanged.
/// Zero rates are not guarded: a zero target rate yields `0` and a zero
/// source rate yields a non-finite value.
pub fn convert_with(
    amount: &MonetaryAmount,
    to: &CurrencyCode,
    rates: &RateTable,
    policy: MissingRatePolicy,
) -> Result<f64, ConversionError> {
    if amount.currency == *to {
        return Ok(amount.value);
    }
    let rate_from = lookup(rates, &amount.currency, policy)?;
    let rate_to = lookup(rates, to, policy)?;
    Ok(amount.value * (rate_to / rate_from))
}

/// Converts with the pass-through policy; never fails.
pub fn convert(amount: &MonetaryAmount, to: &CurrencyCode, rates: &RateTable) -> f64 {
    if amount.currency == *to {
        return amount.value;
    }
    amount.value * (rate_or_one(rates, to) / rate_or_one(rates, &amount.currency))
}

/// Sums every amount after converting it into `to`.
pub fn aggregate_with<'a, I>(
    amounts: I,
    to: &CurrencyCode,
    rates: &RateTable,
    policy: MissingRatePolicy,
) -> Result<f64, ConversionError>
where
    I: IntoIterator<Item = &'a MonetaryAmount>,
{
    amounts
        .into_iter()
        .try_fold(0.0, |total, amount| {
            convert_with(amount, to, rates, policy).map(|value| total + value)
        })
}

/// Sums with the pass-through policy. An empty input sums to `0`.
pub fn aggregate<'a, I>(amounts: I, to: &CurrencyCode, rates: &RateTable) -> f64
where
    I: IntoIterator<Item = &'a MonetaryAmount>,
{
    amounts
        .into_iter()
        .map(|amount| convert(amount, to, rates))
        .sum()
}

/// Currencies the table has no rate for, among those a conversion into `to`
/// would actually look up.
///
/// Amounts already in `to` need no rate, and `to` itself only counts when
/// some amount is in another currency.
pub fn missing_currencies<'a, I>(
    amounts: I,
    to: &CurrencyCode,
    rates: &RateTable,
) -> Vec<CurrencyCode>
where
    I: IntoIterator<Item = &'a MonetaryAmount>,
{
    let sources: Vec<&CurrencyCode> = amounts
        .into_iter()
        .map(|a| &a.currency)
        .filter(|code| *code != to)
        .collect();
    let target = (!sources.is_empty()).then_some(to);

    let mut missing: Vec<CurrencyCode> = sources
        .into_iter()
        .chain(target)
        .filter(|code| !rates.contains(code))
        .cloned()
        .collect();
    missing.sort();
    missing.dedup();
    missing
}
