use super::ui;
use crate::core::cache::RateSnapshot;
use crate::core::convert::{ConversionError, MissingRatePolicy, convert_with, missing_currencies};
use crate::core::currency::{CurrencyCode, MonetaryAmount};
use anyhow::Result;

/// Formats a single conversion as `100.00 USD = 135.00 CAD`.
pub fn format_conversion(
    amount: &MonetaryAmount,
    to: &CurrencyCode,
    snapshot: &RateSnapshot,
    policy: MissingRatePolicy,
) -> Result<String, ConversionError> {
    let value = convert_with(amount, to, &snapshot.rates, policy)?;
    Ok(format!("{amount} = {}", MonetaryAmount::new(value, to.clone())))
}

fn footnote(
    amount: &MonetaryAmount,
    to: &CurrencyCode,
    snapshot: &RateSnapshot,
) -> Option<String> {
    let missing = missing_currencies(std::slice::from_ref(amount), to, &snapshot.rates);
    super::rate_note(snapshot.rates.is_fallback(), &missing)
}

/// Converts `amount` into `to`, or into the display currency when `to` is not given.
pub fn run(
    amount: MonetaryAmount,
    to: Option<CurrencyCode>,
    snapshot: &RateSnapshot,
    policy: MissingRatePolicy,
) -> Result<()> {
    let to = to.unwrap_or_else(|| snapshot.display_currency.clone());
    let line = format_conversion(&amount, &to, snapshot, policy)?;
    println!("{}", ui::style_text(&line, ui::StyleType::TotalLabel));

    if let Some(note) = footnote(&amount, &to, snapshot) {
        println!("{note}");
    }
    Ok(())
}
