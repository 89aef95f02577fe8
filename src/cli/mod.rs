//! Terminal consumers of the rate cache. They own no state of their own.

pub mod convert;
pub mod dashboard;
pub mod rates;
pub mod search;
pub mod setup;
pub mod transactions;
pub mod ui;

use crate::core::currency::CurrencyCode;

/// Footnote for output computed from incomplete rate data.
pub fn rate_note(fallback_rates: bool, missing_rates: &[CurrencyCode]) -> Option<String> {
    let mut notes = Vec::new();
    if fallback_rates {
        notes.push("Exchange rates unavailable, using fallback rates.".to_string());
    }
    if !missing_rates.is_empty() {
        let codes: Vec<&str> = missing_rates.iter().map(CurrencyCode::as_str).collect();
        notes.push(format!("No rate for {}.", codes.join(", ")));
    }
    if notes.is_empty() {
        None
    } else {
        Some(ui::style_text(&notes.join(" "), ui::StyleType::Subtle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_note() {
        assert!(rate_note(false, &[]).is_none());

        let note = rate_note(true, &["CAD".into(), "EUR".into()]).unwrap();
        assert!(note.contains("fallback"));
        assert!(note.contains("No rate for CAD, EUR"));
    }
}
