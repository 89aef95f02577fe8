use super::ui;
use crate::core::cache::RateSnapshot;
use crate::core::convert::{MissingRatePolicy, convert_with};
use crate::core::currency::MonetaryAmount;
use crate::core::symbols::{SymbolDirectory, SymbolEntry};
use anyhow::Result;
use comfy_table::Cell;

#[derive(Debug, Clone)]
pub struct SearchRow {
    pub entry: SymbolEntry,
    /// Units of this currency per one unit of the display currency.
    pub rate: Option<f64>,
    pub current: bool,
}

pub fn rows(matches: Vec<SymbolEntry>, snapshot: &RateSnapshot) -> Vec<SearchRow> {
    let unit = MonetaryAmount::new(1.0, snapshot.display_currency.clone());
    matches
        .into_iter()
        .map(|entry| SearchRow {
            rate: convert_with(&unit, &entry.code, &snapshot.rates, MissingRatePolicy::Strict)
                .ok(),
            current: entry.code == snapshot.display_currency,
            entry,
        })
        .collect()
}

fn display_as_table(rows: &[SearchRow], snapshot: &RateSnapshot) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell(""),
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell(&format!("Per 1 {}", snapshot.display_currency)),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(if row.current { "*" } else { "" }),
            Cell::new(&row.entry.code),
            Cell::new(&row.entry.name),
            ui::format_optional_cell(row.rate, |v| format!("{v:.4}")),
        ]);
    }
    table.to_string()
}

/// Prints the currency selector for `query` against the loaded directory.
pub fn run(directory: &SymbolDirectory, query: &str, snapshot: &RateSnapshot) -> Result<()> {
    let rows = rows(directory.search(query), snapshot);
    println!("{}", display_as_table(&rows, snapshot));

    if !directory.is_loaded() {
        println!(
            "\n{}",
            ui::style_text(
                "Currency list unavailable, showing common currencies only.",
                ui::StyleType::Subtle
            )
        );
    }
    if let Some(note) = super::rate_note(snapshot.rates.is_fallback(), &[]) {
        println!("\n{note}");
    }
    Ok(())
}
