use super::ui;
use crate::core::cache::RateSnapshot;
use crate::core::convert::{MissingRatePolicy, convert_with, missing_currencies};
use crate::core::currency::{CurrencyCode, MonetaryAmount};
use crate::core::ledger::{self, Account, TransactionFilter, TransactionKind};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub date: NaiveDate,
    pub account: String,
    pub description: String,
    pub category: String,
    pub kind: TransactionKind,
    /// Signed amount in the account currency.
    pub amount: MonetaryAmount,
    pub converted: Option<f64>,
}

pub fn rows(
    accounts: &[Account],
    snapshot: &RateSnapshot,
    policy: MissingRatePolicy,
    filter: &TransactionFilter,
) -> Vec<TransactionRow> {
    let to = &snapshot.display_currency;
    ledger::filtered_entries(accounts, filter)
        .into_iter()
        .map(|entry| {
            let amount = entry.transaction.signed_amount(&entry.account.currency);
            let converted = convert_with(&amount, to, &snapshot.rates, policy).ok();
            TransactionRow {
                date: entry.transaction.date,
                account: entry.account.name.clone(),
                description: entry.transaction.description.clone(),
                category: entry.transaction.category.clone(),
                kind: entry.transaction.kind,
                amount,
                converted,
            }
        })
        .collect()
}

fn display_as_table(rows: &[TransactionRow], currency: &CurrencyCode) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Account"),
        ui::header_cell("Description"),
        ui::header_cell("Category"),
        ui::header_cell("Amount"),
        ui::header_cell(&format!("Amount ({currency})")),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(row.date),
            Cell::new(&row.account),
            Cell::new(&row.description),
            Cell::new(format!("{} ({})", row.category, row.kind)),
            ui::amount_cell(row.amount.value),
            ui::optional_amount_cell(row.converted),
        ]);
    }
    table.to_string()
}

pub fn run(
    accounts: &[Account],
    snapshot: &RateSnapshot,
    policy: MissingRatePolicy,
    filter: &TransactionFilter,
) -> Result<()> {
    let rows = rows(accounts, snapshot, policy, filter);
    if rows.is_empty() {
        let message = if *filter == TransactionFilter::default() {
            "No transactions recorded."
        } else {
            "No transactions match the filter."
        };
        println!("{}", ui::style_text(message, ui::StyleType::Subtle));
        return Ok(());
    }

    println!("{}", display_as_table(&rows, &snapshot.display_currency));

    let amounts: Vec<MonetaryAmount> = rows.iter().map(|r| r.amount.clone()).collect();
    let missing = missing_currencies(&amounts, &snapshot.display_currency, &snapshot.rates);
    if let Some(note) = super::rate_note(snapshot.rates.is_fallback(), &missing) {
        println!("\n{note}");
    }
    Ok(())
}
