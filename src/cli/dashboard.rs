use super::ui;
use crate::core::cache::RateSnapshot;
use crate::core::convert::{MissingRatePolicy, aggregate_with, convert_with, missing_currencies};
use crate::core::currency::{CurrencyCode, MonetaryAmount};
use crate::core::ledger::{Account, StatsPeriod, TransactionKind};
use chrono::NaiveDate;
use anyhow::Result;
use comfy_table::Cell;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AccountBalance {
    pub name: String,
    pub balance: MonetaryAmount,
    pub converted: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CategoryTotal {
    pub name: String,
    pub kind: TransactionKind,
    pub total: Option<f64>,
}

/// Dashboard figures, all expressed in the display currency.
///
/// Income, expense and category totals cover `period`; balances and net
/// worth cover every transaction. A `None` total means the strict policy
/// rejected a missing rate.
#[derive(Debug)]
pub struct DashboardSummary {
    pub currency: CurrencyCode,
    pub period: StatsPeriod,
    pub income_total: Option<f64>,
    pub expense_total: Option<f64>,
    /// Income minus expenses over the period.
    pub net_flow: Option<f64>,
    pub net_worth: Option<f64>,
    pub accounts: Vec<AccountBalance>,
    pub categories: Vec<CategoryTotal>,
    pub missing_rates: Vec<CurrencyCode>,
    pub fallback_rates: bool,
}

pub fn summarize(
    accounts: &[Account],
    snapshot: &RateSnapshot,
    policy: MissingRatePolicy,
    period: StatsPeriod,
    today: NaiveDate,
) -> DashboardSummary {
    let to = &snapshot.display_currency;
    let rates = snapshot.rates.as_ref();
    let range = period.ending(today);

    let total_of = |kind: TransactionKind| {
        let amounts: Vec<MonetaryAmount> = accounts
            .iter()
            .flat_map(|a| a.amounts(kind, range))
            .collect();
        aggregate_with(&amounts, to, rates, policy).ok()
    };

    let balances: Vec<MonetaryAmount> = accounts.iter().map(Account::balance).collect();
    let account_rows = accounts
        .iter()
        .zip(&balances)
        .map(|(account, balance)| AccountBalance {
            name: account.name.clone(),
            balance: balance.clone(),
            converted: convert_with(balance, to, rates, policy).ok(),
        })
        .collect();

    let mut by_category: BTreeMap<(TransactionKind, String), Vec<MonetaryAmount>> =
        BTreeMap::new();
    for account in accounts {
        for transaction in account.transactions_in(range) {
            by_category
                .entry((transaction.kind, transaction.category.clone()))
                .or_default()
                .push(transaction.monetary_amount(&account.currency));
        }
    }
    let categories = by_category
        .into_iter()
        .map(|((kind, name), amounts)| CategoryTotal {
            name,
            kind,
            total: aggregate_with(&amounts, to, rates, policy).ok(),
        })
        .collect();

    let all_amounts = accounts
        .iter()
        .flat_map(|a| a.transactions.iter().map(|t| t.monetary_amount(&a.currency)))
        .chain(balances.iter().cloned())
        .collect::<Vec<_>>();

    let income_total = total_of(TransactionKind::Income);
    let expense_total = total_of(TransactionKind::Expense);
    let summary = DashboardSummary {
        currency: to.clone(),
        period,
        income_total,
        expense_total,
        net_flow: income_total.zip(expense_total).map(|(i, e)| i - e),
        net_worth: aggregate_with(&balances, to, rates, policy).ok(),
        accounts: account_rows,
        categories,
        missing_rates: missing_currencies(&all_amounts, to, rates),
        fallback_rates: rates.is_fallback(),
    };
    debug!(?summary, "Computed dashboard summary");
    summary
}

impl DashboardSummary {
    pub fn display_as_table(&self) -> String {
        let currency = &self.currency;
        let fmt = |v: Option<f64>| v.map_or("N/A".to_string(), |v| format!("{v:.2}"));

        let mut output = format!(
            "{}\n\n",
            ui::style_text(
                &format!("Dashboard ({currency}, {})", self.period),
                ui::StyleType::Title
            )
        );
        output.push_str(&format!(
            "Income: {}   Expenses: {}   Net: {}\nNet Worth: {}\n\n",
            ui::style_text(&fmt(self.income_total), ui::StyleType::TotalValue),
            ui::style_text(&fmt(self.expense_total), ui::StyleType::Error),
            ui::style_text(&fmt(self.net_flow), ui::StyleType::TotalLabel),
            ui::style_text(&fmt(self.net_worth), ui::StyleType::TotalLabel),
        ));

        let mut accounts = ui::new_styled_table();
        accounts.set_header(vec![
            ui::header_cell("Account"),
            ui::header_cell("Balance"),
            ui::header_cell(&format!("Balance ({currency})")),
        ]);
        for row in &self.accounts {
            accounts.add_row(vec![
                Cell::new(&row.name),
                Cell::new(row.balance.to_string()),
                ui::format_optional_cell(row.converted, |v| format!("{v:.2}")),
            ]);
        }
        output.push_str(&accounts.to_string());

        if !self.categories.is_empty() {
            let mut categories = ui::new_styled_table();
            categories.set_header(vec![
                ui::header_cell("Category"),
                ui::header_cell("Type"),
                ui::header_cell(&format!("Total ({currency})")),
            ]);
            for row in &self.categories {
                categories.add_row(vec![
                    Cell::new(&row.name),
                    Cell::new(row.kind.to_string()),
                    ui::format_optional_cell(row.total, |v| format!("{v:.2}")),
                ]);
            }
            output.push_str("\n\n");
            output.push_str(&categories.to_string());
        }

        if let Some(note) = super::rate_note(self.fallback_rates, &self.missing_rates) {
            output.push_str("\n\n");
            output.push_str(&note);
        }
        output
    }
}

pub fn run(
    accounts: &[Account],
    snapshot: &RateSnapshot,
    policy: MissingRatePolicy,
    period: StatsPeriod,
    today: NaiveDate,
) -> Result<()> {
    if accounts.is_empty() {
        println!(
            "{}",
            ui::style_text("No accounts configured.", ui::StyleType::Subtle)
        );
        return Ok(());
    }

    let summary = summarize(accounts, snapshot, policy, period, today);
    println!("{}", summary.display_as_table());
    Ok(())
}
