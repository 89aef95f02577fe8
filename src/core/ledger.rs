//! Accounts and transactions supplied by the surrounding application.
//!
//! The conversion engine only sees them as [`MonetaryAmount`]s in the
//! account's native currency.
use crate::core::currency::{CurrencyCode, MonetaryAmount};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TransactionKind::Income => "Income",
                TransactionKind::Expense => "Expense",
            }
        )
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!("Unknown transaction kind: {other} (expected income or expense)")),
        }
    }
}

/// Trailing window that income and expense statistics cover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Week,
    #[default]
    Month,
    Year,
}

impl StatsPeriod {
    pub fn days(self) -> u64 {
        match self {
            StatsPeriod::Week => 7,
            StatsPeriod::Month => 30,
            StatsPeriod::Year => 365,
        }
    }

    /// The window ending on `today`, both ends inclusive.
    pub fn ending(self, today: NaiveDate) -> DateRange {
        DateRange {
            start: today
                .checked_sub_days(Days::new(self.days()))
                .unwrap_or(NaiveDate::MIN),
            end: today,
        }
    }
}

impl Display for StatsPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "last {} days", self.days())
    }
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            "year" => Ok(StatsPeriod::Year),
            other => Err(format!("Unknown period: {other} (expected week, month or year)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Narrows a transaction listing. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    /// Compared case-insensitively.
    pub category: Option<String>,
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.kind.is_none_or(|kind| transaction.kind == kind)
            && self.category.as_deref().is_none_or(|category| {
                transaction.category.trim().to_lowercase() == category.trim().to_lowercase()
            })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Transaction {
    #[serde(default)]
    pub description: String,
    /// Always positive; the direction comes from `kind`.
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
    pub date: NaiveDate,
}

impl Transaction {
    /// Unsigned amount in the given currency.
    pub fn monetary_amount(&self, currency: &CurrencyCode) -> MonetaryAmount {
        MonetaryAmount::new(self.amount, currency.clone())
    }

    /// Amount with expenses negated, for balances.
    pub fn signed_amount(&self, currency: &CurrencyCode) -> MonetaryAmount {
        let value = match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        };
        MonetaryAmount::new(value, currency.clone())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Account {
    pub name: String,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub opening_balance: f64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Account {
    /// Opening balance plus incomes minus expenses, in the native currency.
    pub fn balance(&self) -> MonetaryAmount {
        let movement: f64 = self
            .transactions
            .iter()
            .map(|t| t.signed_amount(&self.currency).value)
            .sum();
        MonetaryAmount::new(self.opening_balance + movement, self.currency.clone())
    }

    /// Transactions dated within `range`.
    pub fn transactions_in(&self, range: DateRange) -> impl Iterator<Item = &Transaction> + '_ {
        self.transactions
            .iter()
            .filter(move |t| range.contains(t.date))
    }

    /// Unsigned amounts of the given kind dated within `range`.
    pub fn amounts(
        &self,
        kind: TransactionKind,
        range: DateRange,
    ) -> impl Iterator<Item = MonetaryAmount> + '_ {
        self.transactions_in(range)
            .filter(move |t| t.kind == kind)
            .map(move |t| t.monetary_amount(&self.currency))
    }
}

/// A transaction paired with the account it belongs to.
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub account: &'a Account,
    pub transaction: &'a Transaction,
}

/// Transactions across accounts that pass `filter`, newest first.
pub fn filtered_entries<'a>(
    accounts: &'a [Account],
    filter: &TransactionFilter,
) -> Vec<LedgerEntry<'a>> {
    let mut entries = entries(accounts);
    entries.retain(|entry| filter.matches(entry.transaction));
    entries
}

/// All transactions across accounts, newest first.
pub fn entries(accounts: &[Account]) -> Vec<LedgerEntry<'_>> {
    let mut entries: Vec<LedgerEntry<'_>> = accounts
        .iter()
        .flat_map(|account| {
            account
                .transactions
                .iter()
                .map(move |transaction| LedgerEntry {
                    account,
                    transaction,
                })
        })
        .collect();
    entries.sort_by(|a, b| b.transaction.date.cmp(&a.transaction.date));
    entries
}
