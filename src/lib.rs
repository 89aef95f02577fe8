pub mod cli;
pub mod core;
pub mod providers;

use crate::cli::ui;
use crate::core::cache::RateCache;
use crate::core::config::AppConfig;
use crate::core::currency::{CurrencyCode, MonetaryAmount, RateProvider, RateTable};
use crate::core::ledger::{StatsPeriod, TransactionFilter};
use crate::core::symbols::SymbolDirectory;
use crate::providers::ExchangeRateHostProvider;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Dashboard {
        period: StatsPeriod,
    },
    Transactions {
        filter: TransactionFilter,
    },
    Search {
        query: String,
    },
    Rates,
    Convert {
        value: f64,
        from: String,
        to: Option<String>,
    },
}

/// Runs the initial fetch and waits for the cache to become ready.
async fn load_rates(cache: &Arc<RateCache>, provider: Arc<dyn RateProvider>) {
    let spinner = ui::new_spinner("Fetching exchange rates...");
    let handle = cache.spawn_initial_fetch(provider);
    if let Err(e) = handle.await {
        warn!(error = %e, "Rate fetch task failed, using fallback rates");
        cache.replace_rates(RateTable::fallback(cache.base()));
    }
    cache.wait_until_ready().await;
    spinner.finish_and_clear();
}

pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
    display_currency: Option<&str>,
) -> Result<()> {
    info!("casho starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load_or_default()?,
    };
    debug!("Loaded config: {config:#?}");

    let provider_config = config.exchangerate_host();
    let provider = Arc::new(ExchangeRateHostProvider::new(
        &provider_config.base_url,
        provider_config.access_key,
    ));

    let cache = Arc::new(RateCache::with_display_currency(
        config.base_currency.clone(),
        config.initial_display_currency(),
    ));
    let _logger = cache.subscribe(|event, snapshot| {
        debug!(
            ?event,
            generation = snapshot.generation,
            display = %snapshot.display_currency,
            fallback = snapshot.rates.is_fallback(),
            "Rate cache updated"
        );
    });
    if let Some(code) = display_currency {
        cache.set_display_currency(CurrencyCode::new(code));
    }

    let policy = config.missing_rate_policy;
    let rate_provider: Arc<dyn RateProvider> = provider.clone();

    let directory = SymbolDirectory::new();
    if matches!(command, AppCommand::Search { .. }) {
        let (symbols, ()) = futures::join!(
            directory.fetch_all_symbols(provider.as_ref()),
            load_rates(&cache, rate_provider)
        );
        debug!(count = symbols.len(), "Currency directory ready");
    } else {
        load_rates(&cache, rate_provider).await;
    }
    let snapshot = cache.snapshot();

    match command {
        AppCommand::Dashboard { period } => cli::dashboard::run(
            &config.accounts,
            &snapshot,
            policy,
            period,
            chrono::Local::now().date_naive(),
        ),
        AppCommand::Transactions { filter } => {
            cli::transactions::run(&config.accounts, &snapshot, policy, &filter)
        }
        AppCommand::Search { query } => cli::search::run(&directory, &query, &snapshot),
        AppCommand::Rates => cli::rates::run(&snapshot),
        AppCommand::Convert { value, from, to } => cli::convert::run(
            MonetaryAmount::new(value, from),
            to.map(CurrencyCode::from),
            &snapshot,
            policy,
        ),
    }
}
