use anyhow::Result;
use casho::cli::setup::setup;
use casho::core::ledger::{StatsPeriod, TransactionFilter, TransactionKind};
use casho::core::log::init_logging;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Display currency for this run, e.g. CAD
    #[arg(long, global = true)]
    currency: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display income, expenses and balances in the display currency
    Dashboard {
        /// Window for income and expense totals: week, month or year
        #[arg(long, default_value = "month")]
        period: StatsPeriod,
    },
    /// List transactions, newest first
    Transactions {
        /// Only show income or expense
        #[arg(long)]
        kind: Option<TransactionKind>,
        /// Only show this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Search currencies by code or name
    Search {
        /// Part of a currency code or name; empty lists common currencies
        #[arg(default_value = "")]
        query: String,
    },
    /// Display the current exchange rate table
    Rates,
    /// Convert an amount between currencies
    Convert {
        #[arg(allow_negative_numbers = true)]
        value: f64,
        from: String,
        /// Target currency; defaults to the display currency
        #[arg(long)]
        to: Option<String>,
    },
}

impl Commands {
    fn into_app_command(self) -> Option<casho::AppCommand> {
        let command = match self {
            Commands::Setup => return None,
            Commands::Dashboard { period } => casho::AppCommand::Dashboard { period },
            Commands::Transactions { kind, category } => casho::AppCommand::Transactions {
                filter: TransactionFilter { kind, category },
            },
            Commands::Search { query } => casho::AppCommand::Search { query },
            Commands::Rates => casho::AppCommand::Rates,
            Commands::Convert { value, from, to } => casho::AppCommand::Convert { value, from, to },
        };
        Some(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command.map(Commands::into_app_command) {
        Some(Some(command)) => {
            casho::run_command(command, cli.config_path.as_deref(), cli.currency.as_deref()).await
        }
        Some(None) => setup(),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
