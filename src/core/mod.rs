//! Rate cache, conversion engine and the data they operate on

pub mod cache;
pub mod config;
pub mod convert;
pub mod currency;
pub mod ledger;
pub mod log;
pub mod symbols;

// Re-export main types for cleaner imports
pub use cache::{CacheEvent, RateCache, RateSnapshot, Subscription};
pub use convert::{
    ConversionError, MissingRatePolicy, aggregate, aggregate_with, convert, convert_with,
};
pub use currency::{CurrencyCode, MonetaryAmount, RateProvider, RateSource, RateTable};
pub use symbols::{SymbolDirectory, SymbolEntry, SymbolProvider};
