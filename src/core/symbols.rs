//! Known currency codes and names, used by the currency selector.
use crate::core::currency::CurrencyCode;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub code: CurrencyCode,
    pub name: String,
}

impl SymbolEntry {
    pub fn new(code: &str, name: &str) -> Self {
        SymbolEntry {
            code: CurrencyCode::new(code),
            name: name.to_string(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.code.as_str().to_lowercase().contains(needle)
            || self.name.to_lowercase().contains(needle)
    }
}

/// Common currencies that are always offered first.
pub fn default_symbols() -> Vec<SymbolEntry> {
    vec![
        SymbolEntry::new("USD", "US Dollar"),
        SymbolEntry::new("CAD", "Canadian Dollar"),
        SymbolEntry::new("CNY", "Chinese Yuan"),
    ]
}

#[async_trait]
pub trait SymbolProvider: Send + Sync {
    async fn fetch_symbols(&self) -> Result<Vec<SymbolEntry>>;
}

/// Case-insensitive search over codes and names.
///
/// A blank query returns only the default set. Otherwise the default set comes
/// first, followed by matching entries whose code is not a default.
pub fn search(query: &str, entries: &[SymbolEntry]) -> Vec<SymbolEntry> {
    let defaults = default_symbols();
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return defaults;
    }

    let extra: Vec<SymbolEntry> = entries
        .iter()
        .filter(|entry| entry.matches(&needle))
        .filter(|entry| !defaults.iter().any(|d| d.code == entry.code))
        .cloned()
        .collect();

    defaults.into_iter().chain(extra).collect()
}

/// Session cache of the full symbol list.
///
/// Serves [`default_symbols`] until the first successful fetch, which is then
/// kept for the session. Concurrent callers share a single request.
pub struct SymbolDirectory {
    defaults: Arc<Vec<SymbolEntry>>,
    fetched: OnceCell<Arc<Vec<SymbolEntry>>>,
}

impl SymbolDirectory {
    pub fn new() -> Self {
        Self {
            defaults: Arc::new(default_symbols()),
            fetched: OnceCell::new(),
        }
    }

    pub fn entries(&self) -> Arc<Vec<SymbolEntry>> {
        Arc::clone(self.fetched.get().unwrap_or(&self.defaults))
    }

    pub fn is_loaded(&self) -> bool {
        self.fetched.initialized()
    }

    /// Fetches the full list once. Later calls are served from the cache.
    ///
    /// A failed fetch is not cached, so the next call tries again.
    pub async fn fetch_all_symbols(
        &self,
        provider: &dyn SymbolProvider,
    ) -> Arc<Vec<SymbolEntry>> {
        if let Some(entries) = self.fetched.get() {
            debug!("Symbol directory cache HIT");
            return Arc::clone(entries);
        }

        let result = self
            .fetched
            .get_or_try_init(|| async {
                debug!("Symbol directory cache MISS");
                let mut fetched = provider.fetch_symbols().await?;
                fetched.sort_by(|a, b| a.code.cmp(&b.code));
                debug!(count = fetched.len(), "Fetched currency symbols");
                Ok::<_, anyhow::Error>(Arc::new(fetched))
            })
            .await;

        match result {
            Ok(entries) => Arc::clone(entries),
            Err(e) => {
                warn!(error = %e, "Failed to fetch currency symbols, keeping defaults");
                Arc::clone(&self.defaults)
            }
        }
    }

    pub fn search(&self, query: &str) -> Vec<SymbolEntry> {
        search(query, &self.entries())
    }
}

impl Default for SymbolDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockSymbolProvider {
        call_count: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl MockSymbolProvider {
        fn new(fail: bool) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                fail,
                delay: Duration::ZERO,
            }
        }

        fn slow() -> Self {
            Self {
                delay: Duration::from_millis(50),
                ..Self::new(false)
            }
        }
    }

    #[async_trait]
    impl SymbolProvider for MockSymbolProvider {
        async fn fetch_symbols(&self) -> Result<Vec<SymbolEntry>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(anyhow!("timeout"));
            }
            Ok(vec![
                SymbolEntry::new("USD", "United States Dollar"),
                SymbolEntry::new("EUR", "Euro"),
                SymbolEntry::new("AUD", "Australian Dollar"),
                SymbolEntry::new("JPY", "Japanese Yen"),
            ])
        }
    }

    fn codes(entries: &[SymbolEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.code.as_str()).collect()
    }

    #[test]
    fn test_blank_query_returns_defaults() {
        let all = vec![SymbolEntry::new("EUR", "Euro")];
        assert_eq!(codes(&search("", &all)), vec!["USD", "CAD", "CNY"]);
        assert_eq!(codes(&search("   ", &all)), vec!["USD", "CAD", "CNY"]);
    }

    #[test]
    fn test_search_matches_code_and_name_case_insensitively() {
        let all = vec![
            SymbolEntry::new("EUR", "Euro"),
            SymbolEntry::new("AUD", "Australian Dollar"),
            SymbolEntry::new("JPY", "Japanese Yen"),
        ];
        assert_eq!(codes(&search("eu", &all)), vec!["USD", "CAD", "CNY", "EUR"]);
        assert_eq!(codes(&search("DOLLAR", &all)), vec!["USD", "CAD", "CNY", "AUD"]);
        assert_eq!(codes(&search("yen", &all)), vec!["USD", "CAD", "CNY", "JPY"]);
    }

    #[test]
    fn test_defaults_take_precedence_over_duplicates() {
        let all = vec![
            SymbolEntry::new("USD", "United States Dollar"),
            SymbolEntry::new("AUD", "Australian Dollar"),
        ];
        let results = search("dollar", &all);
        assert_eq!(codes(&results), vec!["USD", "CAD", "CNY", "AUD"]);
        assert_eq!(results[0].name, "US Dollar");
    }

    #[test]
    fn test_no_match_still_lists_defaults() {
        let all = vec![SymbolEntry::new("EUR", "Euro")];
        assert_eq!(codes(&search("xyz", &all)), vec!["USD", "CAD", "CNY"]);
    }

    #[tokio::test]
    async fn test_directory_fetches_once() {
        let directory = SymbolDirectory::new();
        let provider = MockSymbolProvider::new(false);

        let first = directory.fetch_all_symbols(&provider).await;
        let second = directory.fetch_all_symbols(&provider).await;

        assert_eq!(provider.call_count.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(codes(&first), vec!["AUD", "EUR", "JPY", "USD"]);
        assert!(directory.is_loaded());
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let directory = SymbolDirectory::new();
        let provider = MockSymbolProvider::slow();

        let (first, second) = tokio::join!(
            directory.fetch_all_symbols(&provider),
            directory.fetch_all_symbols(&provider)
        );

        assert_eq!(provider.call_count.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &directory.entries()));
    }

    #[tokio::test]
    async fn test_directory_retries_after_failure() {
        let directory = SymbolDirectory::new();
        directory
            .fetch_all_symbols(&MockSymbolProvider::new(true))
            .await;
        assert!(!directory.is_loaded());

        let provider = MockSymbolProvider::new(false);
        let entries = directory.fetch_all_symbols(&provider).await;
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 1);
        assert_eq!(entries.len(), 4);
        assert!(directory.is_loaded());
    }

    #[tokio::test]
    async fn test_directory_keeps_defaults_on_failure() {
        let directory = SymbolDirectory::new();
        let provider = MockSymbolProvider::new(true);

        let entries = directory.fetch_all_symbols(&provider).await;

        assert_eq!(*entries, default_symbols());
        assert!(!directory.is_loaded());
        assert_eq!(codes(&directory.search("euro")), vec!["USD", "CAD", "CNY"]);
    }

    #[tokio::test]
    async fn test_directory_search_uses_fetched_entries() {
        let directory = SymbolDirectory::new();
        directory
            .fetch_all_symbols(&MockSymbolProvider::new(false))
            .await;

        assert_eq!(
            codes(&directory.search("euro")),
            vec!["USD", "CAD", "CNY", "EUR"]
        );
    }
}
