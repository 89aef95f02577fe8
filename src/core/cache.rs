//! Session-wide holder of the current rate table and display currency.
//!
//! State is replaced wholesale on every change and published to subscribers
//! as a [`RateSnapshot`]; readers never see a partially updated table.
//! Snapshots are delivered one at a time in generation order, whichever
//! thread made the change.
use crate::core::currency::{CurrencyCode, RateProvider, RateTable, fetch_rates_or_fallback};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Kind of state change delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// The rate table was replaced, including the first fetch completing.
    RatesReplaced,
    DisplayCurrencyChanged,
}

/// Consistent view of the cache at one generation.
#[derive(Debug, Clone)]
pub struct RateSnapshot {
    pub rates: Arc<RateTable>,
    pub display_currency: CurrencyCode,
    pub generation: u64,
    /// Set once a fetch result (or its fallback) has been applied.
    pub ready: bool,
}

type Listener = Arc<dyn Fn(&CacheEvent, &RateSnapshot) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Changes waiting to be delivered, oldest first.
#[derive(Default)]
struct Dispatch {
    pending: VecDeque<(CacheEvent, RateSnapshot)>,
    running: bool,
}

/// Clears `running` when a listener panics, so later changes still drain.
struct DispatchGuard<'a>(&'a Mutex<Dispatch>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).running = false;
        }
    }
}

/// Handle returned by [`RateCache::subscribe`].
///
/// Dropping the handle keeps the listener registered.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Removes the listener. Calling this more than once, or from inside a
    /// listener, is fine.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.listeners.retain(|(id, _)| *id != self.id);
            debug!(id = self.id, "Listener unsubscribed");
        }
    }
}

pub struct RateCache {
    base: CurrencyCode,
    state: RwLock<RateSnapshot>,
    registry: Arc<Mutex<Registry>>,
    dispatch: Mutex<Dispatch>,
}

impl RateCache {
    pub fn new(base: CurrencyCode) -> Self {
        let display = base.clone();
        Self::with_display_currency(base, display)
    }

    pub fn with_display_currency(base: CurrencyCode, display_currency: CurrencyCode) -> Self {
        let rates = Arc::new(RateTable::fallback(&base));
        Self {
            base,
            state: RwLock::new(RateSnapshot {
                rates,
                display_currency,
                generation: 0,
                ready: false,
            }),
            registry: Arc::new(Mutex::new(Registry::default())),
            dispatch: Mutex::new(Dispatch::default()),
        }
    }

    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    pub fn snapshot(&self) -> RateSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current rate table. Before the first fetch this is the base-only table.
    pub fn rates(&self) -> Arc<RateTable> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner).rates)
    }

    pub fn display_currency(&self) -> CurrencyCode {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .display_currency
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).ready
    }

    /// Accepts any code, known to the rate table or not.
    pub fn set_display_currency(&self, code: CurrencyCode) {
        info!(currency = %code, "Display currency changed");
        self.update(CacheEvent::DisplayCurrencyChanged, |state| {
            state.display_currency = code;
        });
    }

    /// Swaps in a new table. Rates are never merged with the previous table.
    pub fn replace_rates(&self, table: RateTable) {
        debug!(count = table.len(), fallback = table.is_fallback(), "Replacing rate table");
        self.update(CacheEvent::RatesReplaced, |state| {
            state.rates = Arc::new(table);
            state.ready = true;
        });
    }

    /// Registers `listener` for every later change.
    ///
    /// Listeners run on the thread that made the change, or on the thread
    /// already delivering an earlier one; they always observe generations in
    /// increasing order.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CacheEvent, &RateSnapshot) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        debug!(id, total = registry.listeners.len(), "Listener subscribed");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Starts the one-off initial fetch in the background.
    ///
    /// The result is applied even if nobody is waiting for it anymore.
    pub fn spawn_initial_fetch(
        self: &Arc<Self>,
        provider: Arc<dyn RateProvider>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let table = fetch_rates_or_fallback(provider.as_ref(), &cache.base).await;
            cache.replace_rates(table);
        })
    }

    /// Fetches again. On failure the current table is kept.
    #[instrument(name = "RateRefresh", skip(self, provider), fields(base = %self.base))]
    pub async fn refresh(&self, provider: &dyn RateProvider) -> Result<()> {
        let table = provider
            .fetch_rates(&self.base)
            .await
            .context("Failed to refresh exchange rates")?;
        self.replace_rates(table);
        Ok(())
    }

    /// Resolves once a rate table has been applied.
    pub async fn wait_until_ready(&self) {
        if self.is_ready() {
            return;
        }

        let notify = Arc::new(Notify::new());
        let subscription = {
            let notify = Arc::clone(&notify);
            self.subscribe(move |event, _| {
                if *event == CacheEvent::RatesReplaced {
                    notify.notify_one();
                }
            })
        };

        // notify_one stores a permit, so a change between subscribe and here is not lost
        if !self.is_ready() {
            notify.notified().await;
        }
        subscription.unsubscribe();
    }

    fn update(&self, event: CacheEvent, apply: impl FnOnce(&mut RateSnapshot)) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            apply(&mut *state);
            state.generation += 1;
            // Queued while the state lock is held, so queue order is generation order
            self.dispatch
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pending
                .push_back((event, state.clone()));
        }
        self.drain();
    }

    /// Delivers queued snapshots unless another call is already doing so.
    ///
    /// Changes made while a delivery is running, from a listener or another
    /// thread, are picked up by the running call and never recurse.
    fn drain(&self) {
        {
            let mut dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
            if dispatch.running {
                debug!(queued = dispatch.pending.len(), "Delivery in progress, change queued");
                return;
            }
            dispatch.running = true;
        }
        let _guard = DispatchGuard(&self.dispatch);

        loop {
            let (event, snapshot) = {
                let mut dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
                match dispatch.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        // Released under the same lock that saw the queue empty
                        dispatch.running = false;
                        return;
                    }
                }
            };
            self.notify(&event, &snapshot);
        }
    }

    fn notify(&self, event: &CacheEvent, snapshot: &RateSnapshot) {
        // Copy the list so listeners may (un)subscribe while being called
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        debug!(
            ?event,
            generation = snapshot.generation,
            listeners = listeners.len(),
            "Notifying subscribers"
        );
        for listener in listeners {
            listener(event, snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        rates: HashMap<String, f64>,
    }

    #[async_trait]
    impl RateProvider for StaticProvider {
        async fn fetch_rates(&self, base: &CurrencyCode) -> Result<RateTable> {
            Ok(RateTable::from_rates(base, self.rates.clone(), Utc::now()))
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl RateProvider for FailingProvider {
        async fn fetch_rates(&self, _base: &CurrencyCode) -> Result<RateTable> {
            Err(anyhow!("service unavailable"))
        }
    }

    fn sample_provider() -> StaticProvider {
        StaticProvider {
            rates: HashMap::from([("CAD".to_string(), 1.35), ("CNY".to_string(), 7.2)]),
        }
    }

    fn counter(cache: &RateCache) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let subscription = cache.subscribe(move |_, _| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, subscription)
    }

    #[test]
    fn test_initial_state_is_base_only() {
        let cache = RateCache::new("USD".into());
        let rates = cache.rates();
        assert_eq!(*rates, RateTable::fallback(&"USD".into()));
        assert_eq!(cache.display_currency(), CurrencyCode::new("USD"));
        assert!(!cache.is_ready());
        assert_eq!(cache.snapshot().generation, 0);
    }

    #[test]
    fn test_set_display_currency_accepts_unknown_code() {
        let cache = RateCache::new("USD".into());
        let (count, _sub) = counter(&cache);

        cache.set_display_currency("ZZZ".into());

        assert_eq!(cache.display_currency(), CurrencyCode::new("ZZZ"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Rates untouched by a selection change
        assert!(cache.rates().is_fallback());
    }

    #[test]
    fn test_every_listener_notified_once_per_change() {
        let cache = RateCache::new("USD".into());
        let subs: Vec<_> = (0..5).map(|_| counter(&cache)).collect();

        cache.set_display_currency("CAD".into());
        cache.set_display_currency("CAD".into());
        cache.replace_rates(RateTable::fallback(&"USD".into()));

        for (count, _) in &subs {
            assert_eq!(count.load(Ordering::SeqCst), 3);
        }
        assert_eq!(cache.snapshot().generation, 3);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let cache = RateCache::new("USD".into());
        let (removed, sub) = counter(&cache);
        let (kept, _kept_sub) = counter(&cache);

        sub.unsubscribe();
        sub.unsubscribe();
        cache.set_display_currency("CNY".into());

        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_from_inside_listener() {
        let cache = RateCache::new("USD".into());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_sub: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());

        let sub = {
            let calls = Arc::clone(&calls);
            let own_sub = Arc::clone(&own_sub);
            cache.subscribe(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(sub) = own_sub.get() {
                    sub.unsubscribe();
                }
            })
        };
        assert!(own_sub.set(sub).is_ok());
        let (other, _other_sub) = counter(&cache);

        cache.set_display_currency("CAD".into());
        cache.set_display_currency("CNY".into());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listeners_share_the_same_table() {
        let cache = RateCache::new("USD".into());
        let seen: Arc<Mutex<Vec<Arc<RateTable>>>> = Arc::new(Mutex::new(Vec::new()));

        let _subs: Vec<_> = (0..3)
            .map(|_| {
                let seen = Arc::clone(&seen);
                cache.subscribe(move |_, snapshot| {
                    seen.lock().unwrap().push(Arc::clone(&snapshot.rates));
                })
            })
            .collect();

        let raw = HashMap::from([("CAD".to_string(), 1.35)]);
        cache.replace_rates(RateTable::from_rates(&"USD".into(), raw, Utc::now()));

        let current = cache.rates();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|table| Arc::ptr_eq(table, &current)));
    }

    #[test]
    fn test_replace_rates_does_not_merge() {
        let cache = RateCache::new("USD".into());
        let first = HashMap::from([("CAD".to_string(), 1.35)]);
        cache.replace_rates(RateTable::from_rates(&"USD".into(), first, Utc::now()));
        let second = HashMap::from([("CNY".to_string(), 7.2)]);
        cache.replace_rates(RateTable::from_rates(&"USD".into(), second, Utc::now()));

        let rates = cache.rates();
        assert!(!rates.contains(&"CAD".into()));
        assert_eq!(rates.get(&"CNY".into()), Some(7.2));
    }

    #[test]
    fn test_listener_can_change_state_during_notification() {
        let cache = Arc::new(RateCache::new("USD".into()));
        let weak = Arc::downgrade(&cache);
        let _sub = cache.subscribe(move |event, _| {
            if *event == CacheEvent::RatesReplaced {
                if let Some(cache) = weak.upgrade() {
                    cache.set_display_currency("CAD".into());
                }
            }
        });

        cache.replace_rates(RateTable::fallback(&"USD".into()));
        assert_eq!(cache.display_currency(), CurrencyCode::new("CAD"));
    }

    #[test]
    fn test_concurrent_changes_are_delivered_in_generation_order() {
        let cache = Arc::new(RateCache::new("USD".into()));
        let delivered: Arc<Mutex<Vec<(u64, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let started_tx = Mutex::new(started_tx);

        let _sub = {
            let delivered = Arc::clone(&delivered);
            cache.subscribe(move |_, snapshot| {
                if snapshot.generation == 1 {
                    let _ = started_tx.lock().unwrap().send(());
                    std::thread::sleep(std::time::Duration::from_millis(200));
                }
                delivered
                    .lock()
                    .unwrap()
                    .push((snapshot.generation, snapshot.display_currency.to_string()));
            })
        };

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.set_display_currency("CAD".into()))
        };
        started_rx.recv().unwrap();
        // generation 1 is still being delivered on the other thread
        cache.set_display_currency("CNY".into());
        writer.join().unwrap();

        let delivered = delivered.lock().unwrap();
        assert_eq!(
            *delivered,
            vec![(1, "CAD".to_string()), (2, "CNY".to_string())]
        );
        assert_eq!(cache.display_currency(), CurrencyCode::new("CNY"));
    }

    #[test]
    fn test_change_from_listener_is_queued_not_nested() {
        let cache = Arc::new(RateCache::new("USD".into()));
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&cache);

        let _first = {
            let order = Arc::clone(&order);
            cache.subscribe(move |event, _| {
                order.lock().unwrap().push("first");
                if *event == CacheEvent::RatesReplaced {
                    if let Some(cache) = weak.upgrade() {
                        cache.set_display_currency("CAD".into());
                    }
                }
            })
        };
        let _second = {
            let order = Arc::clone(&order);
            cache.subscribe(move |_, _| order.lock().unwrap().push("second"))
        };

        cache.replace_rates(RateTable::fallback(&"USD".into()));

        // the display change reaches both listeners only after the rate change has
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "first", "second"]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_later_deliveries() {
        let cache = Arc::new(RateCache::new("USD".into()));
        let sub = cache.subscribe(|_, _| panic!("listener failed"));
        let (count, _counter) = counter(&cache);

        let cache_clone = Arc::clone(&cache);
        let result = std::thread::spawn(move || cache_clone.set_display_currency("CAD".into()))
            .join();
        assert!(result.is_err());

        sub.unsubscribe();
        cache.set_display_currency("CNY".into());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(cache.snapshot().generation, 2);
    }

    #[tokio::test]
    async fn test_initial_fetch_populates_cache() {
        let cache = Arc::new(RateCache::new("USD".into()));
        let (count, _sub) = counter(&cache);

        cache
            .spawn_initial_fetch(Arc::new(sample_provider()))
            .await
            .unwrap();

        assert!(cache.is_ready());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let rates = cache.rates();
        assert_eq!(rates.get(&"CAD".into()), Some(1.35));
        assert_eq!(rates.get(&"USD".into()), Some(1.0));
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_still_signals_ready() {
        let cache = Arc::new(RateCache::new("USD".into()));
        let (count, _sub) = counter(&cache);

        cache
            .spawn_initial_fetch(Arc::new(FailingProvider))
            .await
            .unwrap();

        assert!(cache.is_ready());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*cache.rates(), RateTable::fallback(&"USD".into()));
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let cache = Arc::new(RateCache::new("USD".into()));
        let _handle = cache.spawn_initial_fetch(Arc::new(sample_provider()));

        cache.wait_until_ready().await;

        assert!(cache.is_ready());
        assert!(!cache.rates().is_fallback());
        // Returns immediately once ready
        cache.wait_until_ready().await;
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_fetched_table() {
        let cache = RateCache::new("USD".into());
        cache.refresh(&sample_provider()).await.unwrap();
        let before = cache.rates();

        let result = cache.refresh(&FailingProvider).await;

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to refresh exchange rates")
        );
        assert!(Arc::ptr_eq(&before, &cache.rates()));
    }
}
