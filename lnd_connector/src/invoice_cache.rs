use serde::{Deserialize, Serialize};
use slog as log;
use slog::Logger;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use utils::time::time_now_secs;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InvoiceCacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    120
}

fn default_cleanup_interval_secs() -> u64 {
    113
}

impl Default for InvoiceCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvoice {
    pub add_index: String,
    /// Unix seconds.
    pub created_at: u64,
    pub request: String,
}

/// Invoices issued for zap requests and not yet settled, keyed by LND's
/// `add_index`.
#[derive(Debug, Clone, Default)]
pub struct InvoiceCache {
    inner: Arc<Mutex<HashMap<String, PendingInvoice>>>,
}

impl InvoiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingInvoice>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, add_index: &str, request: &str) {
        self.put_at(add_index, request, time_now_secs())
    }

    pub fn put_at(&self, add_index: &str, request: &str, created_at: u64) {
        let invoice = PendingInvoice {
            add_index: add_index.to_string(),
            created_at,
            request: request.to_string(),
        };
        self.lock().insert(invoice.add_index.clone(), invoice);
    }

    /// Removes and returns the entry. Of several concurrent callers for the
    /// same key exactly one gets `Some`.
    pub fn take_if_present(&self, add_index: &str) -> Option<PendingInvoice> {
        self.lock().remove(add_index)
    }

    /// Drops every entry with `created_at + ttl < now`.
    pub fn evict_expired(&self, now: u64, ttl: u64) -> Vec<PendingInvoice> {
        let cutoff = now.saturating_sub(ttl);
        let mut evicted = Vec::new();
        self.lock().retain(|_, invoice| {
            if invoice.created_at < cutoff {
                evicted.push(invoice.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    pub fn contains(&self, add_index: &str) -> bool {
        self.lock().contains_key(add_index)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

pub fn spawn_invoice_janitor(cache: InvoiceCache, settings: InvoiceCacheSettings, logger: Logger) -> JoinHandle<()> {
    let period = Duration::from_secs(settings.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let before = cache.len();
            let evicted = cache.evict_expired(time_now_secs(), settings.ttl_secs);
            for invoice in evicted.iter() {
                log::debug!(logger, "Dropping invoice {} from cache", invoice.add_index);
            }
            log::debug!(logger, "Invoice cache length {} -> {}", before, cache.len());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn take_removes_entry_once() {
        let cache = InvoiceCache::new();
        cache.put("1", "{}");
        assert!(cache.contains("1"));
        let taken = cache.take_if_present("1").unwrap();
        assert_eq!(taken.request, "{}");
        assert!(cache.take_if_present("1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_takes_have_one_winner() {
        const THREADS: usize = 16;
        let cache = InvoiceCache::new();
        cache.put("42", "zap");
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.take_if_present("42").is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_respects_ttl() {
        let cache = InvoiceCache::new();
        let now = 1_700_000_000;
        cache.put_at("old", "a", now - 121);
        cache.put_at("edge", "b", now - 120);
        cache.put_at("young", "c", now - 5);

        let evicted = cache.evict_expired(now, 120);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].add_index, "old");
        assert!(cache.take_if_present("old").is_none());
        assert!(cache.contains("edge"));
        assert!(cache.contains("young"));

        assert!(cache.evict_expired(0, 120).is_empty());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_evicts_on_interval() {
        let cache = InvoiceCache::new();
        cache.put_at("stale", "a", time_now_secs() - 500);
        cache.put("fresh", "b");

        let handle = spawn_invoice_janitor(cache.clone(), InvoiceCacheSettings::default(), utils::xlogging::discard());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(Duration::from_secs(110)).await;
        assert!(!cache.contains("stale"));
        assert!(cache.contains("fresh"));
        handle.abort();
    }
}
