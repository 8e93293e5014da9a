use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;

use infrastructure::meter;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

use crate::core::time::{DateTime, Duration};
use crate::intuis::IntuisError;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: DateTime,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Time-bounded cache in front of an upstream fetch.
///
/// Fresh entries are served without calling out. Expired entries trigger a fetch; if that
/// fetch fails the expired entry is served instead and the error is only logged. Lookups
/// for the same key are serialised, so concurrent callers share a single fetch.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: Cache<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Display + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            //entries never expire inside moka, stale values are the fallback on failed fetches
            entries: Cache::builder().max_capacity(64).build(),
        }
    }

    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<IntuisError> + Display + Send + Sync + 'static,
    {
        self.get_or_fetch_entry(key, fetch).await.map(|entry| entry.value)
    }

    pub async fn get_or_fetch_entry<F, Fut, E>(&self, key: K, fetch: F) -> Result<CacheEntry<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<IntuisError> + Display + Send + Sync + 'static,
    {
        let ttl = self.ttl;
        let name = self.name;
        let key_label = key.to_string();

        let result = self
            .entries
            .entry(key)
            .and_try_compute_with(|existing| async move {
                let existing = existing.map(|e| e.into_value());

                if let Some(entry) = existing.as_ref().filter(|e| e.is_fresh(ttl)) {
                    tracing::trace!("{} cache hit for {}, age {}", name, key_label, entry.fetched_at.elapsed());
                    record(name, "hit");
                    return Ok(Op::Nop);
                }

                match fetch().await {
                    Ok(value) => {
                        record(name, "miss");
                        Ok(Op::Put(CacheEntry {
                            value,
                            fetched_at: DateTime::now(),
                        }))
                    }
                    Err(e) => match existing {
                        Some(stale) => {
                            tracing::warn!(
                                "Fetching {} for {} failed, serving cached value from {}: {}",
                                name,
                                key_label,
                                stale.fetched_at,
                                e
                            );
                            record(name, "stale");
                            Ok(Op::Nop)
                        }
                        None => {
                            record(name, "error");
                            Err(e)
                        }
                    },
                }
            })
            .await?;

        served_entry(self.name, result).map_err(E::from)
    }

    pub async fn invalidate(&self, key: &K) {
        tracing::debug!("Invalidating {} cache entry {}", self.name, key);
        self.entries.invalidate(key).await;
    }
}

/// Entry left in the cache after a compute. Every successful compute leaves one behind, a
/// missing entry is reported as no data.
fn served_entry<K, V>(name: &str, result: CompResult<K, CacheEntry<V>>) -> Result<CacheEntry<V>, IntuisError> {
    match result {
        CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) | CompResult::Unchanged(entry) => {
            Ok(entry.into_value())
        }
        CompResult::StillNone(_) | CompResult::Removed(_) => {
            tracing::error!("{} cache computed no entry", name);
            Err(IntuisError::no_data(name))
        }
    }
}

fn record(cache: &'static str, result: &'static str) {
    meter::increment("intuis_cache_lookups", &[("cache", cache), ("result", result)]);
}
