//! Read-model cache with in-flight request deduplication.
//!
//! # Invariants
//! - At most one loader runs per key at a time; concurrent callers for the
//!   same key block until it finishes and share its value.
//! - Failed loads are never stored; a waiter whose loader failed retries.
//! - `invalidate_all` bumps a generation so a load that started before the
//!   invalidation cannot repopulate the cache with stale data.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// Served by another caller's in-flight load.
    Shared,
}

impl CacheOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Shared => "shared",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub shared: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, (Instant, V)>,
    in_flight: HashSet<K>,
    generation: u64,
    stats: CacheStats,
}

pub struct RequestCache<K, V> {
    name: &'static str,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
    ready: Condvar,
}

impl<K, V> RequestCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashSet::new(),
                generation: 0,
                stats: CacheStats::default(),
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get_or_load<E, F>(&self, key: K, load: F) -> Result<(V, CacheOutcome), E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut waited = false;
        let mut guard = self.lock();
        let generation = loop {
            if let Some((at, v)) = guard.entries.get(&key) {
                if at.elapsed() < self.ttl {
                    let v = v.clone();
                    let outcome = if waited {
                        guard.stats.shared += 1;
                        CacheOutcome::Shared
                    } else {
                        guard.stats.hits += 1;
                        CacheOutcome::Hit
                    };
                    tracing::debug!(cache = self.name, key = ?key, outcome = outcome.as_str(), "cache lookup");
                    return Ok((v, outcome));
                }
                guard.entries.remove(&key);
            }
            if guard.in_flight.contains(&key) {
                waited = true;
                guard = self.ready.wait(guard).unwrap_or_else(|p| p.into_inner());
                continue;
            }
            guard.in_flight.insert(key.clone());
            guard.stats.misses += 1;
            break guard.generation;
        };
        drop(guard);

        tracing::debug!(cache = self.name, key = ?key, outcome = "miss", "cache lookup");
        let result = load();

        let mut guard = self.lock();
        guard.in_flight.remove(&key);
        if let Ok(v) = &result {
            if guard.generation == generation {
                guard.entries.insert(key, (Instant::now(), v.clone()));
            }
        }
        drop(guard);
        self.ready.notify_all();
        result.map(|v| (v, CacheOutcome::Miss))
    }

    pub fn invalidate(&self, key: &K) {
        self.lock().entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.generation += 1;
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
