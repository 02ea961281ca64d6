//! The parameter-keyed query cache.
//!
//! Each read is stored under a [QueryKey] built from its full parameter tuple,
//! so different pages and filter combinations live side by side. Entries only
//! go stale when a mutation invalidates them (or, for caches with a stale time,
//! when they age out). Concurrent reads of the same key share one request.

use std::{
    collections::HashMap,
    fmt::Display,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{Error, retry::RetryPolicy};

/// A canonical cache key, made of path-like segments.
///
/// Keys are compared segment by segment, which is what prefix invalidation
/// matches on: `["transactions"]` is a prefix of
/// `["transactions", "list", "10", "0"]` but not of `["transaction", "abc"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Create a key from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The segments of the key.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether every segment of `prefix` matches the start of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// The outcome of a read, which never propagates an error.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// The read is not active for its parameters and issued no request.
    Disabled,
    /// The read succeeded.
    Ready(T),
    /// The read failed, after retries where the policy allows them.
    Failed(Error),
}

impl<T> QueryState<T> {
    /// The data, if the read succeeded.
    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Ready(data) => Some(data),
            _ => None,
        }
    }

    /// Take the data, if the read succeeded.
    pub fn into_data(self) -> Option<T> {
        match self {
            QueryState::Ready(data) => Some(data),
            _ => None,
        }
    }

    /// The error, if the read failed.
    pub fn error(&self) -> Option<&Error> {
        match self {
            QueryState::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the read was inert.
    pub fn is_disabled(&self) -> bool {
        matches!(self, QueryState::Disabled)
    }
}

impl<T> From<Result<T, Error>> for QueryState<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(data) => QueryState::Ready(data),
            Err(error) => QueryState::Failed(error),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
    stale: bool,
}

/// The fetch slot for one key.
///
/// The async mutex lets one fetch run at a time and holds the outcome of the
/// last one, so that callers who queued behind it get its result, errors
/// included, instead of fetching again.
#[derive(Debug)]
struct Flight<V> {
    outcome: tokio::sync::Mutex<Option<Result<V, Error>>>,
    completed: AtomicU64,
}

#[derive(Debug)]
struct FlightSlot<V> {
    flight: Arc<Flight<V>>,
    callers: usize,
}

/// Hands out one [Flight] per key for as long as someone is reading that key.
#[derive(Debug)]
struct QueryCoalescer<V> {
    flights: Mutex<HashMap<QueryKey, FlightSlot<V>>>,
}

impl<V> QueryCoalescer<V> {
    fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    fn join(&self, key: &QueryKey) -> FlightTicket<'_, V> {
        let mut flights = lock(&self.flights);
        let slot = flights.entry(key.clone()).or_insert_with(|| FlightSlot {
            flight: Arc::new(Flight {
                outcome: tokio::sync::Mutex::new(None),
                completed: AtomicU64::new(0),
            }),
            callers: 0,
        });
        slot.callers += 1;

        FlightTicket {
            coalescer: self,
            key: key.clone(),
            flight: Arc::clone(&slot.flight),
            joined_after: slot.flight.completed.load(Ordering::SeqCst),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.flights).len()
    }
}

/// A caller's place on a key's [Flight]. The slot is dropped with its last ticket.
struct FlightTicket<'a, V> {
    coalescer: &'a QueryCoalescer<V>,
    key: QueryKey,
    flight: Arc<Flight<V>>,
    /// How many fetches had finished when this caller arrived.
    joined_after: u64,
}

impl<V> FlightTicket<'_, V> {
    /// Whether a fetch finished after this caller arrived.
    fn missed_a_fetch(&self) -> bool {
        self.flight.completed.load(Ordering::SeqCst) > self.joined_after
    }
}

impl<V> Drop for FlightTicket<'_, V> {
    fn drop(&mut self) {
        let mut flights = lock(&self.coalescer.flights);
        let Some(slot) = flights.get_mut(&self.key) else {
            return;
        };

        slot.callers = slot.callers.saturating_sub(1);
        if slot.callers == 0 {
            flights.remove(&self.key);
        }
    }
}

/// A map from [QueryKey] to fetched value and staleness flag.
#[derive(Debug)]
pub struct QueryCache<V> {
    entries: Mutex<HashMap<QueryKey, CacheEntry<V>>>,
    fetching: Mutex<HashMap<QueryKey, usize>>,
    coalescer: QueryCoalescer<V>,
    /// Bumped on every invalidation so fetches that straddle one store a stale value.
    generation: AtomicU64,
    stale_time: Option<Duration>,
}

impl<V: Clone> QueryCache<V> {
    /// Create a cache whose entries stay fresh until invalidated.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a cache whose entries also go stale `stale_time` after they were fetched.
    pub fn with_stale_time(stale_time: Duration) -> Self {
        Self::build(Some(stale_time))
    }

    fn build(stale_time: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fetching: Mutex::new(HashMap::new()),
            coalescer: QueryCoalescer::new(),
            generation: AtomicU64::new(0),
            stale_time,
        }
    }

    /// Get the value for `key` from the cache, or fetch it with `fetcher`.
    ///
    /// The fetch goes through `retry`. If another call is already fetching the
    /// same key, this call waits for it and then shares its outcome, success or
    /// failure, instead of issuing a second request.
    ///
    /// # Errors
    ///
    /// Returns the error of the last fetch attempt. Failures are not cached.
    pub async fn fetch<F, Fut>(
        &self,
        key: &QueryKey,
        retry: &RetryPolicy,
        fetcher: F,
    ) -> Result<V, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, Error>>,
    {
        if let Some(value) = self.get_fresh(key) {
            tracing::trace!("cache hit for {key}");
            return Ok(value);
        }

        let ticket = self.coalescer.join(key);
        let mut outcome = ticket.flight.outcome.lock().await;

        if ticket.missed_a_fetch() {
            if let Some(shared) = outcome.as_ref() {
                tracing::trace!("sharing the outcome of an in-flight fetch for {key}");
                return shared.clone();
            }
        }

        // A value may have been stored without going through this key's flight.
        if let Some(value) = self.get_fresh(key) {
            tracing::trace!("cache hit for {key} after waiting for an in-flight fetch");
            return Ok(value);
        }

        tracing::debug!("cache miss for {key}, fetching");
        let _fetching = FetchingGuard::new(&self.fetching, key);
        let generation = self.generation.load(Ordering::SeqCst);
        let result = retry.run(fetcher).await;
        if let Ok(value) = &result {
            self.store(key, value.clone(), generation);
        }

        *outcome = Some(result.clone());
        ticket.flight.completed.fetch_add(1, Ordering::SeqCst);

        result
    }

    /// The cached value for `key` if it is present and fresh.
    pub fn get_fresh(&self, key: &QueryKey) -> Option<V> {
        let entries = lock(&self.entries);
        let entry = entries.get(key)?;

        if entry.stale || self.is_expired(entry) {
            return None;
        }

        Some(entry.value.clone())
    }

    /// The cached value for `key`, fresh or stale.
    pub fn peek(&self, key: &QueryKey) -> Option<V> {
        lock(&self.entries).get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` under `key` as fresh.
    pub fn set(&self, key: &QueryKey, value: V) {
        let generation = self.generation.load(Ordering::SeqCst);
        self.store(key, value, generation);
    }

    fn store(&self, key: &QueryKey, value: V, generation: u64) {
        let stale = generation != self.generation.load(Ordering::SeqCst);
        if stale {
            tracing::debug!("{key} was invalidated while it was being fetched");
        }

        lock(&self.entries).insert(
            key.clone(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                stale,
            },
        );
    }

    /// Whether a fetch for `key` is currently running.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        lock(&self.fetching).get(key).is_some_and(|count| *count > 0)
    }

    /// Whether `key` has a cached value, fresh or stale.
    pub fn contains(&self, key: &QueryKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Whether `key` has a cached value that the next read will refetch.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        lock(&self.entries)
            .get(key)
            .is_some_and(|entry| entry.stale || self.is_expired(entry))
    }

    /// Mark every entry whose key starts with `prefix` as stale.
    ///
    /// Stale entries stay in the cache until their next read refetches them.
    pub fn invalidate(&self, prefix: &QueryKey) {
        self.invalidate_where(|key| key.starts_with(prefix));
    }

    /// Mark every entry whose key matches `predicate` as stale.
    pub fn invalidate_where(&self, predicate: impl Fn(&QueryKey) -> bool) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut entries = lock(&self.entries);
        let mut count = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| predicate(*key)) {
            tracing::trace!("invalidating {key}");
            entry.stale = true;
            count += 1;
        }
        tracing::debug!("invalidated {count} cache entries");
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn remove(&self, prefix: &QueryKey) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).retain(|key, _| !key.starts_with(prefix));
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).clear();
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        self.stale_time
            .is_some_and(|stale_time| entry.fetched_at.elapsed() >= stale_time)
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts a key as fetching for as long as the guard lives, including when the
/// fetch future is dropped part way.
struct FetchingGuard<'a> {
    fetching: &'a Mutex<HashMap<QueryKey, usize>>,
    key: QueryKey,
}

impl<'a> FetchingGuard<'a> {
    fn new(fetching: &'a Mutex<HashMap<QueryKey, usize>>, key: &QueryKey) -> Self {
        *lock(fetching).entry(key.clone()).or_insert(0) += 1;

        Self {
            fetching,
            key: key.clone(),
        }
    }
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        let mut fetching = lock(self.fetching);
        if let Some(count) = fetching.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                fetching.remove(&self.key);
            }
        }
    }
}

/// Lock `mutex`, recovering the data if a previous holder panicked.
///
/// The maps only ever hold fully written entries, so a poisoned lock is safe to reuse.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::error!("recovering a poisoned cache lock");
        poisoned.into_inner()
    })
}
