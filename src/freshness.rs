//! Time-windowed cache in front of every fetch.
//!
//! Each key moves through `Empty -> Fresh -> Stale -> Fresh ...`. A fresh
//! record is returned without touching the network; a stale or empty one is
//! refetched, and a failed refetch leaves the last good payload in place so
//! callers can still show it.
//!
//! Overlapping requests for one key share a single fetch: the first request
//! leads and publishes its outcome, success or failure, on a per-key `watch`
//! channel that later arrivals wait on. A request whose future is dropped
//! mid-fetch commits nothing, and its waiters retry. Records live in a
//! capacity-bounded cache.

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataClass {
    Weather,
    AiSummary(String),
}

impl DataClass {
    pub fn ai(kind: &str) -> Self {
        DataClass::AiSummary(kind.to_string())
    }
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataClass::Weather => f.write_str("weather"),
            DataClass::AiSummary(kind) => write!(f, "aiSummary:{}", kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Empty,
    Fresh,
    Stale,
}

#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    pub weather: Duration,
    pub ai_default: Duration,
    pub ai_windows: HashMap<String, Duration>,
    pub fetch_timeout: Duration,
    pub max_records: u64,
}

impl FreshnessPolicy {
    pub fn window_for(&self, class: &DataClass) -> Duration {
        match class {
            DataClass::Weather => self.weather,
            DataClass::AiSummary(kind) => self.ai_windows.get(kind).copied().unwrap_or(self.ai_default),
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            weather: Duration::from_secs(5 * 60),
            ai_default: Duration::from_secs(60 * 60),
            ai_windows: HashMap::new(),
            fetch_timeout: Duration::from_secs(30),
            max_records: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct FreshnessRecord<T> {
    fetched_at: DateTime<Utc>,
    payload: T,
    invalidated: bool,
}

/// A payload handed out by the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Gated<T> {
    pub payload: T,
    pub fetched_at: DateTime<Utc>,
    pub from_cache: bool,
}

#[derive(Error, Debug)]
pub enum FetchError<E> {
    #[error("{0}")]
    Source(Arc<E>),
    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),
}

// Every request that joined a fetch receives the same error
impl<E> Clone for FetchError<E> {
    fn clone(&self) -> Self {
        match self {
            FetchError::Source(e) => FetchError::Source(e.clone()),
            FetchError::TimedOut(after) => FetchError::TimedOut(*after),
        }
    }
}

/// A failed fetch, carrying the last good payload when one exists.
#[derive(Debug)]
pub struct GateFailure<T, E> {
    pub error: FetchError<E>,
    pub fallback: Option<Gated<T>>,
}

type Outcome<T, E> = Result<Gated<T>, FetchError<E>>;

struct InFlight<T, E> {
    id: u64,
    outcome: watch::Receiver<Option<Outcome<T, E>>>,
}

enum Role<'a, T, E> {
    Hit(Gated<T>),
    Follower(watch::Receiver<Option<Outcome<T, E>>>),
    Leader(Leader<'a, T, E>),
}

/// The request running the fetch for a key. Dropping it, after publishing or
/// by cancellation, clears the key's in-flight entry.
struct Leader<'a, T, E> {
    gate: &'a FreshnessGate<T, E>,
    key: String,
    id: u64,
    outcome: watch::Sender<Option<Outcome<T, E>>>,
}

impl<T, E> Leader<'_, T, E> {
    fn publish(self, outcome: Outcome<T, E>) {
        let _ = self.outcome.send(Some(outcome));
    }
}

impl<T, E> Drop for Leader<'_, T, E> {
    fn drop(&mut self) {
        let mut in_flight = self.gate.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.get(&self.key).is_some_and(|entry| entry.id == self.id) {
            in_flight.remove(&self.key);
        }
    }
}

pub struct FreshnessGate<T, E> {
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
    records: Cache<String, FreshnessRecord<T>>,
    in_flight: Mutex<HashMap<String, InFlight<T, E>>>,
    next_id: AtomicU64,
}

impl<T, E> FreshnessGate<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync,
{
    pub fn with_clock(policy: FreshnessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Cache::builder().max_capacity(policy.max_records).build(),
            policy,
            clock,
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn cache_key(class: &DataClass, scope: &str) -> String {
        format!("{}@{}", class, scope)
    }

    pub fn status(&self, class: &DataClass, scope: &str) -> Freshness {
        let key = Self::cache_key(class, scope);
        let window = self.policy.window_for(class);

        match self.records.get(&key) {
            None => Freshness::Empty,
            Some(record) if self.is_fresh(&record, window) => Freshness::Fresh,
            Some(_) => Freshness::Stale,
        }
    }

    /// Last good payload regardless of age.
    pub fn cached(&self, class: &DataClass, scope: &str) -> Option<Gated<T>> {
        self.cached_by_key(&Self::cache_key(class, scope))
    }

    /// Mark a record stale while keeping its payload for fallback.
    pub fn invalidate(&self, class: &DataClass, scope: &str) {
        let key = Self::cache_key(class, scope);
        if let Some(mut record) = self.records.get(&key) {
            record.invalidated = true;
            self.records.insert(key, record);
        }
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        class: &DataClass,
        scope: &str,
        fetch: F,
    ) -> Result<Gated<T>, GateFailure<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(class, scope, false, fetch).await
    }

    /// Fetch regardless of state; the timer resets only on success. A fetch
    /// already running for the key is joined rather than repeated.
    pub async fn force_refresh<F, Fut>(
        &self,
        class: &DataClass,
        scope: &str,
        fetch: F,
    ) -> Result<Gated<T>, GateFailure<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(class, scope, true, fetch).await
    }

    async fn run<F, Fut>(
        &self,
        class: &DataClass,
        scope: &str,
        force: bool,
        fetch: F,
    ) -> Result<Gated<T>, GateFailure<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = Self::cache_key(class, scope);
        let window = self.policy.window_for(class);

        let leader = loop {
            match self.join_or_lead(&key, window, force) {
                Role::Hit(hit) => {
                    tracing::debug!("Freshness hit for {}", key);
                    return Ok(hit);
                }
                Role::Leader(leader) => break leader,
                Role::Follower(mut outcome) => {
                    tracing::debug!("Joined in-flight fetch for {}", key);
                    let shared = outcome
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|shared| (*shared).clone());
                    match shared {
                        Some(Ok(gated)) => {
                            return Ok(Gated {
                                from_cache: true,
                                ..gated
                            })
                        }
                        Some(Err(error)) => {
                            return Err(GateFailure {
                                error,
                                fallback: self.cached_by_key(&key),
                            })
                        }
                        // The leading request was dropped before finishing
                        None => continue,
                    }
                }
            }
        };

        tracing::debug!("Fetching {} (force: {})", key, force);
        let outcome = match tokio::time::timeout(self.policy.fetch_timeout, fetch()).await {
            Ok(Ok(payload)) => {
                let fetched_at = self.clock.now();
                self.records.insert(
                    key.clone(),
                    FreshnessRecord {
                        fetched_at,
                        payload: payload.clone(),
                        invalidated: false,
                    },
                );
                Ok(Gated {
                    payload,
                    fetched_at,
                    from_cache: false,
                })
            }
            Ok(Err(e)) => Err(FetchError::Source(Arc::new(e))),
            Err(_) => Err(FetchError::TimedOut(self.policy.fetch_timeout)),
        };
        leader.publish(outcome.clone());

        outcome.map_err(|error| {
            let fallback = self.cached_by_key(&key);
            tracing::warn!(
                "Fetch for {} failed, fallback {}",
                key,
                if fallback.is_some() { "available" } else { "missing" }
            );
            GateFailure { error, fallback }
        })
    }

    // Commits land before the in-flight entry is cleared, so a freshness
    // check made while holding the in-flight lock cannot miss one.
    fn join_or_lead(&self, key: &str, window: Duration, force: bool) -> Role<'_, T, E> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = in_flight.get(key) {
            return Role::Follower(entry.outcome.clone());
        }
        if !force {
            if let Some(hit) = self.fresh_hit(key, window) {
                return Role::Hit(hit);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                outcome: receiver,
            },
        );
        Role::Leader(Leader {
            gate: self,
            key: key.to_string(),
            id,
            outcome: sender,
        })
    }

    fn fresh_hit(&self, key: &str, window: Duration) -> Option<Gated<T>> {
        self.records
            .get(key)
            .filter(|record| self.is_fresh(record, window))
            .map(|record| Gated {
                payload: record.payload,
                fetched_at: record.fetched_at,
                from_cache: true,
            })
    }

    fn cached_by_key(&self, key: &str) -> Option<Gated<T>> {
        self.records.get(key).map(|record| Gated {
            payload: record.payload,
            fetched_at: record.fetched_at,
            from_cache: true,
        })
    }

    fn is_fresh(&self, record: &FreshnessRecord<T>, window: Duration) -> bool {
        if record.invalidated {
            return false;
        }
        // A record stamped in the future (clock stepped back) is stale
        match (self.clock.now() - record.fetched_at).to_std() {
            Ok(age) => age <= window,
            Err(_) => false,
        }
    }
}
