//! crates/classroom_agent_core/src/cache.rs
//!
//! A keyed, single-flight memoization layer for profiles and course contexts.
//!
//! Each key is either empty, in-flight or populated. The first caller for an empty key
//! starts the build on its own task; every caller that arrives while the build is running
//! awaits the same shared result instead of starting another one. A failed build removes
//! the in-flight marker so the next caller can retry.

use crate::ports::{PortError, PortResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

type SharedBuild<T> = Shared<BoxFuture<'static, PortResult<T>>>;

enum Slot<T> {
    InFlight { generation: u64, build: SharedBuild<T> },
    Populated(T),
}

/// Observable state of one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Empty,
    InFlight,
    Populated,
}

enum Lookup<T> {
    Hit(T),
    Wait(SharedBuild<T>),
}

type Entries<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

pub struct ContextCache<T> {
    entries: Entries<T>,
    next_generation: AtomicU64,
}

impl<T> Default for ContextCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ContextCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, joining an in-flight build if one is running,
    /// or running `builder` exactly once if the key is empty.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, builder: F) -> PortResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PortResult<T>> + Send + 'static,
    {
        let build = {
            let mut entries = lock(&self.entries);
            let existing = entries.get(key).map(|slot| match slot {
                Slot::Populated(value) => Lookup::Hit(value.clone()),
                Slot::InFlight { build, .. } => Lookup::Wait(build.clone()),
            });

            match existing {
                Some(Lookup::Hit(value)) => {
                    debug!(key, "Context cache hit.");
                    return Ok(value);
                }
                Some(Lookup::Wait(build)) => {
                    debug!(key, "Joining in-flight build.");
                    build
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let task = tokio::spawn(settle(
                        self.entries.clone(),
                        key.to_string(),
                        generation,
                        builder(),
                    ));
                    let build = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(PortError::Unexpected(format!("Cache build task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();

                    entries.insert(
                        key.to_string(),
                        Slot::InFlight {
                            generation,
                            build: build.clone(),
                        },
                    );
                    debug!(key, generation, "Started build.");
                    build
                }
            }
        };

        build.await
    }

    pub fn state(&self, key: &str) -> EntryState {
        match lock(&self.entries).get(key) {
            None => EntryState::Empty,
            Some(Slot::InFlight { .. }) => EntryState::InFlight,
            Some(Slot::Populated(_)) => EntryState::Populated,
        }
    }

    /// Clears one entry. A build still running for it completes for its waiters
    /// but its result is not stored.
    pub fn invalidate(&self, key: &str) {
        if lock(&self.entries).remove(key).is_some() {
            debug!(key, "Invalidated cache entry.");
        }
    }

    /// Clears every entry whose key satisfies `predicate`.
    pub fn invalidate_matching<P>(&self, predicate: P)
    where
        P: Fn(&str) -> bool,
    {
        lock(&self.entries).retain(|key, _| !predicate(key));
    }

    /// Clears the whole cache, e.g. on sign-out.
    pub fn invalidate_all(&self) {
        let mut entries = lock(&self.entries);
        debug!(count = entries.len(), "Invalidating entire cache.");
        entries.clear();
    }
}

/// Runs one build and settles its slot, provided the slot still belongs to this build.
async fn settle<T, Fut>(entries: Entries<T>, key: String, generation: u64, build: Fut) -> PortResult<T>
where
    T: Clone + Send + Sync + 'static,
    Fut: Future<Output = PortResult<T>>,
{
    let result = build.await;

    let mut entries = lock(&entries);
    let owns_slot = matches!(
        entries.get(&key),
        Some(Slot::InFlight { generation: current, .. }) if *current == generation
    );
    if owns_slot {
        match &result {
            Ok(value) => {
                entries.insert(key, Slot::Populated(value.clone()));
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache build failed; entry reset to empty.");
                entries.remove(&key);
            }
        }
    }

    result
}

fn lock<T>(entries: &Mutex<HashMap<String, Slot<T>>>) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn counting_builder(
        calls: Arc<AtomicUsize>,
        gate: Arc<Notify>,
        value: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, PortResult<String>> {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(value.to_string())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_build() {
        let cache = Arc::new(ContextCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let mut waiters = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let builder = counting_builder(calls.clone(), gate.clone(), "profile");
            waiters.push(tokio::spawn(async move {
                cache.get_or_fetch("user:42", builder).await
            }));
        }

        // Let every caller reach the cache before the build is released.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.state("user:42"), EntryState::InFlight);
        gate.notify_one();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap(), "profile");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state("user:42"), EntryState::Populated);
    }

    #[tokio::test]
    async fn failed_build_resets_entry_so_next_call_retries() {
        let cache = ContextCache::<String>::new();

        let err = cache
            .get_or_fetch("course:1", || async {
                Err(PortError::Network("connection refused".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network_error");
        assert_eq!(cache.state("course:1"), EntryState::Empty);

        let value = cache
            .get_or_fetch("course:1", || async { Ok("rebuilt".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "rebuilt");
    }

    #[tokio::test]
    async fn invalidated_key_is_rebuilt_instead_of_served_stale() {
        let cache = ContextCache::<String>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected_calls in [1, 1] {
            let counter = calls.clone();
            cache
                .get_or_fetch("user:42", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("alice".to_string())
                })
                .await
                .unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
        }

        // Sign-out.
        cache.invalidate_all();
        assert_eq!(cache.state("user:42"), EntryState::Empty);

        let calls_after = calls.clone();
        cache
            .get_or_fetch("user:42", move || async move {
                calls_after.fetch_add(1, Ordering::SeqCst);
                Ok("bob".to_string())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidation_during_build_discards_its_result() {
        let cache = Arc::new(ContextCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let pending = {
            let cache = cache.clone();
            let builder = counting_builder(calls.clone(), gate.clone(), "old");
            tokio::spawn(async move { cache.get_or_fetch("ctx", builder).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        cache.invalidate("ctx");
        gate.notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), "old");
        assert_eq!(cache.state("ctx"), EntryState::Empty);
    }

    #[tokio::test]
    async fn build_settles_even_when_the_caller_goes_away() {
        let cache = Arc::new(ContextCache::<String>::new());
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let caller = {
            let cache = cache.clone();
            let builder = counting_builder(calls.clone(), gate.clone(), "kept");
            tokio::spawn(async move { cache.get_or_fetch("ctx", builder).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(cache.state("ctx"), EntryState::Populated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn matching_invalidation_only_touches_selected_keys() {
        let cache = ContextCache::<String>::new();
        for key in ["context:a:course1", "context:b:course1", "context:a:course2"] {
            cache
                .get_or_fetch(key, || async { Ok("v".to_string()) })
                .await
                .unwrap();
        }

        cache.invalidate_matching(|key| key.ends_with(":course1"));

        assert_eq!(cache.state("context:a:course1"), EntryState::Empty);
        assert_eq!(cache.state("context:b:course1"), EntryState::Empty);
        assert_eq!(cache.state("context:a:course2"), EntryState::Populated);
    }
}
