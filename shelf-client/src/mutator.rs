//! Optimistic mutations over an [`EntityCache`].
//!
//! A mutation writes its local transform into the cache before the remote
//! call starts, remembers the entry it replaced, and either commits (keeping
//! the optimistic value or merging authoritative fields from the response)
//! or restores the remembered entry exactly. Mutations of the same key run
//! one at a time; different keys proceed in parallel.
//!
//! After every applied mutation a background refetch of the key is
//! scheduled so that server-side effects the transform could not predict
//! are picked up. Reconciliation takes its fetch ticket under the key lock,
//! so it can never overwrite a mutation that started after it.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use dashmap::DashMap;
use shelf_core::{CacheError, MutationError, ShelfError, ShelfResult};
use shelf_storage::{CacheEntry, CacheKey, EntityCache, EntityFetcher};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

/// One async mutex per key with an in-flight mutation.
struct KeyLocks<K: CacheKey> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: CacheKey> KeyLocks<K> {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn acquire(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_default().value().clone()
    }

    /// Drop the map entry once nobody else holds it.
    fn release(&self, key: &K) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Holds the key lock for one mutation and puts the prior entry back if
/// the mutation is dropped before its remote call settles.
struct PendingMutation<'a, K: CacheKey, T: Clone + Send + Sync + 'static> {
    mutator: &'a OptimisticMutator<K, T>,
    key: K,
    serialized: Option<OwnedMutexGuard<()>>,
    /// `Some` while an optimistic write is in the cache and unconfirmed.
    prior: Option<Option<CacheEntry<T>>>,
    reconcile: bool,
}

impl<K, T> PendingMutation<'_, K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    fn applied(&mut self, prior: Option<CacheEntry<T>>) {
        self.prior = Some(prior);
    }

    fn committed(&mut self) {
        self.prior = None;
        self.reconcile = true;
    }

    fn roll_back(&mut self, reconcile: bool) {
        if let Some(prior) = self.prior.take() {
            self.mutator.cache.restore(self.key.clone(), prior);
        }
        self.reconcile = reconcile;
    }
}

impl<K, T> Drop for PendingMutation<'_, K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.prior.is_some() {
            tracing::warn!(key = %self.key, "Mutation dropped before the server answered, rolling back");
            self.roll_back(true);
        }
        // Unlock before releasing so the map entry can go.
        drop(self.serialized.take());
        self.mutator.locks.release(&self.key);
        if self.reconcile {
            self.mutator.schedule_reconciliation(self.key.clone());
        }
    }
}

pub struct OptimisticMutator<K: CacheKey, T> {
    cache: Arc<EntityCache<K, T>>,
    locks: Arc<KeyLocks<K>>,
    reconciler: Option<Arc<dyn EntityFetcher<K, T>>>,
    pending: StdMutex<Vec<JoinHandle<()>>>,
}

impl<K, T> OptimisticMutator<K, T>
where
    K: CacheKey,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(cache: Arc<EntityCache<K, T>>) -> Self {
        Self {
            cache,
            locks: Arc::new(KeyLocks::new()),
            reconciler: None,
            pending: StdMutex::new(Vec::new()),
        }
    }

    /// Refetch mutated keys through `fetcher` after each mutation.
    pub fn with_reconciler(mut self, fetcher: Arc<dyn EntityFetcher<K, T>>) -> Self {
        self.reconciler = Some(fetcher);
        self
    }

    pub fn cache(&self) -> &Arc<EntityCache<K, T>> {
        &self.cache
    }

    /// Number of keys with a mutation running or queued.
    pub fn keys_in_flight(&self) -> usize {
        self.locks.len()
    }

    /// Mutate a cached entity and keep the optimistic value on success.
    ///
    /// Fails with `EntityNotCached` if the key was never fetched.
    pub async fn mutate<Tr, Rc, Fut, V>(&self, key: K, transform: Tr, remote_call: Rc) -> ShelfResult<T>
    where
        Tr: FnOnce(&T) -> T,
        Rc: FnOnce() -> Fut,
        Fut: Future<Output = ShelfResult<V>>,
    {
        self.mutate_merge(key, transform, remote_call, |value, _| value)
            .await
    }

    /// Mutate a cached entity and fold the server response into the
    /// committed value.
    pub async fn mutate_merge<Tr, Rc, Fut, V, M>(
        &self,
        key: K,
        transform: Tr,
        remote_call: Rc,
        merge: M,
    ) -> ShelfResult<T>
    where
        Tr: FnOnce(&T) -> T,
        Rc: FnOnce() -> Fut,
        Fut: Future<Output = ShelfResult<V>>,
        M: FnOnce(T, V) -> T,
    {
        let missing = key.to_string();
        let committed = self
            .mutate_slot(
                key,
                |current| match current {
                    Some(value) => Ok(Some(transform(value))),
                    None => Err(CacheError::EntityNotCached {
                        key: missing.clone(),
                    }
                    .into()),
                },
                remote_call,
                |optimistic, response| optimistic.map(|value| merge(value, response)),
            )
            .await?;
        committed.ok_or_else(|| CacheError::EntityNotCached { key: missing }.into())
    }

    /// General form: the transform sees the current slot (present or not)
    /// and produces the next one, so entries can be inserted or removed.
    ///
    /// On failure the slot is restored to exactly the entry it held before,
    /// including its fetch time. Session errors pass through unchanged; any
    /// other remote failure is reported as `MutationError::Rejected`.
    /// Dropping the future before the remote call settles also restores the
    /// prior entry and schedules reconciliation.
    pub async fn mutate_slot<Tr, Rc, Fut, V, C>(
        &self,
        key: K,
        transform: Tr,
        remote_call: Rc,
        commit: C,
    ) -> ShelfResult<Option<T>>
    where
        Tr: FnOnce(Option<&T>) -> ShelfResult<Option<T>>,
        Rc: FnOnce() -> Fut,
        Fut: Future<Output = ShelfResult<V>>,
        C: FnOnce(Option<T>, V) -> Option<T>,
    {
        let serialized = self.locks.acquire(&key).lock_owned().await;
        let mut pending = PendingMutation {
            mutator: self,
            key: key.clone(),
            serialized: Some(serialized),
            prior: None,
            reconcile: false,
        };

        let prior = self.cache.get(&key);
        let optimistic = transform(prior.as_ref().map(CacheEntry::data))?;
        self.write(&key, optimistic.clone());
        pending.applied(prior);
        tracing::debug!(key = %key, "Applied optimistic update");

        match remote_call().await {
            Ok(response) => {
                let committed = commit(optimistic, response);
                self.write(&key, committed.clone());
                pending.committed();
                tracing::debug!(key = %key, "Committed optimistic update");
                Ok(committed)
            }
            Err(e) => {
                // Session failures clear the caches; nothing to reconcile.
                pending.roll_back(!matches!(e, ShelfError::Auth(_)));
                tracing::warn!(key = %key, error = %e, "Remote call failed, rolled back optimistic update");
                Err(rejection(&key, e))
            }
        }
    }

    fn write(&self, key: &K, value: Option<T>) {
        match value {
            Some(value) => {
                self.cache.set(key.clone(), value);
            }
            None => {
                self.cache.invalidate(key);
            }
        }
    }

    fn schedule_reconciliation(&self, key: K) {
        let Some(fetcher) = self.reconciler.clone() else {
            return;
        };
        // A mutation dropped during runtime shutdown has nowhere to spawn.
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let cache = self.cache.clone();
        let locks = self.locks.clone();

        let handle = runtime.spawn(async move {
            let pending = {
                let lock = locks.acquire(&key);
                let _serialized = lock.lock().await;
                cache.open_fetch()
            };
            locks.release(&key);

            match fetcher.fetch(&key).await {
                Ok(fetched) => match cache.apply_fetch(pending.ticket(), key.clone(), fetched) {
                    Ok(_) => tracing::debug!(key = %key, "Reconciled with server"),
                    Err(e) => tracing::debug!(key = %key, error = %e, "Reconciliation superseded"),
                },
                Err(e) => tracing::warn!(key = %key, error = %e, "Reconciliation fetch failed"),
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Wait for every scheduled reconciliation to finish.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(
                &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "Reconciliation task failed");
                }
            }
        }
    }
}

fn rejection<K: CacheKey>(key: &K, error: ShelfError) -> ShelfError {
    match error {
        ShelfError::Auth(_) | ShelfError::Mutation(_) => error,
        other => MutationError::Rejected {
            key: key.to_string(),
            reason: other.to_string(),
        }
        .into(),
    }
}
