//! Reactive stores with opt-in durability.
//!
//! A store made by [`StoreFactory::make_store`] starts purely in memory.
//! Calling [`PersistentStore::use_local_storage`] hydrates it from its
//! durable slot and from then on mirrors every value back to that slot.
//! Without persistent storage in the execution context activation does
//! nothing, so call sites never need to special-case headless runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::storage::DurableStorage;
use super::store::{ReactiveStore, Unsubscriber, Writable};
use crate::context::ExecutionContext;

/// Builds stores that share one execution context and storage backend.
#[derive(Clone)]
pub struct StoreFactory {
    ctx: ExecutionContext,
    storage: Arc<dyn DurableStorage>,
}

impl StoreFactory {
    #[must_use]
    pub fn new(ctx: ExecutionContext, storage: Arc<dyn DurableStorage>) -> Self {
        Self { ctx, storage }
    }

    #[must_use]
    pub fn make_store<T>(&self, key: impl Into<String>, initial: T) -> PersistentStore<T>
    where
        T: Clone + Serialize + DeserializeOwned + Send + 'static,
    {
        PersistentStore {
            key: key.into(),
            store: Writable::new(initial),
            ctx: self.ctx.clone(),
            storage: Arc::clone(&self.storage),
            activated: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct PersistentStore<T> {
    key: String,
    store: Writable<T>,
    ctx: ExecutionContext,
    storage: Arc<dyn DurableStorage>,
    activated: Arc<AtomicBool>,
}

impl<T> Clone for PersistentStore<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            store: self.store.clone(),
            ctx: self.ctx.clone(),
            storage: Arc::clone(&self.storage),
            activated: Arc::clone(&self.activated),
        }
    }
}

impl<T> PersistentStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True once durability has been activated.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// Hydrate from the durable slot, then mirror every change into it.
    ///
    /// Returns `false` when there is no persistent storage or the store was
    /// already activated. A malformed slot is logged and the in-memory
    /// value is kept.
    pub fn use_local_storage(&self) -> bool {
        if !self.ctx.has_persistent_storage {
            return false;
        }
        if self.activated.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Some(value) = read_slot::<T>(self.storage.as_ref(), &self.key) {
            self.store.set(value);
        }

        let storage = Arc::clone(&self.storage);
        let key = self.key.clone();
        // Listener lives as long as the store; there is no deactivate step.
        drop(self.store.subscribe(move |current: &T| write_slot(storage.as_ref(), &key, current)));
        true
    }
}

impl<T> ReactiveStore<T> for PersistentStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    fn get(&self) -> T {
        self.store.get()
    }

    fn set(&self, value: T) {
        self.store.set(value);
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.store.update(f);
    }

    fn subscribe<F>(&self, listener: F) -> Unsubscriber
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }
}

/// Parse slot `key`, treating a missing, empty, unreadable or malformed
/// slot as absent.
pub(crate) fn read_slot<T: DeserializeOwned>(storage: &dyn DurableStorage, key: &str) -> Option<T> {
    let raw = match storage.get_item(key) {
        Ok(Some(raw)) if !raw.is_empty() => raw,
        Ok(_) => return None,
        Err(error) => {
            tracing::warn!(%key, %error, "durable slot read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::error!(%key, %error, "failed to parse durable slot; using initial value");
            None
        }
    }
}

pub(crate) fn write_slot<T: Serialize>(storage: &dyn DurableStorage, key: &str, value: &T) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(%key, %error, "failed to encode value for durable slot");
            return;
        }
    };
    if let Err(error) = storage.set_item(key, &raw) {
        tracing::warn!(%key, %error, "durable slot write failed");
    }
}

#[cfg(test)]
#[path = "persistent_test.rs"]
mod tests;
