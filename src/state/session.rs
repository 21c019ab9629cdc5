//! Authenticated identity, persisted across restarts.
//!
//! DESIGN
//! ======
//! The session is read from its durable slot once, synchronously, while
//! the store is constructed, so the first reader already sees the logged-in
//! user. After that every change is written through: an identity is stored
//! as JSON, an absent identity deletes the slot.
//!
//! ERROR HANDLING
//! ==============
//! A corrupted record is logged and treated as "logged out". Nothing here
//! returns an error to callers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::persistent::read_slot;
use super::storage::DurableStorage;
use super::store::{ReactiveStore, Unsubscriber, Writable};
use crate::context::ExecutionContext;

/// The authenticated user as returned by the backend on login.
///
/// Only `email` and `generated_token` are interpreted; every other profile
/// field is carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub generated_token: String,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl Identity {
    #[must_use]
    pub fn new(email: impl Into<String>, generated_token: impl Into<String>) -> Self {
        Self { email: email.into(), generated_token: generated_token.into(), profile: Map::new() }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.profile.insert(key.into(), value);
        self
    }

    /// Both credentials are non-empty.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.email.is_empty() && !self.generated_token.is_empty()
    }
}

#[derive(Clone)]
pub struct SessionStore {
    key: String,
    store: Writable<Option<Identity>>,
}

impl SessionStore {
    /// Hydrate the session from slot `key` and keep that slot in sync.
    ///
    /// Without persistent storage the store is memory-only.
    #[must_use]
    pub fn load(ctx: &ExecutionContext, storage: Arc<dyn DurableStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        if !ctx.has_persistent_storage {
            return Self { key, store: Writable::new(None) };
        }

        let initial = read_slot::<Option<Identity>>(storage.as_ref(), &key).flatten();
        if let Some(identity) = &initial {
            tracing::debug!(email = %identity.email, "restored session");
        }
        let store = Writable::new(initial);

        let slot = key.clone();
        drop(store.subscribe(move |identity: &Option<Identity>| sync_slot(storage.as_ref(), &slot, identity.as_ref())));
        Self { key, store }
    }

    /// Memory-only session, nothing is persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self { key: String::new(), store: Writable::new(None) }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.store.get()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Replace the session wholesale with `identity`. Also used for profile
    /// updates.
    pub fn login(&self, identity: Identity) {
        tracing::info!(email = %identity.email, "session started");
        self.store.set(Some(identity));
    }

    pub fn logout(&self) {
        if self.is_authenticated() {
            tracing::info!("session cleared");
        }
        self.store.set(None);
    }
}

impl ReactiveStore<Option<Identity>> for SessionStore {
    fn get(&self) -> Option<Identity> {
        self.store.get()
    }

    fn set(&self, value: Option<Identity>) {
        self.store.set(value);
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&Option<Identity>) -> Option<Identity>,
    {
        self.store.update(f);
    }

    fn subscribe<F>(&self, listener: F) -> Unsubscriber
    where
        F: Fn(&Option<Identity>) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }
}

fn sync_slot(storage: &dyn DurableStorage, key: &str, identity: Option<&Identity>) {
    let result = match identity {
        Some(identity) => match serde_json::to_string(identity) {
            Ok(raw) => storage.set_item(key, &raw),
            Err(error) => {
                tracing::warn!(%key, %error, "failed to encode session");
                return;
            }
        },
        None => storage.remove_item(key),
    };
    if let Err(error) = result {
        tracing::warn!(%key, %error, "session slot sync failed");
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
