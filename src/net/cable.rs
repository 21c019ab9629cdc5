//! Realtime transport manager.
//!
//! DESIGN
//! ======
//! One `CableManager` owns at most one consumer (the live cable connection)
//! and a registry of channel subscriptions keyed by
//! `channel + "_" + JSON(params)`. The backend is loaded lazily on the
//! first connection attempt and memoized; a failed load is not memoized,
//! so the next attempt retries.
//!
//! The manager listens to the session store. When the identity goes away
//! while a consumer exists, the connection is dropped and the registry is
//! discarded without per-subscription teardown (the consumer's disconnect
//! already ends them).
//!
//! A consumer whose socket has ended on its own (connect failure, server
//! disconnect, read error) is closed for good. The manager stops reporting
//! it as connected and replaces it, along with its registry, on the next
//! `get_connection`.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error to callers. A failed load or a bad cable
//! URL is logged and the operation yields `None`. Missing identity or a
//! non-interactive context yields `None` silently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use super::cable_protocol;
pub use super::cable_socket::SocketLoader;
pub use super::cable_transport::{
    CableConnector, CableConsumer, CableError, ChannelCallbacks, ChannelSubscription, ConnectorLoader,
};

use crate::config::ClientConfig;
use crate::context::ExecutionContext;
use crate::state::session::{Identity, SessionStore};
use crate::state::store::{ReactiveStore, Unsubscriber};

/// Registry key for a channel subscription.
#[must_use]
pub fn subscription_key(channel: &str, params: &Map<String, Value>) -> String {
    format!("{channel}_{}", Value::Object(params.clone()))
}

/// Append the identity's email and token to the cable base URL.
///
/// # Errors
///
/// Returns an error if `base` is not an absolute URL.
pub fn connection_url(base: &str, identity: &Identity) -> Result<String, CableError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|error| CableError::InvalidUrl { url: base.to_owned(), reason: error.to_string() })?;
    url.query_pairs_mut()
        .append_pair("email", &identity.email)
        .append_pair("token", &identity.generated_token);
    Ok(url.into())
}

#[derive(Default)]
struct CableState {
    consumer: Option<Arc<dyn CableConsumer>>,
    subscriptions: HashMap<String, Arc<dyn ChannelSubscription>>,
}

pub struct CableManager {
    cable_url: Option<String>,
    session: SessionStore,
    loader: Arc<dyn ConnectorLoader>,
    connector: OnceCell<Arc<dyn CableConnector>>,
    state: Mutex<CableState>,
    session_listener: Mutex<Option<Unsubscriber>>,
}

impl CableManager {
    /// Build a manager for `ctx` and start watching `session` for logout.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        ctx: &ExecutionContext,
        session: SessionStore,
        loader: Arc<dyn ConnectorLoader>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            cable_url: config.cable_base_url(ctx).map(str::to_owned),
            session,
            loader,
            connector: OnceCell::new(),
            state: Mutex::new(CableState::default()),
            session_listener: Mutex::new(None),
        });

        let weak = Arc::downgrade(&manager);
        let listener = manager.session.subscribe(move |identity: &Option<Identity>| {
            if identity.is_some() {
                return;
            }
            let Some(manager) = weak.upgrade() else {
                return;
            };
            if manager.has_consumer() {
                tracing::info!("session ended; closing cable");
                manager.disconnect_cable();
            }
        });
        *manager.listener_slot() = Some(listener);
        manager
    }

    /// Manager backed by the tokio-tungstenite socket transport.
    #[must_use]
    pub fn with_socket_transport(config: &ClientConfig, ctx: &ExecutionContext, session: SessionStore) -> Arc<Self> {
        Self::new(config, ctx, session, Arc::new(SocketLoader))
    }

    fn lock(&self) -> MutexGuard<'_, CableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<Unsubscriber>> {
        self.session_listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live consumer, creating it on first use.
    ///
    /// `None` when not interactive, when the backend fails to load, or when
    /// nobody is logged in.
    pub async fn get_connection(&self) -> Option<Arc<dyn CableConsumer>> {
        let base = self.cable_url.as_deref()?;

        let connector = match self.connector.get_or_try_init(|| self.loader.load()).await {
            Ok(connector) => Arc::clone(connector),
            Err(error) => {
                tracing::error!(%error, "failed to load cable transport");
                return None;
            }
        };

        let identity = self.session.current()?;

        let mut state = self.lock();
        match state.consumer.as_ref().map(|consumer| consumer.is_closed()) {
            Some(false) => return state.consumer.clone(),
            Some(true) => {
                tracing::info!(dropped = state.subscriptions.len(), "cable consumer closed; reconnecting");
                state.consumer = None;
                state.subscriptions.clear();
            }
            None => {}
        }
        let url = match connection_url(base, &identity) {
            Ok(url) => url,
            Err(error) => {
                tracing::error!(%error, "cannot build cable URL");
                return None;
            }
        };
        match connector.create_consumer(&url) {
            Ok(consumer) => {
                tracing::info!(url = %base, email = %identity.email, "cable consumer created");
                state.consumer = Some(Arc::clone(&consumer));
                Some(consumer)
            }
            Err(error) => {
                tracing::error!(%error, "failed to create cable consumer");
                None
            }
        }
    }

    /// Subscribe to `channel` with `params`, replacing any subscription
    /// already registered under the same key.
    pub async fn subscribe_to_channel(
        &self,
        channel: &str,
        params: &Map<String, Value>,
        callbacks: ChannelCallbacks,
    ) -> Option<Arc<dyn ChannelSubscription>> {
        let consumer = self.get_connection().await?;
        let key = subscription_key(channel, params);

        // Tear down first: the replacement shares the old identifier.
        let previous = self.lock().subscriptions.remove(&key);
        if let Some(previous) = previous {
            tracing::debug!(%key, "replacing channel subscription");
            previous.unsubscribe();
        }

        let descriptor = cable_protocol::descriptor(channel, params);
        let subscription = consumer.create_subscription(descriptor, logged(channel, callbacks));
        self.lock().subscriptions.insert(key, Arc::clone(&subscription));
        Some(subscription)
    }

    pub fn unsubscribe_from_channel(&self, channel: &str, params: &Map<String, Value>) {
        let key = subscription_key(channel, params);
        let removed = self.lock().subscriptions.remove(&key);
        if let Some(subscription) = removed {
            tracing::debug!(%key, "channel unsubscribed");
            subscription.unsubscribe();
        }
    }

    /// Close the connection and forget every subscription.
    pub fn disconnect_cable(&self) {
        let consumer = {
            let mut state = self.lock();
            state.subscriptions.clear();
            state.consumer.take()
        };
        if let Some(consumer) = consumer {
            consumer.disconnect();
            tracing::info!("cable disconnected");
        }
    }

    /// A consumer exists and its connection has not ended.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().consumer.as_ref().is_some_and(|consumer| !consumer.is_closed())
    }

    fn has_consumer(&self) -> bool {
        self.lock().consumer.is_some()
    }

    /// Registered subscription keys, sorted.
    #[must_use]
    pub fn subscription_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().subscriptions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stop watching the session and close the connection.
    pub fn dispose(&self) {
        let listener = self.listener_slot().take();
        if let Some(listener) = listener {
            listener.unsubscribe();
        }
        self.disconnect_cable();
    }
}

/// Wrap `callbacks` so lifecycle transitions are also logged.
fn logged(channel: &str, callbacks: ChannelCallbacks) -> ChannelCallbacks {
    let (on_connected, on_disconnected, on_rejected, on_received) =
        (callbacks.clone(), callbacks.clone(), callbacks.clone(), callbacks);
    let (connected_channel, disconnected_channel) = (channel.to_owned(), channel.to_owned());

    ChannelCallbacks::new()
        .on_connected(move || {
            tracing::info!(channel = %connected_channel, "channel connected");
            on_connected.connected();
        })
        .on_disconnected(move || {
            tracing::info!(channel = %disconnected_channel, "channel disconnected");
            on_disconnected.disconnected();
        })
        .on_rejected(move || on_rejected.rejected())
        .on_received(move |message| on_received.received(message))
}

#[cfg(test)]
#[path = "cable_test.rs"]
mod tests;
