//! Composition root.
//!
//! `Client` is built once per process. It loads the session from durable
//! storage, then hands that one session to the request client and the
//! cable manager so both always see the same identity.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::context::ExecutionContext;
use crate::net::api::{ApiClient, ApiError};
use crate::net::cable::{CableManager, ConnectorLoader};
use crate::state::persistent::StoreFactory;
use crate::state::session::SessionStore;
use crate::state::storage::DurableStorage;

pub struct Client {
    ctx: ExecutionContext,
    session: SessionStore,
    api: ApiClient,
    cable: Arc<CableManager>,
    stores: StoreFactory,
}

impl Client {
    /// Wire everything with the socket cable transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, ctx: ExecutionContext, storage: Arc<dyn DurableStorage>) -> Result<Self, ApiError> {
        Self::with_cable_loader(config, ctx, storage, Arc::new(crate::net::cable::SocketLoader))
    }

    /// Same as [`Client::new`] with a caller-supplied cable backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_cable_loader(
        config: &ClientConfig,
        ctx: ExecutionContext,
        storage: Arc<dyn DurableStorage>,
        loader: Arc<dyn ConnectorLoader>,
    ) -> Result<Self, ApiError> {
        let session = SessionStore::load(&ctx, Arc::clone(&storage), config.session_key.as_str());
        let api = ApiClient::new(config, &ctx, session.clone())?;
        let cable = CableManager::new(config, &ctx, session.clone(), loader);
        let stores = StoreFactory::new(ctx.clone(), storage);
        tracing::debug!(host = ctx.active_host().unwrap_or("-"), api = api.base_url(), "client ready");

        Ok(Self { ctx, session, api, cable, stores })
    }

    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn cable(&self) -> &Arc<CableManager> {
        &self.cable
    }

    /// Factory for additional persistent stores on the same backend.
    #[must_use]
    pub fn stores(&self) -> &StoreFactory {
        &self.stores
    }

    /// Close the cable and stop reacting to session changes.
    pub fn dispose(&self) {
        self.cable.dispose();
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
