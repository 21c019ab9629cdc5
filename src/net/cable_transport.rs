//! Seams between the cable manager and the socket backend.
//!
//! The manager only speaks these traits; `cable_socket` is the real
//! backend and tests plug in recording fakes.

use std::sync::Arc;

use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum CableError {
    #[error("realtime transport needs a running tokio runtime: {0}")]
    RuntimeUnavailable(String),
    #[error("invalid cable URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

type Lifecycle = Arc<dyn Fn() + Send + Sync>;
type Received = Arc<dyn Fn(Value) + Send + Sync>;

/// Optional per-subscription callbacks.
#[derive(Clone, Default)]
pub struct ChannelCallbacks {
    connected: Option<Lifecycle>,
    disconnected: Option<Lifecycle>,
    rejected: Option<Lifecycle>,
    received: Option<Received>,
}

impl ChannelCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_disconnected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.disconnected = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_rejected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.rejected = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_received(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.received = Some(Arc::new(f));
        self
    }

    pub fn connected(&self) {
        if let Some(f) = &self.connected {
            f();
        }
    }

    pub fn disconnected(&self) {
        if let Some(f) = &self.disconnected {
            f();
        }
    }

    pub fn rejected(&self) {
        if let Some(f) = &self.rejected {
            f();
        }
    }

    pub fn received(&self, message: Value) {
        if let Some(f) = &self.received {
            f(message);
        }
    }
}

impl std::fmt::Debug for ChannelCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCallbacks")
            .field("connected", &self.connected.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("rejected", &self.rejected.is_some())
            .field("received", &self.received.is_some())
            .finish()
    }
}

/// Loads the transport backend. Called at most once per successful load.
#[async_trait::async_trait]
pub trait ConnectorLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn CableConnector>, CableError>;
}

/// A loaded backend able to open consumers.
pub trait CableConnector: Send + Sync {
    /// Open a consumer for the fully built cable `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a usable cable URL.
    fn create_consumer(&self, url: &str) -> Result<Arc<dyn CableConsumer>, CableError>;
}

/// One realtime connection multiplexing channel subscriptions.
pub trait CableConsumer: Send + Sync {
    fn create_subscription(
        &self,
        descriptor: Map<String, Value>,
        callbacks: ChannelCallbacks,
    ) -> Arc<dyn ChannelSubscription>;

    /// Close the connection; every subscription sees `disconnected`.
    fn disconnect(&self);

    /// The connection has ended. A closed consumer never reopens.
    fn is_closed(&self) -> bool;
}

pub trait ChannelSubscription: Send + Sync {
    fn identifier(&self) -> &str;

    /// Invoke `action` on the server-side channel.
    fn perform(&self, action: &str, data: Map<String, Value>);

    fn unsubscribe(&self);
}
