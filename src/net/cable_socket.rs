//! Action Cable consumer over `tokio-tungstenite`.
//!
//! DESIGN
//! ======
//! Each consumer owns one spawned socket task. Subscriptions register their
//! callbacks in a shared registry keyed by identifier; the task sends a
//! `subscribe` for every registered identifier once the server says
//! `welcome`, and routes confirm/message frames back through the registry.
//! Commands issued after `welcome` go straight to the task over an mpsc
//! channel. There is no reconnect: when the socket ends every subscription
//! is told `disconnected` and the consumer stays closed. A subscription
//! created on a closed consumer hears `disconnected` at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::cable_protocol::{self, CableEvent, Command};
use super::cable_transport::{CableConnector, CableConsumer, CableError, ChannelCallbacks, ChannelSubscription, ConnectorLoader};

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

// =============================================================================
// LOADER / CONNECTOR
// =============================================================================

/// Binds the socket backend to the current tokio runtime.
#[derive(Debug, Default)]
pub struct SocketLoader;

#[async_trait::async_trait]
impl ConnectorLoader for SocketLoader {
    async fn load(&self) -> Result<Arc<dyn CableConnector>, CableError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|error| CableError::RuntimeUnavailable(error.to_string()))?;
        tracing::debug!("socket transport loaded");
        Ok(Arc::new(SocketConnector { handle }))
    }
}

pub struct SocketConnector {
    handle: tokio::runtime::Handle,
}

impl CableConnector for SocketConnector {
    fn create_consumer(&self, url: &str) -> Result<Arc<dyn CableConsumer>, CableError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|error| CableError::InvalidUrl { url: without_query(url).to_owned(), reason: error.to_string() })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(CableError::InvalidUrl {
                url: without_query(url).to_owned(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ConsumerShared { registry: Mutex::new(Registry::default()), outbound: tx });
        self.handle.spawn(run_socket(url.to_owned(), Arc::clone(&shared), rx));
        Ok(Arc::new(SocketConsumer { shared }))
    }
}

/// Strip the query (which carries credentials) before logging a URL.
fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

// =============================================================================
// SHARED REGISTRY
// =============================================================================

enum Outbound {
    Command(Command),
    Close,
}

#[derive(Default)]
struct Registry {
    welcomed: bool,
    closed: bool,
    next_id: u64,
    channels: HashMap<String, Vec<(u64, ChannelCallbacks)>>,
}

impl Registry {
    fn ready(&self) -> bool {
        self.welcomed && !self.closed
    }
}

struct ConsumerShared {
    registry: Mutex<Registry>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ConsumerShared {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command) {
        if self.outbound.send(Outbound::Command(command)).is_err() {
            tracing::trace!("cable socket gone; command dropped");
        }
    }

    fn callbacks_for(&self, identifier: &str) -> Vec<ChannelCallbacks> {
        self.lock()
            .channels
            .get(identifier)
            .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }

    /// Mark the consumer closed and tell every subscription.
    fn close(&self) {
        let callbacks: Vec<ChannelCallbacks> = {
            let mut registry = self.lock();
            registry.closed = true;
            registry.welcomed = false;
            registry.channels.values().flat_map(|entries| entries.iter().map(|(_, cb)| cb.clone())).collect()
        };
        for cb in callbacks {
            cb.disconnected();
        }
    }
}

// =============================================================================
// CONSUMER / SUBSCRIPTION
// =============================================================================

pub struct SocketConsumer {
    shared: Arc<ConsumerShared>,
}

impl CableConsumer for SocketConsumer {
    fn create_subscription(
        &self,
        descriptor: Map<String, Value>,
        callbacks: ChannelCallbacks,
    ) -> Arc<dyn ChannelSubscription> {
        let identifier = cable_protocol::identifier(&descriptor);
        let (id, send_subscribe) = {
            let mut registry = self.shared.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            if registry.closed {
                drop(registry);
                tracing::debug!(%identifier, "cable already closed; subscription not registered");
                callbacks.disconnected();
                return Arc::new(SocketSubscription { id, identifier, shared: Arc::clone(&self.shared) });
            }
            let entries = registry.channels.entry(identifier.clone()).or_default();
            let first = entries.is_empty();
            entries.push((id, callbacks));
            (id, first && registry.ready())
        };
        if send_subscribe {
            self.shared.send(Command::subscribe(&identifier));
        }
        Arc::new(SocketSubscription { id, identifier, shared: Arc::clone(&self.shared) })
    }

    fn disconnect(&self) {
        if self.shared.outbound.send(Outbound::Close).is_err() {
            tracing::debug!("cable socket already closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

struct SocketSubscription {
    id: u64,
    identifier: String,
    shared: Arc<ConsumerShared>,
}

impl ChannelSubscription for SocketSubscription {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn perform(&self, action: &str, data: Map<String, Value>) {
        if !self.shared.lock().ready() {
            tracing::warn!(identifier = %self.identifier, %action, "cable not ready; perform dropped");
            return;
        }
        self.shared.send(Command::perform(&self.identifier, action, data));
    }

    fn unsubscribe(&self) {
        let send_unsubscribe = {
            let mut registry = self.shared.lock();
            let Some(entries) = registry.channels.get_mut(&self.identifier) else {
                return;
            };
            entries.retain(|(id, _)| *id != self.id);
            let now_empty = entries.is_empty();
            if now_empty {
                registry.channels.remove(&self.identifier);
            }
            now_empty && registry.ready()
        };
        if send_unsubscribe {
            self.shared.send(Command::unsubscribe(&self.identifier));
        }
    }
}

// =============================================================================
// SOCKET TASK
// =============================================================================

enum Flow {
    Continue,
    Stop,
}

async fn run_socket(url: String, shared: Arc<ConsumerShared>, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    let target = without_query(&url).to_owned();
    let stream = tokio::select! {
        connected = connect_async(url.as_str()) => match connected {
            Ok((stream, _)) => stream,
            Err(error) => {
                tracing::warn!(url = %target, %error, "cable connect failed");
                shared.close();
                return;
            }
        },
        () = wait_for_close(&mut outbound) => {
            tracing::debug!(url = %target, "cable closed before connecting");
            shared.close();
            return;
        }
    };
    tracing::info!(url = %target, "cable connected");

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(Outbound::Command(command)) => {
                    if !send_command(&mut sink, &command).await {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(error) = sink.send(Message::Close(None)).await {
                        tracing::debug!(%error, "cable close frame not sent");
                    }
                    break;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Flow::Stop = handle_text(&shared, &mut sink, text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!(%error, "cable read failed");
                    break;
                }
            },
        }
    }

    shared.close();
    tracing::info!(url = %target, "cable disconnected");
}

/// Drain commands until a close request; nothing is sent before `welcome`.
async fn wait_for_close(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    loop {
        match outbound.recv().await {
            Some(Outbound::Command(_)) => {}
            Some(Outbound::Close) | None => return,
        }
    }
}

async fn send_command(sink: &mut WsSink, command: &Command) -> bool {
    let json = match command.to_json() {
        Ok(json) => json,
        Err(error) => {
            tracing::warn!(%error, "cable command encode failed");
            return true;
        }
    };
    tracing::trace!(%json, "cable send");
    match sink.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(%error, "cable write failed");
            false
        }
    }
}

async fn handle_text(shared: &ConsumerShared, sink: &mut WsSink, text: &str) -> Flow {
    let event = match cable_protocol::parse_event(text) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "ignoring cable frame");
            return Flow::Continue;
        }
    };

    match event {
        CableEvent::Welcome => {
            let identifiers: Vec<String> = {
                let mut registry = shared.lock();
                registry.welcomed = true;
                registry.channels.keys().cloned().collect()
            };
            for identifier in identifiers {
                if !send_command(sink, &Command::subscribe(&identifier)).await {
                    return Flow::Stop;
                }
            }
        }
        CableEvent::Ping => tracing::trace!("cable ping"),
        CableEvent::Confirm { identifier } => {
            for cb in shared.callbacks_for(&identifier) {
                cb.connected();
            }
        }
        CableEvent::Reject { identifier } => {
            tracing::warn!(%identifier, "cable subscription rejected");
            let removed = shared.lock().channels.remove(&identifier).unwrap_or_default();
            for (_, cb) in removed {
                cb.rejected();
            }
        }
        CableEvent::Message { identifier, message } => {
            for cb in shared.callbacks_for(&identifier) {
                cb.received(message.clone());
            }
        }
        CableEvent::Disconnect { reason, reconnect } => {
            tracing::info!(reason = reason.as_deref().unwrap_or("none"), reconnect, "cable disconnect requested by server");
            return Flow::Stop;
        }
        CableEvent::Unknown(kind) => tracing::debug!(%kind, "unknown cable frame type"),
    }
    Flow::Continue
}

#[cfg(test)]
#[path = "cable_socket_test.rs"]
mod tests;
