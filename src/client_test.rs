use super::*;
use crate::net::cable::{CableConnector, CableConsumer, CableError, ChannelCallbacks, ChannelSubscription};
use crate::state::session::Identity;
use crate::state::storage::MemoryStorage;
use crate::state::store::ReactiveStore;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Inert;

impl CableConnector for Inert {
    fn create_consumer(&self, _url: &str) -> Result<Arc<dyn CableConsumer>, CableError> {
        Ok(Arc::new(InertConsumer::default()))
    }
}

#[derive(Default)]
struct InertConsumer {
    disconnects: AtomicUsize,
}

impl CableConsumer for InertConsumer {
    fn create_subscription(
        &self,
        _descriptor: Map<String, Value>,
        _callbacks: ChannelCallbacks,
    ) -> Arc<dyn ChannelSubscription> {
        Arc::new(InertSubscription)
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        false
    }
}

struct InertSubscription;

impl ChannelSubscription for InertSubscription {
    fn identifier(&self) -> &str {
        "inert"
    }

    fn perform(&self, _action: &str, _data: Map<String, Value>) {}

    fn unsubscribe(&self) {}
}

struct InertLoader;

#[async_trait::async_trait]
impl ConnectorLoader for InertLoader {
    async fn load(&self) -> Result<Arc<dyn CableConnector>, CableError> {
        Ok(Arc::new(Inert))
    }
}

fn client(ctx: ExecutionContext, storage: Arc<dyn DurableStorage>) -> Client {
    Client::with_cable_loader(&ClientConfig::default(), ctx, storage, Arc::new(InertLoader)).unwrap()
}

// =============================================================
// Wiring
// =============================================================

#[test]
fn session_restored_from_storage() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item("user", r#"{"email":"a@b.c","generated_token":"t"}"#).unwrap();

    let client = client(ExecutionContext::interactive("localhost"), storage);
    assert_eq!(client.session().current().map(|i| i.email), Some("a@b.c".to_owned()));
}

#[test]
fn headless_client_uses_local_api() {
    let client = client(ExecutionContext::headless(), Arc::new(MemoryStorage::new()));
    assert_eq!(client.api().base_url(), "http://localhost:3000");
    assert_eq!(client.context(), &ExecutionContext::headless());
}

#[test]
fn production_host_uses_production_api() {
    let client = client(ExecutionContext::interactive("vidpair.app"), Arc::new(MemoryStorage::new()));
    assert_eq!(client.api().base_url(), "https://vidpair-api-production.up.railway.app/");
}

#[test]
fn stores_share_the_storage_backend() {
    let storage = Arc::new(MemoryStorage::new());
    let client = client(ExecutionContext::interactive("localhost"), storage.clone());

    let theme = client.stores().make_store("theme", "light".to_owned());
    assert!(theme.use_local_storage());
    theme.set("dark".to_owned());
    assert_eq!(storage.get_item("theme").unwrap(), Some(r#""dark""#.to_owned()));
}

// =============================================================
// Session / cable coupling
// =============================================================

#[tokio::test]
async fn logout_through_client_closes_cable() {
    let client = client(ExecutionContext::interactive("localhost"), Arc::new(MemoryStorage::new()));
    client.session().login(Identity::new("alice@example.com", "tok-123"));

    assert!(client.cable().get_connection().await.is_some());
    client.session().logout();
    assert!(!client.cable().is_connected());
}

#[tokio::test]
async fn dispose_closes_cable() {
    let client = client(ExecutionContext::interactive("localhost"), Arc::new(MemoryStorage::new()));
    client.session().login(Identity::new("alice@example.com", "tok-123").with_field("id", json!(7)));
    client.cable().get_connection().await.unwrap();

    client.dispose();
    assert!(!client.cable().is_connected());
}
