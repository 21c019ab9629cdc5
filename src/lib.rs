//! Client-side session state and backend transport for vidpair.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store is the root value. The request client reads it to
//! attach identity headers, and the realtime manager reads it to open an
//! authenticated cable connection (and to drop that connection on logout).
//! [`client::Client`] is the composition root that wires these together.
//!
//! LAYOUT
//! ======
//! - `context`: injected description of the execution environment.
//! - `config`: endpoint pairs and environment overrides.
//! - `state`: reactive stores, durable storage, session.
//! - `net`: HTTP request client and realtime cable manager.

pub mod client;
pub mod config;
pub mod context;
pub mod net;
pub mod state;

pub use client::Client;
pub use config::ClientConfig;
pub use context::ExecutionContext;
pub use net::api::{ApiClient, ApiError};
pub use net::cable::{CableManager, ChannelCallbacks};
pub use state::session::{Identity, SessionStore};
pub use state::storage::{DurableStorage, FileStorage, MemoryStorage, StorageError};
pub use state::store::{ReactiveStore, Unsubscriber, Writable};
