//! Execution environment capabilities.
//!
//! DESIGN
//! ======
//! Stores and transports never probe the environment themselves. The
//! composition root decides once whether durable storage and a network
//! window exist, and which host name the app is served from, then hands
//! the same `ExecutionContext` to every component.

/// What the current process is allowed to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// A durable key-value backend is available for hydration/mirroring.
    pub has_persistent_storage: bool,
    /// The process runs interactively and may open realtime connections.
    pub has_network_window: bool,
    /// Host name the interactive session was served from.
    pub host_name: Option<String>,
}

impl ExecutionContext {
    /// Interactive context served from `host_name`, with durable storage.
    #[must_use]
    pub fn interactive(host_name: impl Into<String>) -> Self {
        Self { has_persistent_storage: true, has_network_window: true, host_name: Some(host_name.into()) }
    }

    /// Non-interactive context: no storage, no window, no host.
    #[must_use]
    pub fn headless() -> Self {
        Self::default()
    }

    /// Host name, only when running interactively.
    #[must_use]
    pub fn active_host(&self) -> Option<&str> {
        if !self.has_network_window {
            return None;
        }
        self.host_name.as_deref()
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
