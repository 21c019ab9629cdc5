//! Endpoint configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Two hardcoded endpoint pairs (local development / production), one for
//! HTTP and one for the cable. Which half of a pair is used depends only on
//! the active host name, see [`is_local_host`].

use crate::context::ExecutionContext;

pub const DEFAULT_LOCAL_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_PRODUCTION_API_URL: &str = "https://vidpair-api-production.up.railway.app/";
pub const DEFAULT_LOCAL_CABLE_URL: &str = "ws://localhost:3000/cable";
pub const DEFAULT_PRODUCTION_CABLE_URL: &str = "wss://vidpair-api-production.up.railway.app/cable";
pub const DEFAULT_SESSION_KEY: &str = "user";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be an {expected} URL, got '{value}'")]
    InvalidUrl { var: &'static str, expected: &'static str, value: String },
}

/// A local-development / production pair of base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPair {
    pub local: String,
    pub production: String,
}

impl EndpointPair {
    /// Pick the half of the pair that serves `host`.
    #[must_use]
    pub fn for_host(&self, host: &str) -> &str {
        if is_local_host(host) { &self.local } else { &self.production }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api: EndpointPair,
    pub cable: EndpointPair,
    pub session_key: String,
    pub timeouts: Timeouts,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: EndpointPair { local: DEFAULT_LOCAL_API_URL.to_owned(), production: DEFAULT_PRODUCTION_API_URL.to_owned() },
            cable: EndpointPair {
                local: DEFAULT_LOCAL_CABLE_URL.to_owned(),
                production: DEFAULT_PRODUCTION_CABLE_URL.to_owned(),
            },
            session_key: DEFAULT_SESSION_KEY.to_owned(),
            timeouts: Timeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS },
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// All optional:
    /// - `VIDPAIR_LOCAL_API_URL` / `VIDPAIR_PRODUCTION_API_URL`
    /// - `VIDPAIR_LOCAL_CABLE_URL` / `VIDPAIR_PRODUCTION_CABLE_URL`
    /// - `VIDPAIR_SESSION_KEY`: durable slot for the session, default `user`
    /// - `VIDPAIR_REQUEST_TIMEOUT_SECS`: default 30
    /// - `VIDPAIR_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if an override URL has the wrong scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Same as [`ClientConfig::from_env`] but reading from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override URL has the wrong scheme.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let api = EndpointPair {
            local: url_var(&lookup, "VIDPAIR_LOCAL_API_URL", HTTP_SCHEMES, defaults.api.local)?,
            production: url_var(&lookup, "VIDPAIR_PRODUCTION_API_URL", HTTP_SCHEMES, defaults.api.production)?,
        };
        let cable = EndpointPair {
            local: url_var(&lookup, "VIDPAIR_LOCAL_CABLE_URL", WS_SCHEMES, defaults.cable.local)?,
            production: url_var(&lookup, "VIDPAIR_PRODUCTION_CABLE_URL", WS_SCHEMES, defaults.cable.production)?,
        };
        let session_key = lookup("VIDPAIR_SESSION_KEY")
            .filter(|key| !key.is_empty())
            .unwrap_or(defaults.session_key);
        let timeouts = Timeouts {
            request_secs: parse_u64(&lookup, "VIDPAIR_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(&lookup, "VIDPAIR_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { api, cable, session_key, timeouts })
    }

    /// HTTP base URL for `ctx`. Non-interactive contexts always talk to the
    /// local development server.
    #[must_use]
    pub fn api_base_url(&self, ctx: &ExecutionContext) -> &str {
        match ctx.active_host() {
            Some(host) => self.api.for_host(host),
            None => &self.api.local,
        }
    }

    /// Cable base URL for `ctx`, `None` when not interactive.
    #[must_use]
    pub fn cable_base_url(&self, ctx: &ExecutionContext) -> Option<&str> {
        ctx.active_host().map(|host| self.cable.for_host(host))
    }
}

/// True when `host` names the local development machine.
#[must_use]
pub fn is_local_host(host: &str) -> bool {
    host.contains("localhost") || host.contains("127.0.0.1")
}

const HTTP_SCHEMES: (&str, &[&str]) = ("http(s)", &["http://", "https://"]);
const WS_SCHEMES: (&str, &[&str]) = ("ws(s)", &["ws://", "wss://"]);

fn url_var<F>(lookup: &F, var: &'static str, schemes: (&'static str, &[&str]), default: String) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    let (expected, prefixes) = schemes;
    if prefixes.iter().any(|prefix| value.starts_with(prefix)) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidUrl { var, expected, value })
    }
}

fn parse_u64<F>(lookup: &F, var: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) => raw.parse::<u64>().unwrap_or(default),
        None => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
