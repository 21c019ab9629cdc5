//! REST client for the vidpair backend.
//!
//! Every request is built through [`ApiClient::request`], which stamps the
//! current session's email and token onto it. The inner `reqwest::Client`
//! is never handed out, so there is no way to send an unstamped request
//! while a user is logged in.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures and non-2xx responses surface as `ApiError`. A
//! missing session is not an error: the request goes out without identity
//! headers and the server decides.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::context::ExecutionContext;
use crate::state::session::{Identity, SessionStore};

/// `X-User-Email`; header names are case-insensitive and stored lowercase.
pub const USER_EMAIL_HEADER: HeaderName = HeaderName::from_static("x-user-email");
/// `X-User-Token`.
pub const USER_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-user-token");

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: Value },
    #[error("response body is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    /// Build a client whose base URL is chosen from `config` for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig, ctx: &ExecutionContext, session: SessionStore) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()?;
        let base_url = config.api_base_url(ctx).to_owned();
        tracing::debug!(%base_url, "api client ready");

        Ok(Self { http, base_url, session })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path` under the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Start a request, with identity headers when a session is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the session's email or token is not a valid
    /// header value.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let identity = self.session.current();
        let headers = identity_headers(identity.as_ref())?;
        Ok(self.http.request(method, self.url(path)).headers(headers))
    }

    /// Send a request with an optional JSON body and decode a JSON reply.
    ///
    /// An empty body decodes as `Value::Null`. A non-2xx reply whose body is
    /// not JSON carries the raw text as `Value::String`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure (including a failed body read),
    /// a non-2xx status, or a success body that is not JSON.
    pub async fn send_json(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let request = self.request(method.clone(), path)?;
        let request = if let Some(json) = body { request.json(&json) } else { request };

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        tracing::debug!(%method, %path, status = status.as_u16(), len = bytes.len(), "api response");

        let decoded = if bytes.is_empty() { Ok(Value::Null) } else { serde_json::from_slice::<Value>(&bytes) };
        if !status.is_success() {
            let body = decoded.unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(decoded?)
    }

    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        self.send_json(Method::GET, path, None).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn post_json(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send_json(Method::POST, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn patch_json(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send_json(Method::PATCH, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn delete_json(&self, path: &str) -> Result<Value, ApiError> {
        self.send_json(Method::DELETE, path, None).await
    }
}

/// Identity headers for `identity`; empty when absent or incomplete.
///
/// # Errors
///
/// Returns an error if the email or token contains bytes that are not
/// allowed in a header value.
pub fn identity_headers(identity: Option<&Identity>) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    let Some(identity) = identity.filter(|id| id.has_credentials()) else {
        return Ok(headers);
    };
    headers.insert(USER_EMAIL_HEADER, HeaderValue::from_str(&identity.email)?);
    headers.insert(USER_TOKEN_HEADER, HeaderValue::from_str(&identity.generated_token)?);
    Ok(headers)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
