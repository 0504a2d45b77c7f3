#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP plumbing shared by every open-data source.
//!
//! All network access goes through the [`JsonFetcher`] trait so the
//! aggregation components can be exercised against scripted responses.
//! The production implementation, [`HttpFetcher`], sends requests through
//! [`retry::send_json`] with a per-request timeout.
//!
//! Endpoint base URLs, dataset ids and timeouts live in the embedded
//! `endpoints.toml` (see [`config`]).

pub mod config;
pub mod fallback;
pub mod odata;
pub mod query;
pub mod retry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

/// Errors that can occur while talking to a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The endpoint could not be reached for a reason other than an HTTP
    /// error.
    #[error("Source unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// A request URL could not be built.
    #[error("Invalid URL: {message}")]
    Url {
        /// Description of what went wrong.
        message: String,
    },

    /// Endpoint configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

impl SourceError {
    /// Returns `true` if the response arrived but could not be parsed.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}

/// Fetches a URL and parses the body as JSON.
///
/// Non-success statuses are reported as [`SourceError::Status`] so callers
/// can treat them as a skip.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    /// Issues a GET request with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails, times out, returns a
    /// non-success status, or the body is not JSON.
    async fn get_json(&self, url: &Url, timeout: Duration) -> Result<serde_json::Value, SourceError>;
}

/// [`JsonFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a freshly built client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn get_json(&self, url: &Url, timeout: Duration) -> Result<serde_json::Value, SourceError> {
        log::debug!("GET {url}");
        retry::send_json(|| self.client.get(url.clone()).timeout(timeout)).await
    }
}

/// Builds the HTTP client used for every source request.
///
/// # Errors
///
/// Returns [`SourceError`] if the TLS backend cannot be initialised.
pub fn build_http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("buurt-insight/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .build()?)
}
