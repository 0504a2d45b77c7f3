//! Scripted [`JsonFetcher`] for tests.
//!
//! Routes are matched against the decoded request URL (see
//! [`query::decoded`]): the first route whose needles all occur in the URL
//! answers. Unmatched requests get HTTP 404.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::{JsonFetcher, SourceError, query};

/// A scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A JSON body.
    Json(serde_json::Value),
    /// A non-success HTTP status.
    Status(u16),
    /// A transport failure.
    Unavailable,
    /// A body that is not JSON.
    Malformed,
}

#[derive(Debug)]
struct Route {
    needles: Vec<String>,
    reply: Reply,
    delay: Duration,
}

/// [`JsonFetcher`] answering from a fixed routing table.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    routes: Vec<Route>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    /// Creates a fetcher with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route answering immediately.
    #[must_use]
    pub fn route(self, needles: &[&str], reply: Reply) -> Self {
        self.route_delayed(needles, reply, Duration::ZERO)
    }

    /// Adds a route answering after `delay`.
    #[must_use]
    pub fn route_delayed(mut self, needles: &[&str], reply: Reply, delay: Duration) -> Self {
        self.routes.push(Route {
            needles: needles.iter().map(ToString::to_string).collect(),
            reply,
            delay,
        });
        self
    }

    /// Every decoded URL requested so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests whose decoded URL contains `needle`.
    #[must_use]
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }
}

#[async_trait]
impl JsonFetcher for ScriptedFetcher {
    async fn get_json(&self, url: &Url, _timeout: Duration) -> Result<serde_json::Value, SourceError> {
        let decoded = query::decoded(url);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(decoded.clone());

        let Some(route) = self
            .routes
            .iter()
            .find(|r| r.needles.iter().all(|n| decoded.contains(n.as_str())))
        else {
            return Err(SourceError::Status {
                status: 404,
                url: decoded,
            });
        };

        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }

        match &route.reply {
            Reply::Json(body) => Ok(body.clone()),
            Reply::Status(status) => Err(SourceError::Status {
                status: *status,
                url: decoded,
            }),
            Reply::Unavailable => Err(SourceError::Unavailable {
                message: format!("connection refused: {decoded}"),
            }),
            Reply::Malformed => serde_json::from_str("<html>").map_err(SourceError::Json),
        }
    }
}
