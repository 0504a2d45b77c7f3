#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for neighbourhood lookups.
//!
//! `POST /api/neighbourhood` answers with the initial response only.
//! `POST /api/neighbourhood/stream` answers with server-sent events: a
//! `response` event, then a `lateUpdate` event when a slow branch missed
//! the soft deadline.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use buurt_insight_cache::{CacheError, TtlCache};
use buurt_insight_pipeline::Pipeline;
use buurt_insight_source::config::Endpoints;
use buurt_insight_source::{HttpFetcher, JsonFetcher, SourceError};
use thiserror::Error;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Lookup pipeline shared by all workers.
    pub pipeline: Pipeline,
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Endpoint configuration or HTTP client setup failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The cache database could not be opened.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Binding or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/neighbourhood", web::post().to(handlers::neighbourhood))
            .route(
                "/neighbourhood/stream",
                web::post().to(handlers::neighbourhood_stream),
            ),
    );
}

/// Starts the API server.
///
/// Loads the endpoint configuration, opens the cache database and serves
/// on `BIND_ADDR:PORT` (default `127.0.0.1:8080`). The caller provides
/// the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// * [`ServerError::Source`] if the endpoint configuration or the HTTP
///   client cannot be set up
/// * [`ServerError::Cache`] if the cache database cannot be opened
/// * [`ServerError::Io`] if the server fails to bind or run
#[allow(clippy::future_not_send)]
pub async fn run_server() -> Result<(), ServerError> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Loading endpoints...");
    let endpoints = Endpoints::load()?;

    log::info!("Opening cache...");
    let cache = TtlCache::open_default()?;

    let fetcher: Arc<dyn JsonFetcher> = Arc::new(HttpFetcher::new()?);
    let state = web::Data::new(AppState {
        pipeline: Pipeline::from_endpoints(fetcher, cache, &endpoints),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await?;

    Ok(())
}
