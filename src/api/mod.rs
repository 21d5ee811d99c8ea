//! HTTP query API.
//!
//! Two stable endpoints:
//!
//! - `GET /v1/domain/{domain}`: datasets containing a domain. Returns 200
//!   with an empty list when the domain is absent.
//! - `GET /v1/domain/{domain}/datasets/{dataset_id}/urls?offset&limit`:
//!   paginated URLs of one (domain, dataset) pair.
//!
//! The index is loaded once at startup into shared state; every request is
//! served from that pinned version, so no request ever mixes artifacts from
//! two versions. Handlers run the (file-backed, synchronous) query service
//! on the blocking thread pool.

mod handlers;
mod models;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, UrlakeError};
use crate::query::{IndexLoader, QueryService};

pub use models::{DatasetEntry, DomainResponse, ErrorResponse, UrlEntry, UrlsResponse};

/// Per-request scan deadline; on expiry a partial page is returned.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Default page size when `limit` is not given.
pub const DEFAULT_LIMIT: u32 = 1000;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
}

/// Build the router over an already-loaded index.
pub fn router(service: Arc<QueryService>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/v1/domain/:domain", get(handlers::get_domain))
        .route(
            "/v1/domain/:domain/datasets/:dataset_id/urls",
            get(handlers::get_urls),
        )
        .with_state(AppState { service })
}

/// Load the index and serve until interrupted.
pub async fn serve(config: &Config, addr: &str) -> Result<()> {
    let loader = Arc::new(IndexLoader::open(config)?);
    log::info!(
        "serving index version {} on {}",
        loader.version(),
        addr
    );
    let service = Arc::new(QueryService::new(loader, config.max_limit));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| UrlakeError::io(addr, "bind listener", e))?;
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutdown signal received");
        })
        .await
        .map_err(|e| UrlakeError::io(addr, "serve", e))?;
    Ok(())
}
