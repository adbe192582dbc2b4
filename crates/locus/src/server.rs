//! Router assembly and shared request state.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use locus_db::LocusDb;

use crate::config::Config;
use crate::{api, auth};

/// Deadline propagated from the request boundary to every storage
/// call it makes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared by all request handlers: the storage handle and the
/// configuration, both constructed at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: LocusDb,
    pub config: Arc<Config>,
}

/// Build the service router: bearer-authenticated public API, the
/// unauthenticated legacy ingestion path and the liveness probe.
pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/api/v1/locate", post(api::locate))
        .route("/api/v1/report", post(api::report))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let open = Router::new()
        .route("/v2/geosubmit", post(api::geosubmit))
        .route("/api/v1/health", get(api::health));

    authed
        .merge(open)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
