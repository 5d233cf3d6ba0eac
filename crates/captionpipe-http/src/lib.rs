//! HTTP surface for caption resolution.
//!
//! One canonical server shape: `/api/transcript`, `/api/languages/{id}` and
//! `/health`, JSON in and out, permissive CORS. Construction is split from
//! serving so contract tests can bind the router on an ephemeral port.

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use captionpipe_core::CaptionSource;
use captionpipe_local::CaptionResolver;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<CaptionResolver>,
    pub source: Arc<dyn CaptionSource>,
    pub default_language: String,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/transcript", get(routes::transcript))
        .route("/api/languages/:video_id", get(routes::languages))
        .layer(cors)
        .with_state(state)
}
