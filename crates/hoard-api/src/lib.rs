//! # hoard-api
//!
//! HTTP surface of hoard: the tokenized feed episode redirect and a health
//! probe. The binary in `main.rs` wires this router together with the
//! resolution worker.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use hoard_core::{EpisodeRepository, MediaResolver};
use hoard_jobs::DirectUrlCache;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub episodes: Arc<dyn EpisodeRepository>,
    pub media: Arc<dyn MediaResolver>,
    /// Same instance the episode resolver warms after a resolution.
    pub direct_urls: DirectUrlCache,
}

impl AppState {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        media: Arc<dyn MediaResolver>,
        direct_urls: DirectUrlCache,
    ) -> Self {
        Self {
            episodes,
            media,
            direct_urls,
        }
    }
}

/// Request ID generator using UUIDv7 (time-ordered).
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/feeds/:feed_id/episodes/:episode_id",
            get(handlers::feeds::redirect_episode),
        )
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state)
}
