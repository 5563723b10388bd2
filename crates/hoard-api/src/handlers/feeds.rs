//! Feed episode redirect.
//!
//! Podcast clients follow episode enclosure links without credentials; the
//! feed token in the query string is the only access check. The handler
//! answers with a redirect to the episode's direct media URL, which is
//! time-limited and therefore served from the direct-URL cache, or resolved
//! again through the media extraction service on a miss.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Diagnostic header telling whether the redirect came from the cache.
pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");

#[derive(Debug, Deserialize)]
pub struct FeedEpisodeQuery {
    pub token: Option<String>,
}

/// `GET /api/feeds/:feed_id/episodes/:episode_id?token=..`
#[instrument(skip(state, query), fields(subsystem = "api", component = "feeds"))]
pub async fn redirect_episode(
    State(state): State<AppState>,
    Path((feed_id, episode_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<FeedEpisodeQuery>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound("Episode not found".to_string());

    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(not_found)?;

    let episode = state
        .episodes
        .find_feed_episode(feed_id, episode_id, &token)
        .await?
        .ok_or_else(not_found)?;

    if !episode.ready {
        return Err(ApiError::NotFound("Episode is not ready".to_string()));
    }

    let key = episode.direct_url_key();
    if let Some(direct_url) = state.direct_urls.get(&key).await {
        debug!(cache = "hit", "Serving cached direct URL");
        return found(&direct_url, "HIT");
    }

    let metadata = state
        .media
        .resolve(&episode.url, episode.medium)
        .await
        .map_err(|e| {
            warn!(
                url = %episode.url,
                medium = episode.medium.as_str(),
                error = %e.report(),
                "Direct URL resolution failed"
            );
            ApiError::BadGateway(e.report())
        })?;

    let direct_url = metadata
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            ApiError::BadGateway("Media extractor returned no direct URL".to_string())
        })?;

    state.direct_urls.set(key, direct_url.clone()).await;
    debug!(cache = "miss", "Resolved and cached direct URL");

    found(&direct_url, "MISS")
}

fn found(location: &str, cache_status: &'static str) -> Result<Response, ApiError> {
    let location = HeaderValue::from_str(location)
        .map_err(|_| ApiError::BadGateway("Media extractor returned an invalid URL".to_string()))?;

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (X_CACHE_STATUS, HeaderValue::from_static(cache_status)),
        ],
    )
        .into_response())
}
