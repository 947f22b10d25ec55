//! Staff-only proxy for vendor-hosted media.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::warn;

use crate::api::AppState;
use crate::auth::{STAFF_ROLES, Staff};
use crate::error::{ApiError, TelephonyError};
use crate::telephony::media::MEDIA_PROXY_PATH;

pub fn routes() -> Router<AppState> {
    Router::new().route(MEDIA_PROXY_PATH, get(proxy_media))
}

/// GET /api/twilio/media?u=<vendor url>
///
/// The content type always comes from the vendor; the `ct` hint stored in
/// the ticket URL is ignored here.
async fn proxy_media(
    State(state): State<AppState>,
    staff: Staff,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let source = query
        .get("u")
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing u".into()))?;

    match state.telephony.validate_media_url(source) {
        Ok(()) => {}
        Err(TelephonyError::NotConfigured(_)) => {
            return Err(ApiError::Unavailable("Twilio not configured".into()));
        }
        Err(_) => return Err(ApiError::BadRequest("Invalid URL".into())),
    }

    let media = state.telephony.fetch_media(source).await.map_err(|e| {
        warn!(url = %source, "Media fetch failed: {e}");
        ApiError::BadGateway("Fetch failed".into())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, media.content_type),
            (header::CACHE_CONTROL, "private, max-age=86400".to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        media.bytes,
    )
        .into_response())
}
