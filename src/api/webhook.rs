//! Inbound SMS webhook.

use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::api::AppState;
use crate::config::WEBHOOK_PATH;
use crate::error::{ApiError, PipelineError};
use crate::pipeline::{InboundSms, Outcome};
use crate::telephony::signature::{
    SIGNATURE_HEADER, expected_webhook_url, is_stale, validate_request,
    validate_request_with_body,
};

pub fn routes() -> Router<AppState> {
    Router::new().route(WEBHOOK_PATH, get(ping).post(receive))
}

async fn ping() -> &'static str {
    "ok"
}

/// POST /api/webhooks/twilio
async fn receive(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        return Err(ApiError::Forbidden);
    };

    let max_skew = state.webhook.max_timestamp_skew.as_secs() as i64;
    if is_stale(&headers, Utc::now().timestamp(), max_skew) {
        warn!("Stale webhook timestamp");
        return Ok((StatusCode::FORBIDDEN, Json(json!({"error": "Stale request"}))).into_response());
    }

    let Some(token) = state.webhook.auth_token.as_ref() else {
        warn!("Webhook received but no auth token is configured");
        return Err(ApiError::Unavailable("Twilio not configured".into()));
    };

    // Form callbacks are signed over the bare path; JSON callbacks sign the
    // full URL because `bodySHA256` travels in the query.
    let url = expected_webhook_url(state.webhook.public_url.as_deref(), &headers, uri.path());
    let token = token.expose_secret();
    let (params, valid) = if is_json(&headers) {
        let signed_url = match uri.query() {
            Some(query) => format!("{url}?{query}"),
            None => url.clone(),
        };
        let valid = validate_request_with_body(token, signature, &signed_url, &body);
        (json_params(&body), valid)
    } else {
        let params: Vec<(String, String)> =
            url::form_urlencoded::parse(&body).into_owned().collect();
        let valid = validate_request(token, signature, &url, &params);
        (params, valid)
    };
    if !valid {
        warn!(url = %url, "Invalid webhook signature");
        return Err(ApiError::Forbidden);
    }

    match state.processor.process(InboundSms::from_params(&params)).await {
        Ok(Outcome::Created { ticket_id }) => {
            Ok(Json(json!({"success": true, "ticketId": ticket_id})).into_response())
        }
        Ok(Outcome::Duplicate) => Ok(Json(json!({"ok": true})).into_response()),
        Err(PipelineError::MissingNumbers) => {
            Err(ApiError::BadRequest("Missing phone numbers".into()))
        }
        Err(PipelineError::RateLimited(_)) => {
            Err(ApiError::TooManyRequests("Too many requests".into()))
        }
        Err(PipelineError::UnknownDestination(_)) => {
            Err(ApiError::NotFound("Destination not configured".into()))
        }
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"))
}

/// Flatten a JSON callback body into the same key/value pairs a form post carries.
fn json_params(body: &[u8]) -> Vec<(String, String)> {
    let Ok(object) = serde_json::from_slice::<Map<String, Value>>(body) else {
        return Vec::new();
    };
    object
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect()
}
