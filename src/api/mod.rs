//! HTTP surface: the vendor webhook, the media proxy and the staff REST API.

pub mod media;
pub mod numbers;
pub mod orgs;
pub mod properties;
pub mod tenants;
pub mod tickets;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequest, Request};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::pipeline::InboundProcessor;
use crate::ratelimit::RateLimiter;
use crate::store::Database;
use crate::telephony::{Notifier, TelephonyClient};

/// Settings the webhook needs to authenticate the vendor.
#[derive(Clone)]
pub struct WebhookAuth {
    /// Vendor auth token; without it every webhook is refused.
    pub auth_token: Option<SecretString>,
    pub public_url: Option<String>,
    pub max_timestamp_skew: Duration,
}

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub limiter: Arc<dyn RateLimiter>,
    pub telephony: Arc<dyn TelephonyClient>,
    pub notifier: Arc<Notifier>,
    pub processor: Arc<InboundProcessor>,
    pub webhook: WebhookAuth,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(webhook::routes())
        .merge(media::routes())
        .merge(tickets::routes())
        .merge(properties::routes())
        .merge(tenants::routes())
        .merge(numbers::routes())
        .merge(orgs::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

// ── Request helpers ─────────────────────────────────────────────────

/// Default limit applied when a route does not name its own.
pub(crate) const DEFAULT_LIMIT: u32 = 20;
pub(crate) const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

/// Caller address as reported by the proxy, for per-IP limits.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl AppState {
    /// Count a hit against `key`; 429 with `message` when over the limit.
    pub(crate) async fn enforce_limit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        message: &str,
    ) -> Result<(), ApiError> {
        let verdict = self.limiter.check(key, limit, window).await;
        if verdict.success {
            Ok(())
        } else {
            tracing::debug!(key, "Rate limit exceeded");
            Err(ApiError::TooManyRequests(message.to_string()))
        }
    }
}

/// JSON body extractor whose rejections use the service's error shape.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// Distinguish an absent key (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Resolve `page` and `pageSize` query values, clamping bad input.
pub(crate) fn clamp_page(page: Option<&str>, page_size: Option<&str>) -> (u32, u32) {
    let page = page
        .and_then(|p| p.trim().parse::<i64>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(1);
    let size = page_size
        .and_then(|p| p.trim().parse::<i64>().ok())
        .map(|p| p.clamp(1, 200))
        .unwrap_or(20);
    (page.min(u32::MAX as i64) as u32, size as u32)
}

/// Field-level validation errors, rendered as `{ "errors": { field: [..] } }`.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors(Map<String, Value>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        let entry = self
            .0
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            list.push(Value::String(message.into()));
        }
    }

    /// Character-count bounds, inclusive.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let n = value.chars().count();
        if n < min {
            self.add(field, format!("String must contain at least {min} character(s)"));
        } else if n > max {
            self.add(field, format!("String must contain at most {max} character(s)"));
        }
    }

    pub fn optional_length(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) {
        if let Some(v) = value {
            self.length(field, v, min, max);
        }
    }

    /// Parse an optional enum query/body value.
    pub fn parse<T: std::str::FromStr>(&mut self, field: &str, value: Option<&str>) -> Option<T> {
        let raw = value.filter(|v| !v.is_empty())?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                self.add(field, format!("Invalid value '{raw}'"));
                None
            }
        }
    }

    /// Strict `page`/`pageSize` parsing for routes that reject bad values.
    pub fn page(&mut self, page: Option<&str>, page_size: Option<&str>) -> (u32, u32) {
        let mut read = |field: &str, raw: Option<&str>, default: u32, max: u32| {
            match raw.filter(|v| !v.is_empty()) {
                None => default,
                Some(v) => match v.trim().parse::<u32>() {
                    Ok(n) if (1..=max).contains(&n) => n,
                    _ => {
                        self.add(field, format!("Expected an integer between 1 and {max}"));
                        default
                    }
                },
            }
        };
        let p = read("page", page, 1, u32::MAX);
        let s = read("pageSize", page_size, 20, 200);
        (p, s)
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn clamps_paging() {
        assert_eq!(clamp_page(None, None), (1, 20));
        assert_eq!(clamp_page(Some("0"), Some("1000")), (1, 200));
        assert_eq!(clamp_page(Some("abc"), Some("-5")), (1, 1));
        assert_eq!(clamp_page(Some("3"), Some("50")), (3, 50));
    }

    #[test]
    fn strict_paging_reports_errors() {
        let mut errors = FieldErrors::default();
        assert_eq!(errors.page(Some("2"), Some("10")), (2, 10));
        assert!(errors.finish().is_ok());

        let mut errors = FieldErrors::default();
        errors.page(Some("0"), Some("201"));
        let Err(ApiError::Validation(map)) = errors.finish() else {
            panic!("expected validation error");
        };
        assert!(map.contains_key("page"));
        assert!(map.contains_key("pageSize"));
    }

    #[test]
    fn length_bounds_count_chars() {
        let mut errors = FieldErrors::default();
        errors.length("name", "é", 2, 100);
        errors.length("address", "12 Main St", 5, 255);
        let Err(ApiError::Validation(map)) = errors.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("name"));
    }

    async fn unconfigured_app() -> Router {
        app_with_token(None).await
    }

    async fn app_with_token(auth_token: Option<&str>) -> Router {
        use crate::config::WebhookLimit;
        use crate::pipeline::TriageAnalyzer;
        use crate::ratelimit::MemoryRateLimiter;
        use crate::store::LibSqlBackend;
        use crate::telephony::{ProxyMediaStore, UnconfiguredClient};

        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let telephony: Arc<dyn TelephonyClient> = Arc::new(UnconfiguredClient);
        let limiter: Arc<dyn RateLimiter> = Arc::new(MemoryRateLimiter::new());
        let notifier = Arc::new(Notifier::new(db.clone(), telephony.clone(), None));
        let processor = Arc::new(InboundProcessor::new(
            db.clone(),
            limiter.clone(),
            Arc::new(ProxyMediaStore::new(telephony.clone())),
            TriageAnalyzer::new(None, telephony.clone()),
            notifier.clone(),
            WebhookLimit::default(),
        ));
        router(AppState {
            db,
            limiter,
            telephony,
            notifier,
            processor,
            webhook: WebhookAuth {
                auth_token: auth_token.map(|t| SecretString::from(t.to_string())),
                public_url: None,
                max_timestamp_skew: Duration::from_secs(300),
            },
        })
    }

    async fn call(app: Router, request: Request) -> (axum::http::StatusCode, Value) {
        use tower::ServiceExt;

        let resp = app.oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, body) = call(unconfigured_app().await, request).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn webhook_without_auth_token_is_unavailable() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/webhooks/twilio")
            .header("x-twilio-signature", "c2lnbmF0dXJl")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(axum::body::Body::from("From=%2B15552223333&To=%2B15550001111&Body=hi"))
            .unwrap();
        let (status, body) = call(unconfigured_app().await, request).await;
        assert_eq!(status, 503);
        assert_eq!(body["error"], "Twilio not configured");
    }

    #[tokio::test]
    async fn media_proxy_without_vendor_is_unavailable() {
        let request = Request::builder()
            .uri("/api/twilio/media?u=https%3A%2F%2Fapi.twilio.com%2Fx")
            .header("x-user-id", "u1")
            .header("x-org-id", "o1")
            .header("x-org-role", "STAFF")
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, _) = call(unconfigured_app().await, request).await;
        assert_eq!(status, 503);
    }

    #[tokio::test]
    async fn webhook_signature_covers_path_without_query() {
        use crate::telephony::signature::compute_signature;

        let params = vec![
            ("Body".to_string(), "hi".to_string()),
            ("From".to_string(), "+15552223333".to_string()),
            ("To".to_string(), "+15550001111".to_string()),
        ];
        let signature = compute_signature(
            "secret",
            "https://sms.example.com/api/webhooks/twilio",
            &params,
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/webhooks/twilio?source=console")
            .header("host", "sms.example.com")
            .header("x-twilio-signature", signature)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(axum::body::Body::from("Body=hi&From=%2B15552223333&To=%2B15550001111"))
            .unwrap();

        // Authenticated, then rejected only because nothing owns the number.
        let (status, body) = call(app_with_token(Some("secret")).await, request).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "Destination not configured");
    }
}
