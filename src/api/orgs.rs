//! Organisation creation and the caller's organisation list.

use std::sync::LazyLock;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::{ApiJson, AppState, FieldErrors};
use crate::auth::Caller;
use crate::error::ApiError;

/// Lowercase words of letters and digits joined by single hyphens.
static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug pattern is valid")
});

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/orgs", get(list_orgs).post(create_org))
}

#[derive(Debug, Deserialize)]
struct CreateOrgBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
}

fn validate(body: &CreateOrgBody) -> Result<(String, String), ApiError> {
    let name = body.name.trim().to_string();
    let slug = body.slug.trim().to_lowercase();

    let mut errors = FieldErrors::default();
    errors.length("name", &name, 2, 80);
    errors.length("slug", &slug, 2, 40);
    if !SLUG_PATTERN.is_match(&slug) {
        errors.add("slug", "Use lowercase letters, numbers, and single hyphens");
    }
    errors.finish()?;
    Ok((name, slug))
}

/// POST /api/orgs
///
/// The caller becomes the owner of the new organisation.
async fn create_org(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(body): ApiJson<CreateOrgBody>,
) -> Result<Response, ApiError> {
    let (name, slug) = validate(&body)?;

    let org = state
        .db
        .create_owned_organisation(&name, &slug, &caller.user_id)
        .await
        .map_err(|e| {
            if e.is_constraint() {
                ApiError::Conflict("Slug already taken".into())
            } else {
                e.into()
            }
        })?;

    info!(org_id = %org.id, user_id = %caller.user_id, "Organisation created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "organisation": {"id": org.id, "name": org.name, "slug": org.slug}
        })),
    )
        .into_response())
}

/// GET /api/orgs
async fn list_orgs(State(state): State<AppState>, caller: Caller) -> Result<Response, ApiError> {
    let items = state.db.list_memberships(&caller.user_id).await?;
    Ok(Json(json!({ "items": items })).into_response())
}
