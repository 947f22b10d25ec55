//! Staff property CRUD.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::{
    ApiJson, AppState, DEFAULT_LIMIT, DEFAULT_WINDOW, FieldErrors, clamp_page, client_ip,
};
use crate::auth::{MANAGER_ROLES, STAFF_ROLES, Staff};
use crate::error::{ApiError, DatabaseError};
use crate::store::traits::{NewProperty, PropertyPatch};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/properties", get(list_properties).post(create_property))
        .route(
            "/api/properties/{id}",
            patch(update_property).delete(delete_property),
        )
}

fn property_not_found() -> ApiError {
    ApiError::NotFound("Property not found".into())
}

fn phone_conflict(err: DatabaseError) -> ApiError {
    if err.is_constraint() {
        ApiError::Conflict("Phone number already in use".into())
    } else {
        error!("Property write failed: {err}");
        err.into()
    }
}

/// Placeholder phone for properties reached only through org numbers.
fn synthetic_phone(org_id: &str) -> String {
    let org: String = org_id.chars().take(4).collect();
    let time = to_base36(Utc::now().timestamp_millis().max(0) as u64);
    let time_tail = &time[time.len().saturating_sub(5)..];
    let nonce: String = Uuid::new_v4().to_string().chars().take(4).collect();
    format!("P-{org}-{time_tail}-{nonce}")
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// GET /api/properties
async fn list_properties(
    State(state): State<AppState>,
    staff: Staff,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let search = query
        .get("search")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());
    let (page, page_size) = clamp_page(
        query.get("page").map(String::as_str),
        query.get("pageSize").map(String::as_str),
    );

    let listing = state
        .db
        .list_properties(&staff.org_id, search, page, page_size)
        .await?;
    Ok(Json(listing).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyBody {
    name: Option<String>,
    address: Option<String>,
    phone_number: Option<String>,
    manager_id: Option<String>,
}

impl PropertyBody {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.optional_length("name", self.name.as_deref(), 2, 100);
        errors.optional_length("address", self.address.as_deref(), 5, 255);
        errors.optional_length("phoneNumber", self.phone_number.as_deref(), 7, 20);
        errors.optional_length("managerId", self.manager_id.as_deref(), 1, 64);
    }
}

/// POST /api/properties
async fn create_property(
    State(state): State<AppState>,
    staff: Staff,
    headers: HeaderMap,
    ApiJson(body): ApiJson<PropertyBody>,
) -> Result<Response, ApiError> {
    staff.require(MANAGER_ROLES)?;
    let key = client_ip(&headers).unwrap_or_else(|| "global-prop-create".into());
    state
        .enforce_limit(&key, 2, Duration::from_secs(60), "Rate limit exceeded")
        .await?;

    let mut errors = FieldErrors::default();
    if body.name.is_none() {
        errors.add("name", "Required");
    }
    if body.address.is_none() {
        errors.add("address", "Required");
    }
    body.validate(&mut errors);
    errors.finish()?;

    let phone_number = body
        .phone_number
        .unwrap_or_else(|| synthetic_phone(&staff.org_id));
    let property = state
        .db
        .insert_property(NewProperty {
            organisation_id: staff.org_id.clone(),
            name: body.name.unwrap_or_default(),
            address: body.address.unwrap_or_default(),
            phone_number,
            manager_id: body.manager_id,
        })
        .await
        .map_err(phone_conflict)?;

    info!(property_id = %property.id, org_id = %staff.org_id, "Property created");
    Ok((StatusCode::CREATED, Json(property)).into_response())
}

/// PATCH /api/properties/{id}
async fn update_property(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PropertyBody>,
) -> Result<Response, ApiError> {
    staff.require(MANAGER_ROLES)?;
    state
        .enforce_limit(
            &format!("prop-patch:{id}"),
            DEFAULT_LIMIT,
            DEFAULT_WINDOW,
            "Too many updates",
        )
        .await?;

    let mut errors = FieldErrors::default();
    body.validate(&mut errors);
    errors.finish()?;

    let patch = PropertyPatch {
        name: body.name,
        address: body.address,
        phone_number: body.phone_number,
        manager_id: body.manager_id,
    };
    if patch.name.is_none()
        && patch.address.is_none()
        && patch.phone_number.is_none()
        && patch.manager_id.is_none()
    {
        return Err(ApiError::BadRequest("Empty body".into()));
    }

    if state.db.get_property(&staff.org_id, &id).await?.is_none() {
        return Err(property_not_found());
    }
    let updated = state
        .db
        .update_property(&id, patch)
        .await
        .map_err(phone_conflict)?;
    info!(property_id = %id, "Property updated");
    Ok(Json(updated).into_response())
}

/// DELETE /api/properties/{id}
async fn delete_property(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    staff.require(MANAGER_ROLES)?;
    if state.db.get_property(&staff.org_id, &id).await?.is_none() {
        return Err(property_not_found());
    }
    state.db.delete_property(&id).await?;
    info!(property_id = %id, "Property deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn synthetic_phone_fits_phone_column_rules() {
        let phone = synthetic_phone("4f1c2d3e-aaaa-bbbb-cccc-ddddeeeeffff");
        assert!(phone.starts_with("P-4f1c-"));
        assert!(phone.len() <= 20);
        assert_eq!(phone.split('-').count(), 4);
    }
}
