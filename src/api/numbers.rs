//! Organisation phone numbers: provisioning, property mapping, activation
//! and release.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::api::{ApiJson, AppState, DEFAULT_LIMIT, DEFAULT_WINDOW, present};
use crate::auth::{MANAGER_ROLES, Staff};
use crate::config::WEBHOOK_PATH;
use crate::error::{ApiError, TelephonyError};
use crate::phone::normalize_us_phone;
use crate::store::traits::NewOrgNumber;
use crate::telephony::{NumberKind, OwnedNumber};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orgs/{id}/numbers", get(list_numbers))
        .route("/api/orgs/{id}/twilio/provision", post(provision_number))
        .route(
            "/api/orgs/{id}/numbers/{number_id}",
            patch(assign_number).delete(delete_number),
        )
        .route("/api/orgs/{id}/numbers/{number_id}/assign", post(assign_number))
        .route("/api/orgs/{id}/numbers/{number_id}/activate", post(activate_number))
}

fn number_not_found() -> ApiError {
    ApiError::NotFound("Number not found".into())
}

/// GET /api/orgs/{id}/numbers
async fn list_numbers(
    State(state): State<AppState>,
    staff: Staff,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    staff.require_org(&org_id, MANAGER_ROLES)?;
    let items = state.db.list_org_numbers(&org_id).await?;
    Ok(Json(json!({ "items": items })).into_response())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ProvisionMode {
    #[default]
    Purchase,
    Attach,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionBody {
    #[serde(default)]
    mode: ProvisionMode,
    #[serde(rename = "type", default)]
    kind: NumberKind,
    area_code: Option<String>,
    phone_number: Option<String>,
    property_id: Option<String>,
}

/// Webhook URL the vendor should call for `public_url`; `None` when the
/// origin is missing or not reachable from the internet.
fn public_webhook_url(public_url: Option<&str>) -> Option<String> {
    let base = url::Url::parse(public_url?).ok()?;
    match base.host_str() {
        None | Some("localhost") | Some("127.0.0.1") => None,
        Some(_) => base.join(WEBHOOK_PATH).ok().map(String::from),
    }
}

fn vendor_failure(e: TelephonyError) -> ApiError {
    warn!("Number provisioning failed: {e}");
    ApiError::BadGateway(e.to_string())
}

/// POST /api/orgs/{id}/twilio/provision
///
/// Purchases a number (`mode: "purchase"`, the default) or attaches one the
/// vendor account already owns (`mode: "attach"`), points its SMS webhook at
/// this service and records it, optionally mapped to a property.
async fn provision_number(
    State(state): State<AppState>,
    staff: Staff,
    Path(org_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    staff.require_org(&org_id, MANAGER_ROLES)?;
    state
        .enforce_limit(
            &format!("org:{org_id}:numbers:provision"),
            10,
            Duration::from_secs(300),
            "Rate limit exceeded",
        )
        .await?;

    if !state.telephony.is_configured() {
        return Err(ApiError::Unavailable(
            "Twilio is not configured. Set TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN.".into(),
        ));
    }
    let sms_url = public_webhook_url(state.webhook.public_url.as_deref()).ok_or_else(|| {
        ApiError::BadRequest(
            "Set PUBLIC_URL to a public HTTPS origin so Twilio can reach your webhook.".into(),
        )
    })?;

    let body: ProvisionBody = if body.iter().all(u8::is_ascii_whitespace) {
        ProvisionBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let property_id = body.property_id.filter(|p| !p.is_empty());
    if let Some(pid) = property_id.as_deref() {
        if state.db.get_property(&org_id, pid).await?.is_none() {
            return Err(ApiError::NotFound("Property not found".into()));
        }
    }

    let owned: OwnedNumber = match body.mode {
        ProvisionMode::Attach => {
            let raw = body
                .phone_number
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| ApiError::BadRequest("phoneNumber is required".into()))?;
            let e164 = normalize_us_phone(&raw)
                .ok_or_else(|| ApiError::BadRequest("Invalid phoneNumber".into()))?;
            let owned = state
                .telephony
                .find_owned_number(&e164)
                .await
                .map_err(vendor_failure)?
                .ok_or_else(|| {
                    ApiError::NotFound("That number is not in your Twilio account".into())
                })?;
            state
                .telephony
                .configure_webhook(&owned.sid, &sms_url)
                .await
                .map_err(vendor_failure)?;
            owned
        }
        ProvisionMode::Purchase => {
            let area_code = match body.area_code.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(code) => Some(code.parse::<u16>().map_err(|_| {
                    ApiError::BadRequest("areaCode must be numeric".into())
                })?),
            };
            state
                .telephony
                .provision_number(body.kind, area_code, &sms_url)
                .await
                .map_err(vendor_failure)?
                .ok_or_else(|| {
                    ApiError::NotFound(match body.kind {
                        NumberKind::Local => "No local numbers available".into(),
                        NumberKind::TollFree => "No toll-free numbers available".into(),
                    })
                })?
        }
    };

    let number = state
        .db
        .insert_org_number(NewOrgNumber {
            organisation_id: org_id.clone(),
            property_id,
            e164: owned.phone_number,
            twilio_sid: owned.sid,
            active: true,
        })
        .await
        .map_err(|e| {
            if e.is_constraint() {
                ApiError::Conflict("Number already in use".into())
            } else {
                e.into()
            }
        })?;
    info!(
        org_id = %org_id,
        number_id = %number.id,
        e164 = %number.e164,
        mode = ?body.mode,
        "Number provisioned"
    );
    Ok((StatusCode::CREATED, Json(json!({"success": true, "number": number}))).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignBody {
    /// `None` when the key is absent; `Some(None)` unmaps the number.
    #[serde(default, deserialize_with = "present")]
    property_id: Option<Option<String>>,
    #[serde(default)]
    exclusive: bool,
    activate: Option<bool>,
}

/// POST /api/orgs/{id}/numbers/{number_id}/assign and PATCH /api/orgs/{id}/numbers/{number_id}
async fn assign_number(
    State(state): State<AppState>,
    staff: Staff,
    Path((org_id, number_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<AssignBody>,
) -> Result<Response, ApiError> {
    staff.require_org(&org_id, MANAGER_ROLES)?;
    let Some(property_id) = body.property_id else {
        return Err(ApiError::BadRequest(
            "propertyId (or null) is required".into(),
        ));
    };
    let property_id = property_id.filter(|p| !p.is_empty());

    if state.db.get_org_number(&org_id, &number_id).await?.is_none() {
        return Err(number_not_found());
    }
    if let Some(pid) = property_id.as_deref() {
        if state.db.get_property(&org_id, pid).await?.is_none() {
            return Err(ApiError::NotFound("Property not found".into()));
        }
    }

    let number = state
        .db
        .assign_org_number(
            &org_id,
            &number_id,
            property_id.as_deref(),
            body.exclusive,
            body.activate.unwrap_or(true),
        )
        .await?;
    info!(
        org_id = %org_id,
        number_id = %number_id,
        property_id = ?property_id,
        exclusive = body.exclusive,
        "Number mapping updated"
    );
    Ok(Json(json!({"success": true, "number": number})).into_response())
}

fn truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// POST /api/orgs/{id}/numbers/{number_id}/activate?exclusive=1
async fn activate_number(
    State(state): State<AppState>,
    staff: Staff,
    Path((org_id, number_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    staff.require_org(&org_id, MANAGER_ROLES)?;
    state
        .enforce_limit(
            &format!("org:{org_id}:numbers:activate"),
            DEFAULT_LIMIT,
            DEFAULT_WINDOW,
            "Rate limit exceeded",
        )
        .await?;

    if state.db.get_org_number(&org_id, &number_id).await?.is_none() {
        return Err(number_not_found());
    }
    let exclusive = truthy(query.get("exclusive").map(String::as_str));
    let number = state
        .db
        .activate_org_number(&org_id, &number_id, exclusive)
        .await?;
    info!(org_id = %org_id, number_id = %number_id, exclusive, "Number activated");
    Ok(Json(json!({"success": true, "number": number})).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct DeleteBody {
    #[serde(default)]
    release: bool,
}

/// DELETE /api/orgs/{id}/numbers/{number_id}
///
/// Soft-deactivates by default; `{"release": true}` gives the number back to
/// the vendor and deletes the row.
async fn delete_number(
    State(state): State<AppState>,
    staff: Staff,
    Path((org_id, number_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    staff.require_org(&org_id, MANAGER_ROLES)?;
    state
        .enforce_limit(
            &format!("org:{org_id}:numbers:delete"),
            10,
            Duration::from_secs(300),
            "Rate limit exceeded",
        )
        .await?;

    let DeleteBody { release } = serde_json::from_slice(&body).unwrap_or_default();

    let number = state
        .db
        .get_org_number(&org_id, &number_id)
        .await?
        .ok_or_else(number_not_found)?;

    if release {
        if let Err(e) = state.telephony.release_number(&number.twilio_sid).await {
            warn!(number_id = %number.id, "Number release failed: {e}");
            return Err(ApiError::BadGateway(format!("Twilio release failed: {e}")));
        }
        state.db.delete_org_number(&number.id).await?;
        info!(org_id = %org_id, number_id = %number.id, e164 = %number.e164, "Number released");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    state.db.set_org_number_active(&number.id, false).await?;
    info!(org_id = %org_id, number_id = %number.id, "Number deactivated");
    Ok(Json(json!({"success": true})).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_body_distinguishes_missing_and_null() {
        let missing: AssignBody = serde_json::from_str(r#"{"exclusive":true}"#).unwrap();
        assert!(missing.property_id.is_none());

        let null: AssignBody = serde_json::from_str(r#"{"propertyId":null}"#).unwrap();
        assert_eq!(null.property_id, Some(None));

        let set: AssignBody = serde_json::from_str(r#"{"propertyId":"p1"}"#).unwrap();
        assert_eq!(set.property_id, Some(Some("p1".to_string())));
        assert!(set.activate.is_none());
    }

    #[test]
    fn provision_body_defaults_to_local_purchase() {
        let body: ProvisionBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.mode, ProvisionMode::Purchase);
        assert_eq!(body.kind, NumberKind::Local);

        let attach: ProvisionBody =
            serde_json::from_str(r#"{"mode":"attach","phoneNumber":"+15557770000"}"#).unwrap();
        assert_eq!(attach.mode, ProvisionMode::Attach);

        let toll: ProvisionBody = serde_json::from_str(r#"{"type":"TOLLFREE"}"#).unwrap();
        assert_eq!(toll.kind, NumberKind::TollFree);
    }

    #[test]
    fn webhook_url_needs_a_public_origin() {
        assert_eq!(
            public_webhook_url(Some("https://sms.example.com")).as_deref(),
            Some("https://sms.example.com/api/webhooks/twilio")
        );
        assert_eq!(public_webhook_url(None), None);
        assert_eq!(public_webhook_url(Some("http://localhost:3000")), None);
        assert_eq!(public_webhook_url(Some("http://127.0.0.1:3000")), None);
        assert_eq!(public_webhook_url(Some("not a url")), None);
    }

    #[test]
    fn exclusive_flag_parsing() {
        assert!(truthy(Some("1")));
        assert!(truthy(Some("TRUE")));
        assert!(!truthy(Some("yes")));
        assert!(!truthy(None));
    }
}
