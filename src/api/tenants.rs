//! Staff tenant CRUD, CSV import and property reassignment.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::api::{ApiJson, AppState, FieldErrors, client_ip};
use crate::auth::{MANAGER_ROLES, STAFF_ROLES, Staff};
use crate::error::ApiError;
use crate::model::{ConversationState, Property, PropertySummary};
use crate::phone::normalize_us_phone;
use crate::store::traits::{
    ConversationUpsert, NewTenant, TenantPatch, TenantQuery, TenantWithProperty,
};
use crate::telephony::SendContext;
use crate::telephony::notifier::assignment_message;

const MAX_QUERY: usize = 120;
const MAX_NOTIFY_MESSAGE: usize = 1600;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tenants", get(list_tenants).post(create_tenant))
        .route(
            "/api/tenants/{id}",
            get(get_tenant).patch(update_tenant).delete(delete_tenant),
        )
        .route("/api/tenants/{id}/assign", post(assign_tenant))
        .route("/api/properties/{id}/tenants/import", post(import_tenants))
}

fn tenant_not_found() -> ApiError {
    ApiError::NotFound("Tenant not found".into())
}

fn property_not_found() -> ApiError {
    ApiError::NotFound("Property not found".into())
}

/// GET /api/tenants
async fn list_tenants(
    State(state): State<AppState>,
    staff: Staff,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let get = |k: &str| query.get(k).map(String::as_str);

    let mut errors = FieldErrors::default();
    let q = get("q").map(str::trim).filter(|q| !q.is_empty());
    errors.optional_length("q", q, 0, MAX_QUERY);
    let (page, page_size) = errors.page(get("page"), get("pageSize"));
    errors.finish()?;

    let listing = state
        .db
        .list_tenants(
            &staff.org_id,
            TenantQuery {
                q: q.map(String::from),
                property_id: get("propertyId").filter(|p| !p.is_empty()).map(String::from),
                page,
                page_size,
            },
        )
        .await?;
    Ok(Json(listing).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTenantBody {
    property_id: String,
    phone_number: String,
    name: Option<String>,
    unit_number: Option<String>,
}

/// POST /api/tenants
async fn create_tenant(
    State(state): State<AppState>,
    staff: Staff,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateTenantBody>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let key = client_ip(&headers).unwrap_or_else(|| "tenant-create".into());
    state
        .enforce_limit(&key, 10, Duration::from_secs(60), "Rate limit exceeded")
        .await?;

    let mut errors = FieldErrors::default();
    errors.length("phoneNumber", &body.phone_number, 7, 32);
    errors.optional_length("name", body.name.as_deref(), 1, 100);
    errors.optional_length("unitNumber", body.unit_number.as_deref(), 0, 20);
    errors.finish()?;

    let phone = normalize_us_phone(&body.phone_number)
        .ok_or_else(|| ApiError::BadRequest("Invalid phone number".into()))?;

    if state
        .db
        .get_property(&staff.org_id, &body.property_id)
        .await?
        .is_none()
    {
        return Err(property_not_found());
    }

    let tenant = state
        .db
        .upsert_tenant(NewTenant {
            organisation_id: staff.org_id.clone(),
            property_id: body.property_id.clone(),
            phone_number: phone.clone(),
            name: body.name,
            unit_number: body.unit_number,
        })
        .await?;

    state
        .db
        .upsert_conversation(ConversationUpsert {
            organisation_id: staff.org_id.clone(),
            phone_number: phone,
            property_id: Some(body.property_id),
            tenant_id: Some(tenant.id.clone()),
            state: ConversationState::Idle,
            last_message_at: Utc::now(),
        })
        .await?;

    info!(tenant_id = %tenant.id, org_id = %staff.org_id, "Tenant saved");
    Ok((StatusCode::CREATED, Json(tenant)).into_response())
}

/// GET /api/tenants/{id}
async fn get_tenant(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let detail = state
        .db
        .get_tenant_detail(&staff.org_id, &id)
        .await?
        .ok_or_else(tenant_not_found)?;
    Ok(Json(detail).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchTenantBody {
    name: Option<String>,
    unit_number: Option<String>,
    phone_number: Option<String>,
}

/// PATCH /api/tenants/{id}
async fn update_tenant(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PatchTenantBody>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;

    let mut errors = FieldErrors::default();
    errors.optional_length("name", body.name.as_deref(), 1, 100);
    errors.optional_length("unitNumber", body.unit_number.as_deref(), 0, 20);
    errors.optional_length("phoneNumber", body.phone_number.as_deref(), 7, 20);
    errors.finish()?;

    if state.db.get_tenant(&staff.org_id, &id).await?.is_none() {
        return Err(tenant_not_found());
    }

    let phone_number = match body.phone_number.as_deref() {
        Some(raw) => Some(
            normalize_us_phone(raw)
                .ok_or_else(|| ApiError::BadRequest("Invalid phoneNumber".into()))?,
        ),
        None => None,
    };

    let tenant = state
        .db
        .update_tenant(
            &id,
            TenantPatch {
                name: body.name,
                unit_number: body.unit_number,
                phone_number,
            },
        )
        .await
        .map_err(|e| {
            if e.is_constraint() {
                ApiError::Conflict("Phone already exists for this property".into())
            } else {
                error!(tenant_id = %id, "Tenant update failed: {e}");
                e.into()
            }
        })?;

    let property = state
        .db
        .get_property(&staff.org_id, &tenant.property_id)
        .await?
        .map(|p| PropertySummary::from(&p));
    Ok(Json(TenantWithProperty { tenant, property }).into_response())
}

/// DELETE /api/tenants/{id}
async fn delete_tenant(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    staff.require(MANAGER_ROLES)?;
    if state.db.get_tenant(&staff.org_id, &id).await?.is_none() {
        return Err(tenant_not_found());
    }
    if state.db.count_tickets_for_tenant(&id).await? > 0 {
        return Err(ApiError::Conflict(
            "Cannot delete tenant with existing tickets".into(),
        ));
    }
    state.db.delete_tenant(&id).await?;
    info!(tenant_id = %id, "Tenant deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── CSV import ──────────────────────────────────────────────────────

const MAX_IMPORT_ROWS: usize = 5_000;
const MIN_PHONE_LEN: usize = 7;

/// Accepted spellings per column, compared after `header_key`.
const PHONE_HEADERS: &[&str] = &["phone", "phonenumber", "tel", "mobile"];
const NAME_HEADERS: &[&str] = &["name", "tenant"];
const UNIT_HEADERS: &[&str] = &["unit", "unitnumber", "apartment", "apt"];

/// Lowercase and keep only ASCII letters and digits, so "Unit #" and
/// "unit_number" style headers line up with the aliases.
fn header_key(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct Columns {
    phone: Option<usize>,
    name: Option<usize>,
    unit: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let keys: Vec<String> = headers.iter().map(header_key).collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| keys.iter().position(|k| k == alias))
        };
        Columns {
            phone: find(PHONE_HEADERS),
            name: find(NAME_HEADERS),
            unit: find(UNIT_HEADERS),
        }
    }
}

/// One data row, numbered as a spreadsheet would (header is row 1).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportRow {
    row: u64,
    phone: Option<String>,
    name: Option<String>,
    unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct RowError {
    row: u64,
    message: &'static str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportReport {
    total: usize,
    created: usize,
    updated: usize,
    skipped: usize,
    errors: Vec<RowError>,
    dry_run: bool,
}

impl ImportReport {
    fn skip(&mut self, row: u64, message: &'static str) {
        self.skipped += 1;
        self.errors.push(RowError { row, message });
    }
}

/// Parse a CSV upload. Blank rows are dropped; cells are trimmed.
fn read_rows(body: &[u8]) -> Result<Vec<ImportRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);
    let columns = Columns::from_headers(reader.headers()?);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let cell = |column: Option<usize>| {
            column
                .and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        rows.push(ImportRow {
            row: record
                .position()
                .map(|p| p.line())
                .unwrap_or(index as u64 + 2),
            phone: cell(columns.phone),
            name: cell(columns.name),
            unit: cell(columns.unit),
        });
    }
    Ok(rows)
}

/// POST /api/properties/{id}/tenants/import?dryRun=1
///
/// The body is a CSV file with a header row. Each row is upserted by
/// `(phone, property)` and its conversation re-pointed at the property;
/// with `dryRun` the rows are only classified.
async fn import_tenants(
    State(state): State<AppState>,
    staff: Staff,
    Path(property_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let property: Property = state
        .db
        .get_property(&staff.org_id, &property_id)
        .await?
        .ok_or_else(property_not_found)?;

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("Missing file".into()));
    }
    let rows = read_rows(&body).map_err(|e| {
        debug!(property_id = %property.id, "Tenant import parse failed: {e}");
        ApiError::BadRequest("Could not parse file".into())
    })?;
    if rows.len() > MAX_IMPORT_ROWS {
        return Err(ApiError::BadRequest(format!(
            "Too many rows (max {MAX_IMPORT_ROWS})"
        )));
    }

    let dry_run = query
        .get("dryRun")
        .is_some_and(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"));
    let mut report = ImportReport {
        total: rows.len(),
        dry_run,
        ..Default::default()
    };

    for row in rows {
        let Some(raw_phone) = row.phone.filter(|p| p.chars().count() >= MIN_PHONE_LEN) else {
            report.skip(row.row, "Invalid row (missing phone/name/unit?)");
            continue;
        };
        let Some(phone) = normalize_us_phone(&raw_phone) else {
            report.skip(row.row, "Invalid phone number");
            continue;
        };

        let exists = state
            .db
            .find_tenant_in_property(&property.id, &phone)
            .await?
            .is_some();
        if !dry_run {
            let tenant = state
                .db
                .upsert_tenant(NewTenant {
                    organisation_id: staff.org_id.clone(),
                    property_id: property.id.clone(),
                    phone_number: phone.clone(),
                    name: row.name,
                    unit_number: row.unit,
                })
                .await?;
            state
                .db
                .upsert_conversation(ConversationUpsert {
                    organisation_id: staff.org_id.clone(),
                    phone_number: phone,
                    property_id: Some(property.id.clone()),
                    tenant_id: Some(tenant.id),
                    state: ConversationState::Idle,
                    last_message_at: Utc::now(),
                })
                .await?;
        }
        if exists {
            report.updated += 1;
        } else {
            report.created += 1;
        }
    }

    info!(
        property_id = %property.id,
        total = report.total,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        dry_run,
        "Tenant import finished"
    );
    Ok(Json(report).into_response())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignBody {
    property_id: String,
    #[serde(default = "default_true")]
    move_open_tickets: bool,
    #[serde(default = "default_true")]
    notify: bool,
    notify_message: Option<String>,
}

/// POST /api/tenants/{id}/assign
async fn assign_tenant(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignBody>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    state
        .enforce_limit(
            &format!("tenant-assign:{id}"),
            10,
            Duration::from_secs(60),
            "Rate limit exceeded",
        )
        .await?;

    let mut errors = FieldErrors::default();
    errors.optional_length("notifyMessage", body.notify_message.as_deref(), 0, MAX_NOTIFY_MESSAGE);
    errors.finish()?;

    let tenant = state
        .db
        .get_tenant(&staff.org_id, &id)
        .await?
        .ok_or_else(tenant_not_found)?;
    let target = state
        .db
        .get_property(&staff.org_id, &body.property_id)
        .await?
        .ok_or_else(property_not_found)?;

    if tenant.property_id == target.id {
        return Ok(Json(json!({
            "success": true,
            "moved": 0,
            "message": "Tenant already in property",
        }))
        .into_response());
    }

    let moved = state
        .db
        .reassign_tenant(&staff.org_id, &tenant, &target.id, body.move_open_tickets)
        .await?;

    if body.notify {
        let message = body
            .notify_message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| assignment_message(&target.name));
        state.notifier.send_detached(
            tenant.phone_number.clone(),
            message,
            SendContext::scoped(staff.org_id.clone(), Some(target.id.clone())),
            "assignment",
        );
    }

    info!(
        tenant_id = %tenant.id,
        new_property_id = %target.id,
        moved,
        "Tenant assigned to property"
    );
    Ok(Json(json!({"success": true, "moved": moved})).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_match_loosely() {
        assert_eq!(header_key("Phone Number"), "phonenumber");
        assert_eq!(header_key("UNIT_#"), "unit");
        assert_eq!(header_key("Apt."), "apt");
    }

    #[test]
    fn rows_follow_aliased_columns() {
        let input = "Tenant,Mobile,Apt\nDana, (555) 222-3333 ,4B\n,,\nLee,555-0000,\n";
        let rows = read_rows(input.as_bytes()).unwrap();
        assert_eq!(
            rows,
            vec![
                ImportRow {
                    row: 2,
                    phone: Some("(555) 222-3333".into()),
                    name: Some("Dana".into()),
                    unit: Some("4B".into()),
                },
                ImportRow {
                    row: 4,
                    phone: Some("555-0000".into()),
                    name: Some("Lee".into()),
                    unit: None,
                },
            ]
        );
    }

    #[test]
    fn missing_phone_column_leaves_phone_empty() {
        let rows = read_rows(b"name,unit\nDana,4B\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].phone.is_none());
    }

    #[test]
    fn short_rows_are_tolerated_and_bad_utf8_is_an_error() {
        let rows = read_rows(b"phone,name,unit\n5552223333\n").unwrap();
        assert_eq!(rows[0].phone.as_deref(), Some("5552223333"));
        assert!(rows[0].name.is_none());

        assert!(read_rows(b"phone\n\xff\xfe\n").is_err());
    }
}
