//! Staff ticket CRUD.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::api::{ApiJson, AppState, DEFAULT_LIMIT, DEFAULT_WINDOW, FieldErrors, client_ip};
use crate::auth::{MANAGER_ROLES, STAFF_ROLES, Staff};
use crate::error::ApiError;
use crate::model::{NewTicket, TicketCategory, TicketPriority, TicketStatus};
use crate::store::traits::{TicketFilter, TicketPatch};
use crate::telephony::SendContext;
use crate::telephony::notifier::{completion_message, status_update_message};

const MAX_DESCRIPTION: usize = 500;
const MAX_IMAGES: usize = 5;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route(
            "/api/tickets/{id}",
            get(get_ticket).patch(update_ticket).delete(delete_ticket),
        )
}

fn ticket_not_found() -> ApiError {
    ApiError::NotFound("Ticket not found".into())
}

/// GET /api/tickets
async fn list_tickets(
    State(state): State<AppState>,
    staff: Staff,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let get = |k: &str| query.get(k).map(String::as_str);

    let mut errors = FieldErrors::default();
    let filter = TicketFilter {
        status: errors.parse::<TicketStatus>("status", get("status")),
        priority: errors.parse::<TicketPriority>("priority", get("priority")),
        category: errors.parse::<TicketCategory>("category", get("category")),
        property_id: get("propertyId").filter(|p| !p.is_empty()).map(String::from),
    };
    let (page, page_size) = errors.page(get("page"), get("pageSize"));
    errors.finish()?;

    let listing = state
        .db
        .list_tickets(&staff.org_id, filter, page, page_size)
        .await?;
    Ok(Json(listing).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTicketBody {
    description: Option<String>,
    category: Option<TicketCategory>,
    priority: Option<TicketPriority>,
    image_urls: Option<Vec<String>>,
    tenant_id: String,
    property_id: String,
}

/// POST /api/tickets
async fn create_ticket(
    State(state): State<AppState>,
    staff: Staff,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateTicketBody>,
) -> Result<Response, ApiError> {
    staff.require(MANAGER_ROLES)?;
    let key = client_ip(&headers).unwrap_or_else(|| "global-create".into());
    state
        .enforce_limit(&key, 5, Duration::from_secs(60), "Too many tickets")
        .await?;

    let mut errors = FieldErrors::default();
    errors.optional_length("description", body.description.as_deref(), 0, MAX_DESCRIPTION);
    let image_urls = body.image_urls.unwrap_or_default();
    if image_urls.len() > MAX_IMAGES {
        errors.add("imageUrls", format!("Array must contain at most {MAX_IMAGES} element(s)"));
    }
    if image_urls.iter().any(|u| url::Url::parse(u).is_err()) {
        errors.add("imageUrls", "Invalid url");
    }
    errors.finish()?;

    if state
        .db
        .get_property(&staff.org_id, &body.property_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Property not found".into()));
    }
    let tenant = state
        .db
        .get_tenant(&staff.org_id, &body.tenant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tenant not found".into()))?;
    if tenant.property_id != body.property_id {
        return Err(ApiError::BadRequest(
            "Tenant does not belong to that property".into(),
        ));
    }

    let ticket = state
        .db
        .insert_ticket(NewTicket {
            organisation_id: staff.org_id.clone(),
            property_id: body.property_id,
            tenant_id: tenant.id,
            description: body.description.unwrap_or_default(),
            category: body.category.unwrap_or(TicketCategory::Other),
            priority: body.priority.unwrap_or(TicketPriority::Medium),
            image_urls,
            external_message_sid: None,
        })
        .await?;

    info!(ticket_id = %ticket.id, user_id = %staff.user_id, "Ticket created via API");
    Ok((StatusCode::CREATED, Json(ticket)).into_response())
}

/// GET /api/tickets/{id}
async fn get_ticket(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    let ticket = state
        .db
        .get_ticket(&staff.org_id, &id)
        .await?
        .ok_or_else(ticket_not_found)?;
    Ok(Json(ticket).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchTicketBody {
    status: Option<TicketStatus>,
    priority: Option<TicketPriority>,
    description: Option<String>,
    /// Text the tenant about a status change.
    #[serde(default)]
    notify: bool,
    note: Option<String>,
}

/// PATCH /api/tickets/{id}
async fn update_ticket(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PatchTicketBody>,
) -> Result<Response, ApiError> {
    staff.require(STAFF_ROLES)?;
    state
        .enforce_limit(&format!("patch:{id}"), DEFAULT_LIMIT, DEFAULT_WINDOW, "Too many updates")
        .await?;

    let mut errors = FieldErrors::default();
    errors.optional_length("description", body.description.as_deref(), 0, MAX_DESCRIPTION);
    errors.finish()?;

    let patch = TicketPatch {
        status: body.status,
        priority: body.priority,
        description: body.description,
    };
    if patch.is_empty() {
        return Err(ApiError::BadRequest("Empty body".into()));
    }

    let existing = state
        .db
        .get_ticket(&staff.org_id, &id)
        .await?
        .ok_or_else(ticket_not_found)?;
    let updated = state.db.update_ticket(&id, patch).await?;
    info!(ticket_id = %id, status = %updated.status, "Ticket updated");

    let status_changed = updated.status != existing.ticket.status;
    if body.notify && status_changed {
        if let Some(tenant) = existing.tenant {
            let note = body.note.as_deref();
            let message = if updated.status == TicketStatus::Completed {
                completion_message(&updated.id, note)
            } else {
                status_update_message(&updated.id, updated.status, note)
            };
            state.notifier.send_detached(
                tenant.phone_number,
                message,
                SendContext::scoped(staff.org_id.clone(), Some(updated.property_id.clone())),
                "status_update",
            );
        }
    }

    Ok(Json(updated).into_response())
}

/// DELETE /api/tickets/{id}
async fn delete_ticket(
    State(state): State<AppState>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    staff.require(MANAGER_ROLES)?;
    if state.db.get_ticket(&staff.org_id, &id).await?.is_none() {
        return Err(ticket_not_found());
    }
    state.db.delete_ticket(&id).await?;
    info!(ticket_id = %id, "Ticket deleted");
    Ok(StatusCode::NO_CONTENT)
}
