//! Unified `Database` trait, the single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::model::{
    Conversation, ConversationState, Membership, NewTicket, OrgNumber, Organisation, Page,
    Property, PropertySummary, Role, Tenant, Ticket, TicketCategory, TicketPriority, TicketStatus,
    TicketWithRelations,
};

/// Fields for a new property.
#[derive(Debug, Clone)]
pub struct NewProperty {
    pub organisation_id: String,
    pub name: String,
    pub address: String,
    pub phone_number: String,
    pub manager_id: Option<String>,
}

/// Partial property update; `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct PropertyPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub manager_id: Option<String>,
}

/// Fields for a new tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub organisation_id: String,
    pub property_id: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub unit_number: Option<String>,
}

/// Partial tenant update; `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct TenantPatch {
    pub name: Option<String>,
    pub unit_number: Option<String>,
    pub phone_number: Option<String>,
}

/// Tenant search parameters.
#[derive(Debug, Clone, Default)]
pub struct TenantQuery {
    pub q: Option<String>,
    pub property_id: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

/// Tenant listing row with its property summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantWithProperty {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub property: Option<PropertySummary>,
}

/// Tenant detail: property plus every ticket, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDetail {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub property: Option<PropertySummary>,
    pub tickets: Vec<Ticket>,
}

/// Ticket listing filters.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    pub property_id: Option<String>,
}

/// Partial ticket update; `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub description: Option<String>,
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.description.is_none()
    }
}

/// Fields for a new org number.
#[derive(Debug, Clone)]
pub struct NewOrgNumber {
    pub organisation_id: String,
    pub property_id: Option<String>,
    pub e164: String,
    pub twilio_sid: String,
    pub active: bool,
}

/// Org number with the property it is mapped to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgNumberWithProperty {
    #[serde(flatten)]
    pub number: OrgNumber,
    pub property: Option<PropertySummary>,
}

/// Conversation pointer write.
#[derive(Debug, Clone)]
pub struct ConversationUpsert {
    pub organisation_id: String,
    pub phone_number: String,
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    pub state: ConversationState,
    pub last_message_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering every entity the service touches.
///
/// Org-scoped reads take the organisation id and return `None` for rows
/// belonging to another organisation.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Organisations ───────────────────────────────────────────────

    async fn create_organisation(&self, name: &str, slug: &str)
    -> Result<Organisation, DatabaseError>;

    async fn get_organisation(&self, id: &str) -> Result<Option<Organisation>, DatabaseError>;

    /// Create an organisation and make `user_id` its owner in one transaction.
    /// A taken slug is a `Constraint` error.
    async fn create_owned_organisation(
        &self,
        name: &str,
        slug: &str,
        user_id: &str,
    ) -> Result<Organisation, DatabaseError>;

    async fn add_member(&self, org_id: &str, user_id: &str, role: Role)
    -> Result<(), DatabaseError>;

    /// Every organisation `user_id` belongs to, oldest membership first.
    async fn list_memberships(&self, user_id: &str) -> Result<Vec<Membership>, DatabaseError>;

    // ── Properties ──────────────────────────────────────────────────

    /// Insert a property. A duplicate phone number is a `Constraint` error.
    async fn insert_property(&self, property: NewProperty) -> Result<Property, DatabaseError>;

    async fn get_property(&self, org_id: &str, id: &str)
    -> Result<Option<Property>, DatabaseError>;

    /// Legacy routing: a property addressed directly by its phone number.
    async fn find_property_by_phone(&self, phone: &str)
    -> Result<Option<Property>, DatabaseError>;

    /// Find or create the organisation's unassigned inbox property.
    async fn ensure_unassigned_property(&self, org_id: &str) -> Result<Property, DatabaseError>;

    /// Page through properties, newest first; `search` matches name or address.
    async fn list_properties(
        &self,
        org_id: &str,
        search: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Property>, DatabaseError>;

    async fn update_property(&self, id: &str, patch: PropertyPatch)
    -> Result<Property, DatabaseError>;

    /// Delete a property with its tenants, tickets and conversations; numbers are unmapped.
    async fn delete_property(&self, id: &str) -> Result<(), DatabaseError>;

    // ── Org numbers ─────────────────────────────────────────────────

    async fn insert_org_number(&self, number: NewOrgNumber) -> Result<OrgNumber, DatabaseError>;

    async fn get_org_number(&self, org_id: &str, id: &str)
    -> Result<Option<OrgNumber>, DatabaseError>;

    async fn find_org_number_by_e164(&self, e164: &str)
    -> Result<Option<OrgNumber>, DatabaseError>;

    /// All numbers of an organisation, newest first.
    async fn list_org_numbers(&self, org_id: &str)
    -> Result<Vec<OrgNumberWithProperty>, DatabaseError>;

    /// Map (or unmap) a number to a property.
    ///
    /// With `exclusive` and a property, every other number on that property
    /// is deactivated in the same transaction.
    async fn assign_org_number(
        &self,
        org_id: &str,
        id: &str,
        property_id: Option<&str>,
        exclusive: bool,
        activate: bool,
    ) -> Result<OrgNumberWithProperty, DatabaseError>;

    /// Activate a number. With `exclusive`, deactivate the others in its
    /// property scope (or the whole org when the number is unmapped).
    async fn activate_org_number(
        &self,
        org_id: &str,
        id: &str,
        exclusive: bool,
    ) -> Result<OrgNumber, DatabaseError>;

    async fn set_org_number_active(&self, id: &str, active: bool) -> Result<(), DatabaseError>;

    async fn delete_org_number(&self, id: &str) -> Result<(), DatabaseError>;

    /// Newest active number scoped to `property_id`, or org-wide (unmapped)
    /// when `property_id` is `None`.
    async fn newest_active_number(
        &self,
        org_id: &str,
        property_id: Option<&str>,
    ) -> Result<Option<OrgNumber>, DatabaseError>;

    // ── Tenants ─────────────────────────────────────────────────────

    /// First tenant in the org whose stored phone is any of `phones`.
    async fn find_tenant_by_phones(
        &self,
        org_id: &str,
        phones: &[String],
    ) -> Result<Option<Tenant>, DatabaseError>;

    /// The tenant with exactly this stored phone in `property_id`.
    async fn find_tenant_in_property(
        &self,
        property_id: &str,
        phone: &str,
    ) -> Result<Option<Tenant>, DatabaseError>;

    async fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant, DatabaseError>;

    /// Insert or update by `(phone_number, property_id)`.
    async fn upsert_tenant(&self, tenant: NewTenant) -> Result<Tenant, DatabaseError>;

    async fn get_tenant(&self, org_id: &str, id: &str) -> Result<Option<Tenant>, DatabaseError>;

    async fn get_tenant_detail(
        &self,
        org_id: &str,
        id: &str,
    ) -> Result<Option<TenantDetail>, DatabaseError>;

    async fn list_tenants(
        &self,
        org_id: &str,
        query: TenantQuery,
    ) -> Result<Page<TenantWithProperty>, DatabaseError>;

    async fn update_tenant(&self, id: &str, patch: TenantPatch) -> Result<Tenant, DatabaseError>;

    async fn delete_tenant(&self, id: &str) -> Result<(), DatabaseError>;

    async fn count_tickets_for_tenant(&self, tenant_id: &str) -> Result<u64, DatabaseError>;

    /// Move a tenant to another property, optionally carrying its active
    /// tickets along, and re-point the conversation. Returns tickets moved.
    async fn reassign_tenant(
        &self,
        org_id: &str,
        tenant: &Tenant,
        property_id: &str,
        move_open_tickets: bool,
    ) -> Result<u64, DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    async fn upsert_conversation(&self, conversation: ConversationUpsert)
    -> Result<(), DatabaseError>;

    async fn get_conversation(
        &self,
        org_id: &str,
        phone: &str,
    ) -> Result<Option<Conversation>, DatabaseError>;

    // ── Tickets ─────────────────────────────────────────────────────

    /// Id of the ticket created from a given vendor message, if any.
    async fn find_ticket_by_message_sid(&self, sid: &str) -> Result<Option<String>, DatabaseError>;

    /// Insert a ticket. A repeated `external_message_sid` is a `Constraint` error.
    async fn insert_ticket(&self, ticket: NewTicket) -> Result<Ticket, DatabaseError>;

    async fn get_ticket(&self, org_id: &str, id: &str)
    -> Result<Option<TicketWithRelations>, DatabaseError>;

    async fn list_tickets(
        &self,
        org_id: &str,
        filter: TicketFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<TicketWithRelations>, DatabaseError>;

    async fn update_ticket(&self, id: &str, patch: TicketPatch) -> Result<Ticket, DatabaseError>;

    async fn delete_ticket(&self, id: &str) -> Result<(), DatabaseError>;
}
