//! libSQL backend, the async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Row, Transaction, params, params_from_iter};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    Conversation, ConversationState, Membership, NewTicket, OrgNumber, Organisation, Page,
    Property, PropertySummary, Role, Tenant, Ticket, TicketStatus, TicketWithRelations,
    UNASSIGNED_INBOX_NAME,
};
use crate::store::migrations;
use crate::store::traits::{
    ConversationUpsert, Database, NewOrgNumber, NewProperty, NewTenant, OrgNumberWithProperty,
    PropertyPatch, TenantDetail, TenantPatch, TenantQuery, TenantWithProperty, TicketFilter,
    TicketPatch,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. A
/// transaction on that connection would capture any statement another task
/// runs while it is open, so `gate` is taken shared per statement and
/// exclusively for the whole life of a transaction.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    gate: RwLock<()>,
}

/// Where a statement runs.
#[derive(Clone, Copy)]
enum Exec<'a> {
    /// The shared connection; each statement holds the gate shared.
    Shared(&'a Connection, &'a RwLock<()>),
    /// An open transaction; its owner holds the gate exclusively.
    Tx(&'a Connection),
}

impl<'a> Exec<'a> {
    async fn acquire(self) -> (&'a Connection, Option<RwLockReadGuard<'a, ()>>) {
        match self {
            Exec::Shared(conn, gate) => (conn, Some(gate.read().await)),
            Exec::Tx(conn) => (conn, None),
        }
    }
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            gate: RwLock::new(()),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            gate: RwLock::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> Exec<'_> {
        Exec::Shared(&self.conn, &self.gate)
    }

    /// Begin a transaction. Callers must already hold `gate.write()`.
    async fn begin(&self, context: &str) -> Result<Transaction, DatabaseError> {
        self.conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: begin: {e}")))
    }

    async fn property_summaries(
        &self,
        ids: impl Iterator<Item = &str>,
    ) -> Result<HashMap<String, PropertySummary>, DatabaseError> {
        let mut out = HashMap::new();
        for id in ids {
            if out.contains_key(id) {
                continue;
            }
            if let Some(p) = property_by_id(self.conn(), id).await? {
                out.insert(id.to_string(), PropertySummary::from(&p));
            }
        }
        Ok(out)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed-width UTC so text ordering is chronological.
fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    fmt_datetime(Utc::now())
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn text(s: &str) -> libsql::Value {
    libsql::Value::Text(s.to_string())
}

/// Escape LIKE wildcards and wrap in `%…%`.
fn like_pattern(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn offset(page: u32, page_size: u32) -> i64 {
    (page.max(1) as i64 - 1) * page_size as i64
}

async fn query_opt<T>(
    conn: Exec<'_>,
    context: &str,
    sql: &str,
    params: impl libsql::params::IntoParams,
    map: fn(&Row) -> Result<T, libsql::Error>,
) -> Result<Option<T>, DatabaseError> {
    let (conn, _shared) = conn.acquire().await;
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::from_libsql(context, e))?;
    match rows.next().await {
        Ok(Some(row)) => map(&row)
            .map(Some)
            .map_err(|e| DatabaseError::Query(format!("{context} row parse: {e}"))),
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::from_libsql(context, e)),
    }
}

async fn query_all<T>(
    conn: Exec<'_>,
    context: &str,
    sql: &str,
    params: impl libsql::params::IntoParams,
    map: fn(&Row) -> Result<T, libsql::Error>,
) -> Result<Vec<T>, DatabaseError> {
    let (conn, _shared) = conn.acquire().await;
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::from_libsql(context, e))?;
    let mut out = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => match map(&row) {
                Ok(item) => out.push(item),
                Err(e) => tracing::warn!(context, "Skipping row: {e}"),
            },
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::from_libsql(context, e)),
        }
    }
    Ok(out)
}

async fn query_count(
    conn: Exec<'_>,
    context: &str,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<u64, DatabaseError> {
    let count = query_opt(conn, context, sql, params, |row| row.get::<i64>(0)).await?;
    Ok(count.unwrap_or(0).max(0) as u64)
}

async fn execute(
    conn: Exec<'_>,
    context: &str,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<u64, DatabaseError> {
    let (conn, _shared) = conn.acquire().await;
    conn.execute(sql, params)
        .await
        .map_err(|e| DatabaseError::from_libsql(context, e))
}

/// Commit on success, roll back on error.
async fn finish<T>(
    tx: Transaction,
    context: &str,
    result: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| DatabaseError::Query(format!("{context} commit: {e}")))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(context, "Rollback failed: {rb}");
            }
            Err(e)
        }
    }
}

fn not_found(entity: &str, id: &str) -> DatabaseError {
    DatabaseError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

const ORG_COLUMNS: &str = "id, name, slug, created_at";

const PROPERTY_COLUMNS: &str =
    "id, organisation_id, name, address, phone_number, manager_id, created_at, updated_at";

const TENANT_COLUMNS: &str =
    "id, organisation_id, property_id, phone_number, name, unit_number, created_at, updated_at";

const NUMBER_COLUMNS: &str = "id, organisation_id, property_id, e164, twilio_sid, active, created_at";

const CONVERSATION_COLUMNS: &str =
    "organisation_id, phone_number, property_id, tenant_id, state, last_message_at";

const TICKET_COLUMNS: &str = "id, organisation_id, property_id, tenant_id, description, category, priority, status, image_urls, external_message_sid, created_at, updated_at";

fn row_to_org(row: &Row) -> Result<Organisation, libsql::Error> {
    let created: String = row.get(3)?;
    Ok(Organisation {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: parse_datetime(&created),
    })
}

/// `role` followed by the organisation columns.
fn row_to_membership(row: &Row) -> Result<Membership, libsql::Error> {
    let role: String = row.get(0)?;
    let created: String = row.get(4)?;
    Ok(Membership {
        role: role.parse().unwrap_or(Role::Tenant),
        organisation: Organisation {
            id: row.get(1)?,
            name: row.get(2)?,
            slug: row.get(3)?,
            created_at: parse_datetime(&created),
        },
    })
}

fn row_to_property(row: &Row) -> Result<Property, libsql::Error> {
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(Property {
        id: row.get(0)?,
        organisation_id: row.get(1)?,
        name: row.get(2)?,
        address: row.get(3)?,
        phone_number: row.get(4)?,
        manager_id: row.get::<String>(5).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_tenant(row: &Row) -> Result<Tenant, libsql::Error> {
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(Tenant {
        id: row.get(0)?,
        organisation_id: row.get(1)?,
        property_id: row.get(2)?,
        phone_number: row.get(3)?,
        name: row.get::<String>(4).ok(),
        unit_number: row.get::<String>(5).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_number(row: &Row) -> Result<OrgNumber, libsql::Error> {
    let active: i64 = row.get(5)?;
    let created: String = row.get(6)?;
    Ok(OrgNumber {
        id: row.get(0)?,
        organisation_id: row.get(1)?,
        property_id: row.get::<String>(2).ok(),
        e164: row.get(3)?,
        twilio_sid: row.get(4)?,
        active: active != 0,
        created_at: parse_datetime(&created),
    })
}

fn row_to_conversation(row: &Row) -> Result<Conversation, libsql::Error> {
    let state: String = row.get(4)?;
    let last: String = row.get(5)?;
    Ok(Conversation {
        organisation_id: row.get(0)?,
        phone_number: row.get(1)?,
        property_id: row.get::<String>(2).ok(),
        tenant_id: row.get::<String>(3).ok(),
        state: state.parse().unwrap_or(ConversationState::Idle),
        last_message_at: parse_datetime(&last),
    })
}

fn row_to_ticket(row: &Row) -> Result<Ticket, libsql::Error> {
    let category: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let status: String = row.get(7)?;
    let image_urls: String = row.get(8)?;
    let created: String = row.get(10)?;
    let updated: String = row.get(11)?;
    Ok(Ticket {
        id: row.get(0)?,
        organisation_id: row.get(1)?,
        property_id: row.get(2)?,
        tenant_id: row.get(3)?,
        description: row.get(4)?,
        category: category.parse().unwrap_or_default(),
        priority: priority.parse().unwrap_or_default(),
        status: status.parse().unwrap_or_default(),
        image_urls: serde_json::from_str(&image_urls).unwrap_or_default(),
        external_message_sid: row.get::<String>(9).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

// ── Shared statements (usable inside transactions) ──────────────────

async fn property_by_id(conn: Exec<'_>, id: &str) -> Result<Option<Property>, DatabaseError> {
    query_opt(
        conn,
        "property_by_id",
        &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = ?1"),
        params![id],
        row_to_property,
    )
    .await
}

async fn tenant_by_id(conn: Exec<'_>, id: &str) -> Result<Option<Tenant>, DatabaseError> {
    query_opt(
        conn,
        "tenant_by_id",
        &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"),
        params![id],
        row_to_tenant,
    )
    .await
}

async fn ticket_by_id(conn: Exec<'_>, id: &str) -> Result<Option<Ticket>, DatabaseError> {
    query_opt(
        conn,
        "ticket_by_id",
        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
        params![id],
        row_to_ticket,
    )
    .await
}

async fn number_by_id(conn: Exec<'_>, id: &str) -> Result<Option<OrgNumber>, DatabaseError> {
    query_opt(
        conn,
        "number_by_id",
        &format!("SELECT {NUMBER_COLUMNS} FROM org_numbers WHERE id = ?1"),
        params![id],
        row_to_number,
    )
    .await
}

async fn upsert_conversation_on(
    conn: Exec<'_>,
    c: &ConversationUpsert,
) -> Result<(), DatabaseError> {
    execute(
        conn,
        "upsert_conversation",
        "INSERT INTO conversations (organisation_id, phone_number, property_id, tenant_id, state, last_message_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (organisation_id, phone_number) DO UPDATE SET
            property_id = excluded.property_id,
            tenant_id = excluded.tenant_id,
            state = excluded.state,
            last_message_at = excluded.last_message_at",
        params![
            c.organisation_id.as_str(),
            c.phone_number.as_str(),
            opt_text(c.property_id.as_deref()),
            opt_text(c.tenant_id.as_deref()),
            c.state.as_str(),
            fmt_datetime(c.last_message_at),
        ],
    )
    .await?;
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    // ── Organisations ───────────────────────────────────────────────

    async fn create_organisation(
        &self,
        name: &str,
        slug: &str,
    ) -> Result<Organisation, DatabaseError> {
        let org = Organisation {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: Utc::now(),
        };
        execute(
            self.conn(),
            "create_organisation",
            "INSERT INTO organisations (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![org.id.as_str(), name, slug, fmt_datetime(org.created_at)],
        )
        .await?;
        debug!(org_id = %org.id, slug, "Organisation created");
        Ok(org)
    }

    async fn get_organisation(&self, id: &str) -> Result<Option<Organisation>, DatabaseError> {
        query_opt(
            self.conn(),
            "get_organisation",
            &format!("SELECT {ORG_COLUMNS} FROM organisations WHERE id = ?1"),
            params![id],
            row_to_org,
        )
        .await
    }

    async fn create_owned_organisation(
        &self,
        name: &str,
        slug: &str,
        user_id: &str,
    ) -> Result<Organisation, DatabaseError> {
        let org = Organisation {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: Utc::now(),
        };
        let created = fmt_datetime(org.created_at);

        let _exclusive = self.gate.write().await;
        let tx = self.begin("create_owned_organisation").await?;
        let result = async {
            execute(
                Exec::Tx(&tx),
                "create_owned_organisation",
                "INSERT INTO organisations (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![org.id.as_str(), name, slug, created.as_str()],
            )
            .await?;
            execute(
                Exec::Tx(&tx),
                "create_owned_organisation owner",
                "INSERT INTO memberships (organisation_id, user_id, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![org.id.as_str(), user_id, Role::Owner.as_str(), created.as_str()],
            )
            .await?;
            Ok::<_, DatabaseError>(())
        }
        .await;
        finish(tx, "create_owned_organisation", result).await?;
        info!(org_id = %org.id, slug, "Organisation created");
        Ok(org)
    }

    async fn add_member(
        &self,
        org_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), DatabaseError> {
        execute(
            self.conn(),
            "add_member",
            "INSERT INTO memberships (organisation_id, user_id, role, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (organisation_id, user_id) DO UPDATE SET role = excluded.role",
            params![org_id, user_id, role.as_str(), now()],
        )
        .await?;
        Ok(())
    }

    async fn list_memberships(&self, user_id: &str) -> Result<Vec<Membership>, DatabaseError> {
        query_all(
            self.conn(),
            "list_memberships",
            "SELECT m.role, o.id, o.name, o.slug, o.created_at
             FROM memberships m JOIN organisations o ON o.id = m.organisation_id
             WHERE m.user_id = ?1
             ORDER BY m.created_at ASC, m.rowid ASC",
            params![user_id],
            row_to_membership,
        )
        .await
    }

    // ── Properties ──────────────────────────────────────────────────

    async fn insert_property(&self, p: NewProperty) -> Result<Property, DatabaseError> {
        let now = Utc::now();
        let property = Property {
            id: Uuid::new_v4().to_string(),
            organisation_id: p.organisation_id,
            name: p.name,
            address: p.address,
            phone_number: p.phone_number,
            manager_id: p.manager_id,
            created_at: now,
            updated_at: now,
        };
        execute(
            self.conn(),
            "insert_property",
            &format!("INSERT INTO properties ({PROPERTY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"),
            params![
                property.id.as_str(),
                property.organisation_id.as_str(),
                property.name.as_str(),
                property.address.as_str(),
                property.phone_number.as_str(),
                opt_text(property.manager_id.as_deref()),
                fmt_datetime(now),
            ],
        )
        .await?;
        debug!(property_id = %property.id, "Property inserted");
        Ok(property)
    }

    async fn get_property(
        &self,
        org_id: &str,
        id: &str,
    ) -> Result<Option<Property>, DatabaseError> {
        query_opt(
            self.conn(),
            "get_property",
            &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = ?1 AND organisation_id = ?2"),
            params![id, org_id],
            row_to_property,
        )
        .await
    }

    async fn find_property_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Property>, DatabaseError> {
        query_opt(
            self.conn(),
            "find_property_by_phone",
            &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE phone_number = ?1"),
            params![phone],
            row_to_property,
        )
        .await
    }

    async fn ensure_unassigned_property(&self, org_id: &str) -> Result<Property, DatabaseError> {
        let existing = query_opt(
            self.conn(),
            "ensure_unassigned_property",
            &format!(
                "SELECT {PROPERTY_COLUMNS} FROM properties WHERE organisation_id = ?1 AND name = ?2
                 ORDER BY created_at ASC LIMIT 1"
            ),
            params![org_id, UNASSIGNED_INBOX_NAME],
            row_to_property,
        )
        .await?;
        if let Some(property) = existing {
            return Ok(property);
        }

        let org_prefix: String = org_id.chars().take(8).collect();
        let property = self
            .insert_property(NewProperty {
                organisation_id: org_id.to_string(),
                name: UNASSIGNED_INBOX_NAME.to_string(),
                address: "SMS Intake".to_string(),
                phone_number: format!(
                    "UNASSIGNED-{org_prefix}-{}",
                    Utc::now().timestamp_millis()
                ),
                manager_id: None,
            })
            .await?;
        info!(org_id, property_id = %property.id, "Created unassigned inbox property");
        Ok(property)
    }

    async fn list_properties(
        &self,
        org_id: &str,
        search: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Property>, DatabaseError> {
        let pattern = search.filter(|s| !s.is_empty()).map(like_pattern);
        let filter = "organisation_id = ?1 AND (?2 IS NULL OR name LIKE ?2 ESCAPE '\\' OR address LIKE ?2 ESCAPE '\\')";

        let total = query_count(
            self.conn(),
            "list_properties count",
            &format!("SELECT COUNT(*) FROM properties WHERE {filter}"),
            params![org_id, opt_text(pattern.as_deref())],
        )
        .await?;

        let items = query_all(
            self.conn(),
            "list_properties",
            &format!(
                "SELECT {PROPERTY_COLUMNS} FROM properties WHERE {filter}
                 ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
            ),
            params![
                org_id,
                opt_text(pattern.as_deref()),
                page_size as i64,
                offset(page, page_size)
            ],
            row_to_property,
        )
        .await?;

        Ok(Page {
            total,
            items,
            page,
            page_size,
        })
    }

    async fn update_property(
        &self,
        id: &str,
        patch: PropertyPatch,
    ) -> Result<Property, DatabaseError> {
        let mut property = property_by_id(self.conn(), id)
            .await?
            .ok_or_else(|| not_found("Property", id))?;

        if let Some(name) = patch.name {
            property.name = name;
        }
        if let Some(address) = patch.address {
            property.address = address;
        }
        if let Some(phone) = patch.phone_number {
            property.phone_number = phone;
        }
        if let Some(manager) = patch.manager_id {
            property.manager_id = Some(manager);
        }
        property.updated_at = Utc::now();

        execute(
            self.conn(),
            "update_property",
            "UPDATE properties SET name = ?1, address = ?2, phone_number = ?3, manager_id = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                property.name.as_str(),
                property.address.as_str(),
                property.phone_number.as_str(),
                opt_text(property.manager_id.as_deref()),
                fmt_datetime(property.updated_at),
                id,
            ],
        )
        .await?;
        Ok(property)
    }

    async fn delete_property(&self, id: &str) -> Result<(), DatabaseError> {
        let _exclusive = self.gate.write().await;
        let tx = self.begin("delete_property").await?;
        let result = async {
            for (context, sql) in [
                ("delete_property tickets", "DELETE FROM tickets WHERE property_id = ?1"),
                ("delete_property conversations", "DELETE FROM conversations WHERE property_id = ?1"),
                ("delete_property tenants", "DELETE FROM tenants WHERE property_id = ?1"),
                (
                    "delete_property numbers",
                    "UPDATE org_numbers SET property_id = NULL WHERE property_id = ?1",
                ),
                ("delete_property", "DELETE FROM properties WHERE id = ?1"),
            ] {
                execute(Exec::Tx(&tx), context, sql, params![id]).await?;
            }
            Ok::<_, DatabaseError>(())
        }
        .await;
        finish(tx, "delete_property", result).await
    }

    // ── Org numbers ─────────────────────────────────────────────────

    async fn insert_org_number(&self, n: NewOrgNumber) -> Result<OrgNumber, DatabaseError> {
        let number = OrgNumber {
            id: Uuid::new_v4().to_string(),
            organisation_id: n.organisation_id,
            property_id: n.property_id,
            e164: n.e164,
            twilio_sid: n.twilio_sid,
            active: n.active,
            created_at: Utc::now(),
        };
        execute(
            self.conn(),
            "insert_org_number",
            &format!("INSERT INTO org_numbers ({NUMBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                number.id.as_str(),
                number.organisation_id.as_str(),
                opt_text(number.property_id.as_deref()),
                number.e164.as_str(),
                number.twilio_sid.as_str(),
                number.active as i64,
                fmt_datetime(number.created_at),
            ],
        )
        .await?;
        Ok(number)
    }

    async fn get_org_number(
        &self,
        org_id: &str,
        id: &str,
    ) -> Result<Option<OrgNumber>, DatabaseError> {
        query_opt(
            self.conn(),
            "get_org_number",
            &format!("SELECT {NUMBER_COLUMNS} FROM org_numbers WHERE id = ?1 AND organisation_id = ?2"),
            params![id, org_id],
            row_to_number,
        )
        .await
    }

    async fn find_org_number_by_e164(
        &self,
        e164: &str,
    ) -> Result<Option<OrgNumber>, DatabaseError> {
        query_opt(
            self.conn(),
            "find_org_number_by_e164",
            &format!("SELECT {NUMBER_COLUMNS} FROM org_numbers WHERE e164 = ?1"),
            params![e164],
            row_to_number,
        )
        .await
    }

    async fn list_org_numbers(
        &self,
        org_id: &str,
    ) -> Result<Vec<OrgNumberWithProperty>, DatabaseError> {
        let numbers = query_all(
            self.conn(),
            "list_org_numbers",
            &format!(
                "SELECT {NUMBER_COLUMNS} FROM org_numbers WHERE organisation_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![org_id],
            row_to_number,
        )
        .await?;

        let summaries = self
            .property_summaries(numbers.iter().filter_map(|n| n.property_id.as_deref()))
            .await?;

        Ok(numbers
            .into_iter()
            .map(|number| {
                let property = number
                    .property_id
                    .as_ref()
                    .and_then(|pid| summaries.get(pid).cloned())
                    .map(|mut s| {
                        s.address = None;
                        s
                    });
                OrgNumberWithProperty { number, property }
            })
            .collect())
    }

    async fn assign_org_number(
        &self,
        org_id: &str,
        id: &str,
        property_id: Option<&str>,
        exclusive: bool,
        activate: bool,
    ) -> Result<OrgNumberWithProperty, DatabaseError> {
        if self.get_org_number(org_id, id).await?.is_none() {
            return Err(not_found("Number", id));
        }

        {
            let _exclusive = self.gate.write().await;
            let tx = self.begin("assign_org_number").await?;
            let result = async {
                if let (true, Some(pid)) = (exclusive, property_id) {
                    execute(
                        Exec::Tx(&tx),
                        "assign_org_number exclusive",
                        "UPDATE org_numbers SET active = 0 WHERE organisation_id = ?1 AND property_id = ?2 AND id != ?3",
                        params![org_id, pid, id],
                    )
                    .await?;
                }
                let changed = execute(
                    Exec::Tx(&tx),
                    "assign_org_number",
                    "UPDATE org_numbers SET property_id = ?1, active = CASE WHEN ?2 = 1 THEN 1 ELSE active END
                     WHERE id = ?3 AND organisation_id = ?4",
                    params![opt_text(property_id), activate as i64, id, org_id],
                )
                .await?;
                if changed == 0 {
                    return Err(not_found("Number", id));
                }
                Ok::<_, DatabaseError>(())
            }
            .await;
            finish(tx, "assign_org_number", result).await?;
        }

        let number = number_by_id(self.conn(), id)
            .await?
            .ok_or_else(|| not_found("Number", id))?;
        let property = match number.property_id.as_deref() {
            Some(pid) => property_by_id(self.conn(), pid).await?.map(|p| PropertySummary {
                id: p.id,
                name: p.name,
                address: None,
            }),
            None => None,
        };
        Ok(OrgNumberWithProperty { number, property })
    }

    async fn activate_org_number(
        &self,
        org_id: &str,
        id: &str,
        exclusive: bool,
    ) -> Result<OrgNumber, DatabaseError> {
        let mut number = self
            .get_org_number(org_id, id)
            .await?
            .ok_or_else(|| not_found("Number", id))?;

        let _exclusive = self.gate.write().await;
        let tx = self.begin("activate_org_number").await?;
        let result = async {
            if exclusive {
                match number.property_id.as_deref() {
                    Some(pid) => {
                        execute(
                            Exec::Tx(&tx),
                            "activate_org_number exclusive",
                            "UPDATE org_numbers SET active = 0 WHERE organisation_id = ?1 AND property_id = ?2 AND id != ?3",
                            params![org_id, pid, id],
                        )
                        .await?;
                    }
                    None => {
                        execute(
                            Exec::Tx(&tx),
                            "activate_org_number exclusive",
                            "UPDATE org_numbers SET active = 0 WHERE organisation_id = ?1 AND id != ?2",
                            params![org_id, id],
                        )
                        .await?;
                    }
                }
            }
            execute(
                Exec::Tx(&tx),
                "activate_org_number",
                "UPDATE org_numbers SET active = 1 WHERE id = ?1",
                params![id],
            )
            .await?;
            Ok::<_, DatabaseError>(())
        }
        .await;
        finish(tx, "activate_org_number", result).await?;

        number.active = true;
        Ok(number)
    }

    async fn set_org_number_active(&self, id: &str, active: bool) -> Result<(), DatabaseError> {
        execute(
            self.conn(),
            "set_org_number_active",
            "UPDATE org_numbers SET active = ?1 WHERE id = ?2",
            params![active as i64, id],
        )
        .await?;
        Ok(())
    }

    async fn delete_org_number(&self, id: &str) -> Result<(), DatabaseError> {
        execute(
            self.conn(),
            "delete_org_number",
            "DELETE FROM org_numbers WHERE id = ?1",
            params![id],
        )
        .await?;
        Ok(())
    }

    async fn newest_active_number(
        &self,
        org_id: &str,
        property_id: Option<&str>,
    ) -> Result<Option<OrgNumber>, DatabaseError> {
        let scope = match property_id {
            Some(_) => "property_id = ?2",
            None => "property_id IS NULL AND ?2 IS NULL",
        };
        query_opt(
            self.conn(),
            "newest_active_number",
            &format!(
                "SELECT {NUMBER_COLUMNS} FROM org_numbers
                 WHERE organisation_id = ?1 AND {scope} AND active = 1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![org_id, opt_text(property_id)],
            row_to_number,
        )
        .await
    }

    // ── Tenants ─────────────────────────────────────────────────────

    async fn find_tenant_by_phones(
        &self,
        org_id: &str,
        phones: &[String],
    ) -> Result<Option<Tenant>, DatabaseError> {
        if phones.is_empty() {
            return Ok(None);
        }
        let placeholders: Vec<String> = (0..phones.len()).map(|i| format!("?{}", i + 2)).collect();
        let mut values = vec![text(org_id)];
        values.extend(phones.iter().map(|p| text(p)));

        query_opt(
            self.conn(),
            "find_tenant_by_phones",
            &format!(
                "SELECT {TENANT_COLUMNS} FROM tenants
                 WHERE organisation_id = ?1 AND phone_number IN ({})
                 ORDER BY created_at ASC, rowid ASC LIMIT 1",
                placeholders.join(", ")
            ),
            params_from_iter(values),
            row_to_tenant,
        )
        .await
    }

    async fn insert_tenant(&self, t: NewTenant) -> Result<Tenant, DatabaseError> {
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            organisation_id: t.organisation_id,
            property_id: t.property_id,
            phone_number: t.phone_number,
            name: t.name,
            unit_number: t.unit_number,
            created_at: now,
            updated_at: now,
        };
        execute(
            self.conn(),
            "insert_tenant",
            &format!("INSERT INTO tenants ({TENANT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"),
            params![
                tenant.id.as_str(),
                tenant.organisation_id.as_str(),
                tenant.property_id.as_str(),
                tenant.phone_number.as_str(),
                opt_text(tenant.name.as_deref()),
                opt_text(tenant.unit_number.as_deref()),
                fmt_datetime(now),
            ],
        )
        .await?;
        debug!(tenant_id = %tenant.id, "Tenant inserted");
        Ok(tenant)
    }

    async fn upsert_tenant(&self, t: NewTenant) -> Result<Tenant, DatabaseError> {
        let now = now();
        execute(
            self.conn(),
            "upsert_tenant",
            &format!(
                "INSERT INTO tenants ({TENANT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT (phone_number, property_id) DO UPDATE SET
                    name = COALESCE(excluded.name, tenants.name),
                    unit_number = COALESCE(excluded.unit_number, tenants.unit_number),
                    updated_at = excluded.updated_at"
            ),
            params![
                Uuid::new_v4().to_string(),
                t.organisation_id.as_str(),
                t.property_id.as_str(),
                t.phone_number.as_str(),
                opt_text(t.name.as_deref()),
                opt_text(t.unit_number.as_deref()),
                now,
            ],
        )
        .await?;

        query_opt(
            self.conn(),
            "upsert_tenant fetch",
            &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE phone_number = ?1 AND property_id = ?2"),
            params![t.phone_number.as_str(), t.property_id.as_str()],
            row_to_tenant,
        )
        .await?
        .ok_or_else(|| not_found("Tenant", &t.phone_number))
    }

    async fn find_tenant_in_property(
        &self,
        property_id: &str,
        phone: &str,
    ) -> Result<Option<Tenant>, DatabaseError> {
        query_opt(
            self.conn(),
            "find_tenant_in_property",
            &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE phone_number = ?1 AND property_id = ?2"),
            params![phone, property_id],
            row_to_tenant,
        )
        .await
    }

    async fn get_tenant(&self, org_id: &str, id: &str) -> Result<Option<Tenant>, DatabaseError> {
        query_opt(
            self.conn(),
            "get_tenant",
            &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1 AND organisation_id = ?2"),
            params![id, org_id],
            row_to_tenant,
        )
        .await
    }

    async fn get_tenant_detail(
        &self,
        org_id: &str,
        id: &str,
    ) -> Result<Option<TenantDetail>, DatabaseError> {
        let Some(tenant) = self.get_tenant(org_id, id).await? else {
            return Ok(None);
        };
        let property = property_by_id(self.conn(), &tenant.property_id)
            .await?
            .map(|p| PropertySummary::from(&p));
        let tickets = query_all(
            self.conn(),
            "get_tenant_detail tickets",
            &format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE tenant_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![id],
            row_to_ticket,
        )
        .await?;
        Ok(Some(TenantDetail {
            tenant,
            property,
            tickets,
        }))
    }

    async fn list_tenants(
        &self,
        org_id: &str,
        query: TenantQuery,
    ) -> Result<Page<TenantWithProperty>, DatabaseError> {
        let mut clauses = vec!["t.organisation_id = ?1".to_string()];
        let mut values = vec![text(org_id)];

        if let Some(pid) = query.property_id.as_deref() {
            values.push(text(pid));
            clauses.push(format!("t.property_id = ?{}", values.len()));
        }

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            values.push(text(&like_pattern(q)));
            let p = values.len();
            let mut ors = vec![
                format!("t.name LIKE ?{p} ESCAPE '\\'"),
                format!("t.unit_number LIKE ?{p} ESCAPE '\\'"),
                format!("t.phone_number LIKE ?{p} ESCAPE '\\'"),
                format!("pr.name LIKE ?{p} ESCAPE '\\'"),
                format!("pr.address LIKE ?{p} ESCAPE '\\'"),
            ];
            let digits: String = q.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.len() >= 4 {
                values.push(text(&like_pattern(&digits)));
                ors.push(format!("t.phone_number LIKE ?{} ESCAPE '\\'", values.len()));
            }
            clauses.push(format!("({})", ors.join(" OR ")));
        }

        let where_sql = clauses.join(" AND ");
        let from_sql = "FROM tenants t LEFT JOIN properties pr ON pr.id = t.property_id";

        let total = query_count(
            self.conn(),
            "list_tenants count",
            &format!("SELECT COUNT(*) {from_sql} WHERE {where_sql}"),
            params_from_iter(values.clone()),
        )
        .await?;

        let mut page_values = values;
        page_values.push(libsql::Value::Integer(query.page_size as i64));
        let limit_idx = page_values.len();
        page_values.push(libsql::Value::Integer(offset(query.page, query.page_size)));
        let offset_idx = page_values.len();

        let columns = TENANT_COLUMNS
            .split(", ")
            .map(|c| format!("t.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let tenants = query_all(
            self.conn(),
            "list_tenants",
            &format!(
                "SELECT {columns} {from_sql} WHERE {where_sql}
                 ORDER BY t.created_at DESC, t.rowid DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
            ),
            params_from_iter(page_values),
            row_to_tenant,
        )
        .await?;

        let summaries = self
            .property_summaries(tenants.iter().map(|t| t.property_id.as_str()))
            .await?;

        let items = tenants
            .into_iter()
            .map(|tenant| {
                let property = summaries.get(&tenant.property_id).cloned().map(|mut s| {
                    s.address = None;
                    s
                });
                TenantWithProperty { tenant, property }
            })
            .collect();

        Ok(Page {
            total,
            items,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn update_tenant(&self, id: &str, patch: TenantPatch) -> Result<Tenant, DatabaseError> {
        let mut tenant = tenant_by_id(self.conn(), id)
            .await?
            .ok_or_else(|| not_found("Tenant", id))?;

        if let Some(name) = patch.name {
            tenant.name = Some(name);
        }
        if let Some(unit) = patch.unit_number {
            tenant.unit_number = Some(unit);
        }
        if let Some(phone) = patch.phone_number {
            tenant.phone_number = phone;
        }
        tenant.updated_at = Utc::now();

        execute(
            self.conn(),
            "update_tenant",
            "UPDATE tenants SET name = ?1, unit_number = ?2, phone_number = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                opt_text(tenant.name.as_deref()),
                opt_text(tenant.unit_number.as_deref()),
                tenant.phone_number.as_str(),
                fmt_datetime(tenant.updated_at),
                id,
            ],
        )
        .await?;
        Ok(tenant)
    }

    async fn delete_tenant(&self, id: &str) -> Result<(), DatabaseError> {
        execute(
            self.conn(),
            "delete_tenant",
            "DELETE FROM tenants WHERE id = ?1",
            params![id],
        )
        .await?;
        Ok(())
    }

    async fn count_tickets_for_tenant(&self, tenant_id: &str) -> Result<u64, DatabaseError> {
        query_count(
            self.conn(),
            "count_tickets_for_tenant",
            "SELECT COUNT(*) FROM tickets WHERE tenant_id = ?1",
            params![tenant_id],
        )
        .await
    }

    async fn reassign_tenant(
        &self,
        org_id: &str,
        tenant: &Tenant,
        property_id: &str,
        move_open_tickets: bool,
    ) -> Result<u64, DatabaseError> {
        let now = Utc::now();
        let _exclusive = self.gate.write().await;
        let tx = self.begin("reassign_tenant").await?;

        let result = async {
            let moved = if move_open_tickets {
                execute(
                    Exec::Tx(&tx),
                    "reassign_tenant tickets",
                    "UPDATE tickets SET property_id = ?1, updated_at = ?2
                     WHERE tenant_id = ?3 AND organisation_id = ?4 AND property_id = ?5
                       AND status IN (?6, ?7)",
                    params![
                        property_id,
                        fmt_datetime(now),
                        tenant.id.as_str(),
                        org_id,
                        tenant.property_id.as_str(),
                        TicketStatus::Open.as_str(),
                        TicketStatus::InProgress.as_str(),
                    ],
                )
                .await?
            } else {
                0
            };

            execute(
                Exec::Tx(&tx),
                "reassign_tenant tenant",
                "UPDATE tenants SET property_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![property_id, fmt_datetime(now), tenant.id.as_str()],
            )
            .await?;

            upsert_conversation_on(
                Exec::Tx(&tx),
                &ConversationUpsert {
                    organisation_id: org_id.to_string(),
                    phone_number: tenant.phone_number.clone(),
                    property_id: Some(property_id.to_string()),
                    tenant_id: Some(tenant.id.clone()),
                    state: ConversationState::Idle,
                    last_message_at: now,
                },
            )
            .await?;
            Ok::<_, DatabaseError>(moved)
        }
        .await;
        finish(tx, "reassign_tenant", result).await
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn upsert_conversation(
        &self,
        conversation: ConversationUpsert,
    ) -> Result<(), DatabaseError> {
        upsert_conversation_on(self.conn(), &conversation).await
    }

    async fn get_conversation(
        &self,
        org_id: &str,
        phone: &str,
    ) -> Result<Option<Conversation>, DatabaseError> {
        query_opt(
            self.conn(),
            "get_conversation",
            &format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE organisation_id = ?1 AND phone_number = ?2"
            ),
            params![org_id, phone],
            row_to_conversation,
        )
        .await
    }

    // ── Tickets ─────────────────────────────────────────────────────

    async fn find_ticket_by_message_sid(
        &self,
        sid: &str,
    ) -> Result<Option<String>, DatabaseError> {
        query_opt(
            self.conn(),
            "find_ticket_by_message_sid",
            "SELECT id FROM tickets WHERE external_message_sid = ?1",
            params![sid],
            |row| row.get::<String>(0),
        )
        .await
    }

    async fn insert_ticket(&self, t: NewTicket) -> Result<Ticket, DatabaseError> {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            organisation_id: t.organisation_id,
            property_id: t.property_id,
            tenant_id: t.tenant_id,
            description: t.description,
            category: t.category,
            priority: t.priority,
            status: TicketStatus::Open,
            image_urls: t.image_urls,
            external_message_sid: t.external_message_sid,
            created_at: now,
            updated_at: now,
        };
        let image_urls = serde_json::to_string(&ticket.image_urls)
            .map_err(|e| DatabaseError::Query(format!("insert_ticket image_urls: {e}")))?;

        execute(
            self.conn(),
            "insert_ticket",
            &format!("INSERT INTO tickets ({TICKET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)"),
            params![
                ticket.id.as_str(),
                ticket.organisation_id.as_str(),
                ticket.property_id.as_str(),
                ticket.tenant_id.as_str(),
                ticket.description.as_str(),
                ticket.category.as_str(),
                ticket.priority.as_str(),
                ticket.status.as_str(),
                image_urls,
                opt_text(ticket.external_message_sid.as_deref()),
                fmt_datetime(now),
            ],
        )
        .await?;
        debug!(ticket_id = %ticket.id, category = %ticket.category, priority = %ticket.priority, "Ticket inserted");
        Ok(ticket)
    }

    async fn get_ticket(
        &self,
        org_id: &str,
        id: &str,
    ) -> Result<Option<TicketWithRelations>, DatabaseError> {
        let ticket = query_opt(
            self.conn(),
            "get_ticket",
            &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1 AND organisation_id = ?2"),
            params![id, org_id],
            row_to_ticket,
        )
        .await?;
        let Some(ticket) = ticket else {
            return Ok(None);
        };
        let tenant = tenant_by_id(self.conn(), &ticket.tenant_id).await?;
        let property = property_by_id(self.conn(), &ticket.property_id).await?;
        Ok(Some(TicketWithRelations {
            ticket,
            tenant,
            property,
        }))
    }

    async fn list_tickets(
        &self,
        org_id: &str,
        filter: TicketFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<TicketWithRelations>, DatabaseError> {
        let mut clauses = vec!["organisation_id = ?1".to_string()];
        let mut values = vec![text(org_id)];

        let optional = [
            ("status", filter.status.map(|s| s.as_str().to_string())),
            ("priority", filter.priority.map(|p| p.as_str().to_string())),
            ("category", filter.category.map(|c| c.as_str().to_string())),
            ("property_id", filter.property_id),
        ];
        for (column, value) in optional {
            if let Some(v) = value {
                values.push(libsql::Value::Text(v));
                clauses.push(format!("{column} = ?{}", values.len()));
            }
        }
        let where_sql = clauses.join(" AND ");

        let total = query_count(
            self.conn(),
            "list_tickets count",
            &format!("SELECT COUNT(*) FROM tickets WHERE {where_sql}"),
            params_from_iter(values.clone()),
        )
        .await?;

        let mut page_values = values;
        page_values.push(libsql::Value::Integer(page_size as i64));
        let limit_idx = page_values.len();
        page_values.push(libsql::Value::Integer(offset(page, page_size)));
        let offset_idx = page_values.len();

        let tickets = query_all(
            self.conn(),
            "list_tickets",
            &format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE {where_sql}
                 ORDER BY created_at DESC, rowid DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
            ),
            params_from_iter(page_values),
            row_to_ticket,
        )
        .await?;

        let mut tenants: HashMap<String, Option<Tenant>> = HashMap::new();
        let mut properties: HashMap<String, Option<Property>> = HashMap::new();
        let mut items = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            if !tenants.contains_key(&ticket.tenant_id) {
                let t = tenant_by_id(self.conn(), &ticket.tenant_id).await?;
                tenants.insert(ticket.tenant_id.clone(), t);
            }
            if !properties.contains_key(&ticket.property_id) {
                let p = property_by_id(self.conn(), &ticket.property_id).await?;
                properties.insert(ticket.property_id.clone(), p);
            }
            let tenant = tenants.get(&ticket.tenant_id).cloned().flatten();
            let property = properties.get(&ticket.property_id).cloned().flatten();
            items.push(TicketWithRelations {
                ticket,
                tenant,
                property,
            });
        }

        Ok(Page {
            total,
            items,
            page,
            page_size,
        })
    }

    async fn update_ticket(&self, id: &str, patch: TicketPatch) -> Result<Ticket, DatabaseError> {
        let mut ticket = ticket_by_id(self.conn(), id)
            .await?
            .ok_or_else(|| not_found("Ticket", id))?;

        if let Some(status) = patch.status {
            ticket.status = status;
        }
        if let Some(priority) = patch.priority {
            ticket.priority = priority;
        }
        if let Some(description) = patch.description {
            ticket.description = description;
        }
        ticket.updated_at = Utc::now();

        execute(
            self.conn(),
            "update_ticket",
            "UPDATE tickets SET status = ?1, priority = ?2, description = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.description.as_str(),
                fmt_datetime(ticket.updated_at),
                id,
            ],
        )
        .await?;
        Ok(ticket)
    }

    async fn delete_ticket(&self, id: &str) -> Result<(), DatabaseError> {
        execute(
            self.conn(),
            "delete_ticket",
            "DELETE FROM tickets WHERE id = ?1",
            params![id],
        )
        .await?;
        Ok(())
    }
}
