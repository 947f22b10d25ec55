//! Domain model: organisations, properties, tenants, numbers, conversations, tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declares a string-backed enum with `as_str`, `Display` and `FromStr` that
/// round-trip the same SCREAMING_SNAKE_CASE names serde uses on the wire.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($name))),
                }
            }
        }
    };
}

string_enum!(
    /// Maintenance category. Declaration order is the keyword tie-break order.
    TicketCategory {
        Plumbing => "PLUMBING",
        Electrical => "ELECTRICAL",
        Hvac => "HVAC",
        Appliance => "APPLIANCE",
        PestControl => "PEST_CONTROL",
        Security => "SECURITY",
        Cosmetic => "COSMETIC",
        Other => "OTHER",
        Unknown => "UNKNOWN",
    }
);

string_enum!(
    TicketPriority {
        Emergency => "EMERGENCY",
        High => "HIGH",
        Medium => "MEDIUM",
        Low => "LOW",
    }
);

string_enum!(
    TicketStatus {
        Open => "OPEN",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
);

string_enum!(
    /// Where a phone-number conversation stands.
    ConversationState {
        Idle => "IDLE",
        AskProperty => "ASK_PROPERTY",
    }
);

string_enum!(
    /// Membership role within an organisation.
    Role {
        Owner => "OWNER",
        Manager => "MANAGER",
        Staff => "STAFF",
        Tenant => "TENANT",
    }
);

impl TicketStatus {
    /// Statuses that still need work (and move with a tenant on reassignment).
    pub fn is_active(&self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::InProgress)
    }
}

impl Default for TicketCategory {
    fn default() -> Self {
        TicketCategory::Other
    }
}

impl Default for TicketPriority {
    fn default() -> Self {
        TicketPriority::Medium
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        TicketStatus::Open
    }
}

/// Name of the per-organisation catch-all property for unrouted tenants.
pub const UNASSIGNED_INBOX_NAME: &str = "__UNASSIGNED_INBOX__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organisation {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// An organisation as seen by one of its members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub role: Role,
    #[serde(flatten)]
    pub organisation: Organisation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub organisation_id: String,
    pub name: String,
    pub address: String,
    pub phone_number: String,
    pub manager_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn is_unassigned_inbox(&self) -> bool {
        self.name == UNASSIGNED_INBOX_NAME
    }
}

/// Minimal property projection embedded in other responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl From<&Property> for PropertySummary {
    fn from(p: &Property) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            address: Some(p.address.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub organisation_id: String,
    pub property_id: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub unit_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgNumber {
    pub id: String,
    pub organisation_id: String,
    pub property_id: Option<String>,
    pub e164: String,
    pub twilio_sid: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub organisation_id: String,
    pub phone_number: String,
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    pub state: ConversationState,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub organisation_id: String,
    pub property_id: String,
    pub tenant_id: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub image_urls: Vec<String>,
    pub external_message_sid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Short reference shown to tenants over SMS.
    pub fn short_ref(&self) -> &str {
        short_ref(&self.id)
    }
}

/// Last six characters of an id.
pub fn short_ref(id: &str) -> &str {
    let start = id
        .char_indices()
        .rev()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &id[start..]
}

/// Ticket plus the tenant and property it references.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketWithRelations {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub tenant: Option<Tenant>,
    pub property: Option<Property>,
}

/// A ticket not yet persisted.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub organisation_id: String,
    pub property_id: String,
    pub tenant_id: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub image_urls: Vec<String>,
    pub external_message_sid: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_strings() {
        for c in TicketCategory::ALL {
            assert_eq!(c.as_str().parse::<TicketCategory>().unwrap(), *c);
        }
        assert_eq!("IN_PROGRESS".parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
        assert!("in_progress".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_value(TicketCategory::PestControl).unwrap();
        assert_eq!(json, "PEST_CONTROL");
        let p: TicketPriority = serde_json::from_value(serde_json::json!("EMERGENCY")).unwrap();
        assert_eq!(p, TicketPriority::Emergency);
    }

    #[test]
    fn short_ref_takes_last_six() {
        assert_eq!(short_ref("0123456789abcdef"), "abcdef");
        assert_eq!(short_ref("abc"), "abc");
    }

    #[test]
    fn active_statuses() {
        assert!(TicketStatus::Open.is_active());
        assert!(TicketStatus::InProgress.is_active());
        assert!(!TicketStatus::Completed.is_active());
        assert!(!TicketStatus::Cancelled.is_active());
    }
}
