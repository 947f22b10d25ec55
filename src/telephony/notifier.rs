//! Outbound tenant notifications: sender selection and message templates.

use std::sync::Arc;

use tracing::{error, warn};

use crate::config::TwilioConfig;
use crate::error::TelephonyError;
use crate::model::{TicketPriority, TicketStatus, short_ref};
use crate::store::Database;
use crate::telephony::client::{SmsRequest, TelephonyClient};

/// Where an outbound message should appear to come from.
#[derive(Debug, Clone, Default)]
pub struct SendContext {
    /// Explicit sender, e.g. the number the tenant texted.
    pub from: Option<String>,
    pub org_id: Option<String>,
    pub property_id: Option<String>,
}

impl SendContext {
    pub fn from_number(from: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            ..Default::default()
        }
    }

    pub fn scoped(org_id: impl Into<String>, property_id: Option<String>) -> Self {
        Self {
            from: None,
            org_id: Some(org_id.into()),
            property_id,
        }
    }
}

/// Sends SMS to tenants, picking the sender number per organisation.
pub struct Notifier {
    db: Arc<dyn Database>,
    telephony: Arc<dyn TelephonyClient>,
    messaging_service_sid: Option<String>,
    default_from: Option<String>,
}

impl Notifier {
    pub fn new(
        db: Arc<dyn Database>,
        telephony: Arc<dyn TelephonyClient>,
        config: Option<&TwilioConfig>,
    ) -> Self {
        Self {
            db,
            telephony,
            messaging_service_sid: config.and_then(|c| c.messaging_service_sid.clone()),
            default_from: config.and_then(|c| c.default_from.clone()),
        }
    }

    /// Resolve the sender fields for a message.
    ///
    /// Order: messaging service, explicit `from`, newest active number on
    /// the property, newest active org-wide number, configured default.
    pub async fn resolve_sender(&self, ctx: &SendContext) -> (Option<String>, Option<String>) {
        if let Some(sid) = &self.messaging_service_sid {
            return (None, Some(sid.clone()));
        }
        if let Some(from) = &ctx.from {
            return (Some(from.clone()), None);
        }

        if let Some(org_id) = ctx.org_id.as_deref() {
            let mut scopes = Vec::with_capacity(2);
            if let Some(pid) = ctx.property_id.as_deref() {
                scopes.push(Some(pid));
            }
            scopes.push(None);

            for scope in scopes {
                match self.db.newest_active_number(org_id, scope).await {
                    Ok(Some(number)) => return (Some(number.e164), None),
                    Ok(None) => {}
                    Err(e) => warn!(org_id, "Sender lookup failed: {e}"),
                }
            }
        }

        (self.default_from.clone(), None)
    }

    /// Send one SMS. Returns the vendor message SID.
    pub async fn send(
        &self,
        to: &str,
        body: &str,
        ctx: &SendContext,
    ) -> Result<String, TelephonyError> {
        let (from, messaging_service_sid) = self.resolve_sender(ctx).await;
        self.telephony
            .send_sms(&SmsRequest {
                to: to.to_string(),
                from,
                messaging_service_sid,
                body: body.to_string(),
                media_urls: Vec::new(),
            })
            .await
    }

    /// Send in the background; failures are logged, never surfaced.
    pub fn send_detached(
        self: &Arc<Self>,
        to: String,
        body: String,
        ctx: SendContext,
        what: &'static str,
    ) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&to, &body, &ctx).await {
                error!(kind = what, "SMS failed: {e}");
            }
        });
    }
}

// ── Templates ───────────────────────────────────────────────────────

pub const ADDRESS_PROMPT: &str = "Thanks! To route this correctly, reply with your **address & unit** (e.g., “123 Main St #5B”).\nYou don’t need to resend photos.";

pub fn confirmation_message(ticket_id: &str, priority: TicketPriority) -> String {
    let line = match priority {
        TicketPriority::Emergency => "🚨 EMERGENCY – we’ll contact you ASAP",
        TicketPriority::High => "⚠️ High priority – response within 4 h",
        TicketPriority::Medium => "📋 Response within 24 h",
        TicketPriority::Low => "📝 Response in 2–3 business days",
    };
    format!(
        "✅ Maintenance request received! Ticket #{}\n{line}",
        short_ref(ticket_id)
    )
}

pub fn status_update_message(ticket_id: &str, status: TicketStatus, note: Option<&str>) -> String {
    let mut body = format!("🔧 Ticket #{} update: {status}", short_ref(ticket_id));
    if let Some(note) = note.filter(|n| !n.is_empty()) {
        body.push('\n');
        body.push_str(note);
    }
    body
}

pub fn completion_message(ticket_id: &str, note: Option<&str>) -> String {
    let mut body = format!("✅ Ticket #{} has been completed!", short_ref(ticket_id));
    if let Some(note) = note.filter(|n| !n.is_empty()) {
        body.push_str("\n\nNotes: ");
        body.push_str(note);
    }
    body.push_str(
        "\n\nReply \"OK\" if everything looks good, or send photos if there are still issues.",
    );
    body
}

pub fn assignment_message(property_name: &str) -> String {
    format!("Thanks! We’ve assigned your request to {property_name}.")
}
