//! Inbound processor: turns a verified vendor webhook into a ticket.
//!
//! Flow:
//! 1. Idempotency and per-sender rate limit
//! 2. Routing by the texted number (property phone, then org number)
//! 3. Tenant resolution, creating the tenant in the unassigned inbox if needed
//! 4. Media persistence and triage
//! 5. Ticket creation and confirmation SMS

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::WebhookLimit;
use crate::error::PipelineError;
use crate::model::{ConversationState, NewTicket, Property, Tenant};
use crate::phone::{alt_forms_for_lookup, normalize_us_phone};
use crate::pipeline::classifier::TriageAnalyzer;
use crate::pipeline::types::{InboundSms, Outcome};
use crate::ratelimit::RateLimiter;
use crate::store::Database;
use crate::store::traits::{ConversationUpsert, NewTenant, TenantPatch};
use crate::telephony::notifier::{ADDRESS_PROMPT, confirmation_message};
use crate::telephony::{MediaStore, Notifier, SendContext};

/// Where an inbound message is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    org_id: String,
    property_id: Option<String>,
}

/// Processes inbound SMS into tickets.
pub struct InboundProcessor {
    db: Arc<dyn Database>,
    limiter: Arc<dyn RateLimiter>,
    media: Arc<dyn MediaStore>,
    analyzer: TriageAnalyzer,
    notifier: Arc<Notifier>,
    limit: WebhookLimit,
}

impl InboundProcessor {
    pub fn new(
        db: Arc<dyn Database>,
        limiter: Arc<dyn RateLimiter>,
        media: Arc<dyn MediaStore>,
        analyzer: TriageAnalyzer,
        notifier: Arc<Notifier>,
        limit: WebhookLimit,
    ) -> Self {
        Self {
            db,
            limiter,
            media,
            analyzer,
            notifier,
            limit,
        }
    }

    /// Process one inbound message.
    pub async fn process(&self, sms: InboundSms) -> Result<Outcome, PipelineError> {
        let started = Instant::now();

        let (Some(raw_from), Some(to)) = (sms.from.as_deref(), sms.to.as_deref()) else {
            return Err(PipelineError::MissingNumbers);
        };
        let from = normalize_us_phone(raw_from).unwrap_or_else(|| raw_from.to_string());

        if let Some(sid) = sms.message_sid.as_deref() {
            if self.db.find_ticket_by_message_sid(sid).await?.is_some() {
                debug!(sid, "Duplicate webhook delivery");
                return Ok(Outcome::Duplicate);
            }
        }

        let key = format!("twilio:{from}");
        let verdict = self
            .limiter
            .check(&key, self.limit.limit, self.limit.window)
            .await;
        if !verdict.success {
            warn!(from = %from, "Inbound SMS rate limited");
            return Err(PipelineError::RateLimited(key));
        }

        let route = self.route(to).await?;
        let (tenant, property, is_new_tenant) = self.resolve_tenant(&route, &from).await?;
        let in_inbox = property.is_unassigned_inbox();

        self.db
            .upsert_conversation(ConversationUpsert {
                organisation_id: route.org_id.clone(),
                phone_number: from.clone(),
                property_id: Some(tenant.property_id.clone()),
                tenant_id: Some(tenant.id.clone()),
                state: if in_inbox {
                    ConversationState::AskProperty
                } else {
                    ConversationState::Idle
                },
                last_message_at: Utc::now(),
            })
            .await?;

        if is_new_tenant && in_inbox {
            self.notifier.send_detached(
                from.clone(),
                ADDRESS_PROMPT.to_string(),
                SendContext::from_number(to),
                "address_prompt",
            );
        }

        let mut image_urls = Vec::with_capacity(sms.media.len());
        for item in &sms.media {
            match self.media.persist(item).await {
                Ok(url) => image_urls.push(url),
                Err(e) => warn!(url = %item.source_url, "Media persistence failed: {e}"),
            }
        }

        let analysis = self.analyzer.analyze(&sms.body, &sms.media).await;

        let created = self
            .db
            .insert_ticket(NewTicket {
                organisation_id: tenant.organisation_id.clone(),
                property_id: tenant.property_id.clone(),
                tenant_id: tenant.id.clone(),
                description: sms.body.clone(),
                category: analysis.category,
                priority: analysis.priority,
                image_urls,
                external_message_sid: sms.message_sid.clone(),
            })
            .await;
        let ticket = match created {
            Ok(ticket) => ticket,
            Err(e) if e.is_constraint() && sms.message_sid.is_some() => {
                debug!("Concurrent duplicate delivery lost the insert race");
                return Ok(Outcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        self.notifier.send_detached(
            from.clone(),
            confirmation_message(&ticket.id, ticket.priority),
            SendContext::from_number(to),
            "confirmation",
        );

        info!(
            ticket_id = %ticket.id,
            org_id = %route.org_id,
            property_id = %ticket.property_id,
            category = %ticket.category,
            priority = %ticket.priority,
            confidence = analysis.confidence,
            ms = started.elapsed().as_millis() as u64,
            "Inbound ticket created"
        );
        Ok(Outcome::Created {
            ticket_id: ticket.id,
        })
    }

    /// Legacy property phone first, then org numbers. Inactive numbers
    /// still route.
    async fn route(&self, to: &str) -> Result<Route, PipelineError> {
        if let Some(property) = self.db.find_property_by_phone(to).await? {
            return Ok(Route {
                org_id: property.organisation_id,
                property_id: Some(property.id),
            });
        }
        match self.db.find_org_number_by_e164(to).await? {
            Some(number) => Ok(Route {
                org_id: number.organisation_id,
                property_id: number.property_id,
            }),
            None => {
                warn!(to, "No property or org number match");
                Err(PipelineError::UnknownDestination(to.to_string()))
            }
        }
    }

    /// Find the sender's tenant row (any stored phone form) or create one.
    async fn resolve_tenant(
        &self,
        route: &Route,
        from: &str,
    ) -> Result<(Tenant, Property, bool), PipelineError> {
        let lookups = alt_forms_for_lookup(from);
        if let Some(mut tenant) = self.db.find_tenant_by_phones(&route.org_id, &lookups).await? {
            if tenant.phone_number != from {
                match self
                    .db
                    .update_tenant(
                        &tenant.id,
                        TenantPatch {
                            phone_number: Some(from.to_string()),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    Ok(updated) => tenant = updated,
                    Err(e) => warn!(tenant_id = %tenant.id, "Phone backfill failed: {e}"),
                }
            }
            let property = match self.db.get_property(&route.org_id, &tenant.property_id).await? {
                Some(p) => p,
                None => self.db.ensure_unassigned_property(&route.org_id).await?,
            };
            return Ok((tenant, property, false));
        }

        let property = match route.property_id.as_deref() {
            Some(pid) => match self.db.get_property(&route.org_id, pid).await? {
                Some(p) => p,
                None => self.db.ensure_unassigned_property(&route.org_id).await?,
            },
            None => self.db.ensure_unassigned_property(&route.org_id).await?,
        };

        let tenant = self
            .db
            .insert_tenant(NewTenant {
                organisation_id: route.org_id.clone(),
                property_id: property.id.clone(),
                phone_number: from.to_string(),
                name: None,
                unit_number: None,
            })
            .await?;
        info!(tenant_id = %tenant.id, org_id = %route.org_id, inbox = property.is_unassigned_inbox(), "Tenant created from inbound SMS");
        Ok((tenant, property, true))
    }
}
