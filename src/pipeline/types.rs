//! Shared types for the inbound SMS pipeline.

use serde::{Deserialize, Serialize};

use crate::model::{TicketCategory, TicketPriority};
use crate::telephony::MediaItem;

const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

// ── Inbound message ─────────────────────────────────────────────────

/// An inbound SMS/MMS as delivered by the vendor webhook.
///
/// Built from the form parameters after the signature has been checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundSms {
    /// Sender as the vendor sent it (`From`).
    pub from: Option<String>,
    /// Number the tenant texted (`To`).
    pub to: Option<String>,
    pub body: String,
    /// `MessageSid`, falling back to `SmsMessageSid`.
    pub message_sid: Option<String>,
    pub media: Vec<MediaItem>,
}

impl InboundSms {
    pub fn from_params(params: &[(String, String)]) -> Self {
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .filter(|v| !v.is_empty())
        };

        let media_count: usize = get("NumMedia")
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0);
        let media = (0..media_count)
            .filter_map(|i| {
                let url = get(&format!("MediaUrl{i}"))?;
                let content_type = get(&format!("MediaContentType{i}")).unwrap_or(DEFAULT_MEDIA_TYPE);
                Some(MediaItem {
                    source_url: url.to_string(),
                    content_type: content_type.to_string(),
                })
            })
            .collect();

        Self {
            from: get("From").map(String::from),
            to: get("To").map(String::from),
            body: get("Body").unwrap_or_default().to_string(),
            message_sid: get("MessageSid").or_else(|| get("SmsMessageSid")).map(String::from),
            media,
        }
    }
}

// ── Triage result ───────────────────────────────────────────────────

/// Category and priority decided for a maintenance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceAnalysis {
    pub category: TicketCategory,
    pub priority: TicketPriority,
    /// 0.0 to 1.0.
    pub confidence: f32,
    /// Short explanation, or the original description.
    pub summary: String,
}

// ── Outcome ─────────────────────────────────────────────────────────

/// What the pipeline did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created { ticket_id: String },
    /// The message was already turned into a ticket.
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_core_fields() {
        let sms = InboundSms::from_params(&params(&[
            ("From", "+15551234567"),
            ("To", "+15557654321"),
            ("Body", "Sink leaking"),
            ("MessageSid", "SM1"),
        ]));
        assert_eq!(sms.from.as_deref(), Some("+15551234567"));
        assert_eq!(sms.to.as_deref(), Some("+15557654321"));
        assert_eq!(sms.body, "Sink leaking");
        assert_eq!(sms.message_sid.as_deref(), Some("SM1"));
        assert!(sms.media.is_empty());
    }

    #[test]
    fn falls_back_to_sms_message_sid() {
        let sms = InboundSms::from_params(&params(&[("MessageSid", ""), ("SmsMessageSid", "SM2")]));
        assert_eq!(sms.message_sid.as_deref(), Some("SM2"));
        assert!(sms.from.is_none());
        assert_eq!(sms.body, "");
    }

    #[test]
    fn collects_media_with_default_type() {
        let sms = InboundSms::from_params(&params(&[
            ("NumMedia", "3"),
            ("MediaUrl0", "https://m/0"),
            ("MediaContentType0", "image/png"),
            ("MediaUrl2", "https://m/2"),
        ]));
        assert_eq!(
            sms.media,
            vec![
                MediaItem {
                    source_url: "https://m/0".into(),
                    content_type: "image/png".into()
                },
                MediaItem {
                    source_url: "https://m/2".into(),
                    content_type: "image/jpeg".into()
                },
            ]
        );
    }

    #[test]
    fn bad_media_count_means_none() {
        let sms = InboundSms::from_params(&params(&[("NumMedia", "lots"), ("MediaUrl0", "https://m/0")]));
        assert!(sms.media.is_empty());
    }
}
