//! Inbound media persistence.
//!
//! Tickets store URLs, never bytes. The default store hands back a path on
//! our own media proxy so staff fetch vendor media through an authenticated
//! route instead of the vendor URL.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TelephonyError;
use crate::telephony::client::TelephonyClient;

/// Path of the staff media proxy route.
pub const MEDIA_PROXY_PATH: &str = "/api/twilio/media";

/// One attachment on an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub source_url: String,
    pub content_type: String,
}

/// Turns vendor media into a URL that can be stored on a ticket.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn persist(&self, item: &MediaItem) -> Result<String, TelephonyError>;
}

/// Stores nothing; returns a proxy URL after checking the vendor URL.
pub struct ProxyMediaStore {
    telephony: Arc<dyn TelephonyClient>,
}

impl ProxyMediaStore {
    pub fn new(telephony: Arc<dyn TelephonyClient>) -> Self {
        Self { telephony }
    }
}

/// Proxy URL for a vendor media URL.
pub fn proxy_url(source_url: &str, content_type: &str) -> String {
    format!(
        "{MEDIA_PROXY_PATH}?u={}&ct={}",
        urlencoding::encode(source_url),
        urlencoding::encode(content_type)
    )
}

#[async_trait]
impl MediaStore for ProxyMediaStore {
    async fn persist(&self, item: &MediaItem) -> Result<String, TelephonyError> {
        self.telephony.validate_media_url(&item.source_url)?;
        Ok(proxy_url(&item.source_url, &item.content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_url_encodes_both_parts() {
        let url = proxy_url(
            "https://api.twilio.com/2010-04-01/Accounts/AC1/Messages/MM1/Media/ME1",
            "image/jpeg",
        );
        assert_eq!(
            url,
            "/api/twilio/media?u=https%3A%2F%2Fapi.twilio.com%2F2010-04-01%2FAccounts%2FAC1%2FMessages%2FMM1%2FMedia%2FME1&ct=image%2Fjpeg"
        );
    }
}
