//! Telephony vendor REST access: outbound SMS, inbound media and the
//! number lifecycle (purchase, attach, release).

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::TwilioConfig;
use crate::error::TelephonyError;

const API_BASE: &str = "https://api.twilio.com";

/// One outbound message. Exactly one of `from` / `messaging_service_sid`
/// should be set by the time it reaches a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsRequest {
    pub to: String,
    pub from: Option<String>,
    pub messaging_service_sid: Option<String>,
    pub body: String,
    pub media_urls: Vec<String>,
}

/// Media bytes fetched from the vendor.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Kind of number to purchase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NumberKind {
    #[default]
    Local,
    TollFree,
}

impl NumberKind {
    fn search_resource(self) -> &'static str {
        match self {
            NumberKind::Local => "AvailablePhoneNumbers/US/Local.json",
            NumberKind::TollFree => "AvailablePhoneNumbers/US/TollFree.json",
        }
    }
}

/// A number held by the vendor account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OwnedNumber {
    pub sid: String,
    pub phone_number: String,
}

/// Vendor operations the service depends on.
///
/// Number provisioning is optional: the default methods refuse with
/// `NotConfigured`.
#[async_trait]
pub trait TelephonyClient: Send + Sync {
    /// Send an SMS. Returns the vendor message SID.
    async fn send_sms(&self, request: &SmsRequest) -> Result<String, TelephonyError>;

    /// Download media attached to an inbound message.
    async fn fetch_media(&self, url: &str) -> Result<FetchedMedia, TelephonyError>;

    /// Release a purchased number back to the vendor.
    async fn release_number(&self, twilio_sid: &str) -> Result<(), TelephonyError>;

    /// Reject anything that is not a media URL of this account.
    fn validate_media_url(&self, url: &str) -> Result<(), TelephonyError>;

    /// Whether vendor credentials are present at all.
    fn is_configured(&self) -> bool {
        true
    }

    /// Buy the first available SMS and MMS capable US number of `kind` with
    /// its SMS webhook pointed at `sms_url`. `Ok(None)` when nothing matches.
    async fn provision_number(
        &self,
        _kind: NumberKind,
        _area_code: Option<u16>,
        _sms_url: &str,
    ) -> Result<Option<OwnedNumber>, TelephonyError> {
        Err(TelephonyError::NotConfigured("provision_number".into()))
    }

    /// Look up a number the account already owns.
    async fn find_owned_number(&self, _e164: &str) -> Result<Option<OwnedNumber>, TelephonyError> {
        Err(TelephonyError::NotConfigured("find_owned_number".into()))
    }

    /// Point an owned number's SMS webhook at `sms_url`.
    async fn configure_webhook(&self, _twilio_sid: &str, _sms_url: &str) -> Result<(), TelephonyError> {
        Err(TelephonyError::NotConfigured("configure_webhook".into()))
    }
}

/// Pattern for canonical media URLs of `account_sid`.
pub fn media_url_pattern(account_sid: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^https://api\.twilio\.com/2010-04-01/Accounts/{}/Messages/[^/]+/Media/[^/]+$",
        regex::escape(account_sid)
    ))
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct AvailableNumber {
    phone_number: String,
}

#[derive(Debug, Deserialize)]
struct AvailableNumbers {
    #[serde(default)]
    available_phone_numbers: Vec<AvailableNumber>,
}

#[derive(Debug, Deserialize)]
struct IncomingNumbers {
    #[serde(default)]
    incoming_phone_numbers: Vec<OwnedNumber>,
}

/// REST client authenticated with the account SID and auth token.
pub struct TwilioClient {
    account_sid: String,
    auth_token: SecretString,
    media_url: Regex,
    base_url: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: &TwilioConfig) -> Result<Self, TelephonyError> {
        let media_url = media_url_pattern(&config.account_sid)
            .map_err(|e| TelephonyError::NotConfigured(format!("account SID: {e}")))?;
        Ok(Self {
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            media_url,
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        })
    }

    fn account_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{resource}",
            self.base_url, self.account_sid
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
    }

    /// Send an authenticated request and decode a JSON resource.
    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, TelephonyError> {
        let resp = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| TelephonyError::RequestFailed {
                endpoint: endpoint.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!(status, endpoint, body = %body, "Vendor request rejected");
            return Err(TelephonyError::Status {
                endpoint: endpoint.into(),
                status,
            });
        }

        resp.json().await.map_err(|e| TelephonyError::RequestFailed {
            endpoint: endpoint.into(),
            reason: format!("decode: {e}"),
        })
    }
}

#[async_trait]
impl TelephonyClient for TwilioClient {
    async fn send_sms(&self, request: &SmsRequest) -> Result<String, TelephonyError> {
        let endpoint = "Messages.json";
        let mut form: Vec<(&str, &str)> =
            vec![("To", request.to.as_str()), ("Body", request.body.as_str())];
        match (&request.messaging_service_sid, &request.from) {
            (Some(sid), _) => form.push(("MessagingServiceSid", sid.as_str())),
            (None, Some(from)) => form.push(("From", from.as_str())),
            (None, None) => return Err(TelephonyError::NoSender),
        }
        for url in &request.media_urls {
            form.push(("MediaUrl", url.as_str()));
        }

        let message: MessageResource = self
            .call(endpoint, self.client.post(self.account_url(endpoint)).form(&form))
            .await?;
        debug!(sid = %message.sid, "SMS queued");
        Ok(message.sid)
    }

    async fn fetch_media(&self, url: &str) -> Result<FetchedMedia, TelephonyError> {
        self.validate_media_url(url)?;

        let resp = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| TelephonyError::RequestFailed {
                endpoint: "Media".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(TelephonyError::Status {
                endpoint: "Media".into(),
                status: resp.status().as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TelephonyError::RequestFailed {
                endpoint: "Media".into(),
                reason: e.to_string(),
            })?;

        Ok(FetchedMedia {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn release_number(&self, twilio_sid: &str) -> Result<(), TelephonyError> {
        let endpoint = format!("IncomingPhoneNumbers/{twilio_sid}.json");
        let resp = self
            .authed(self.client.delete(self.account_url(&endpoint)))
            .send()
            .await
            .map_err(|e| TelephonyError::RequestFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(TelephonyError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    fn validate_media_url(&self, url: &str) -> Result<(), TelephonyError> {
        if self.media_url.is_match(url) {
            Ok(())
        } else {
            Err(TelephonyError::InvalidMediaUrl(url.to_string()))
        }
    }

    async fn provision_number(
        &self,
        kind: NumberKind,
        area_code: Option<u16>,
        sms_url: &str,
    ) -> Result<Option<OwnedNumber>, TelephonyError> {
        let search = kind.search_resource();
        let mut query = vec![
            ("SmsEnabled", "true".to_string()),
            ("MmsEnabled", "true".to_string()),
            ("PageSize", "1".to_string()),
        ];
        if let (NumberKind::Local, Some(code)) = (kind, area_code) {
            query.push(("AreaCode", code.to_string()));
        }
        let found: AvailableNumbers = self
            .call(search, self.client.get(self.account_url(search)).query(&query))
            .await?;
        let Some(candidate) = found.available_phone_numbers.into_iter().next() else {
            debug!(?kind, ?area_code, "No numbers available");
            return Ok(None);
        };

        let endpoint = "IncomingPhoneNumbers.json";
        let form = [
            ("PhoneNumber", candidate.phone_number.as_str()),
            ("SmsUrl", sms_url),
        ];
        let created: OwnedNumber = self
            .call(endpoint, self.client.post(self.account_url(endpoint)).form(&form))
            .await?;
        info!(sid = %created.sid, e164 = %created.phone_number, "Number purchased");
        Ok(Some(created))
    }

    async fn find_owned_number(&self, e164: &str) -> Result<Option<OwnedNumber>, TelephonyError> {
        let endpoint = "IncomingPhoneNumbers.json";
        let owned: IncomingNumbers = self
            .call(
                endpoint,
                self.client
                    .get(self.account_url(endpoint))
                    .query(&[("PhoneNumber", e164), ("PageSize", "1")]),
            )
            .await?;
        Ok(owned.incoming_phone_numbers.into_iter().next())
    }

    async fn configure_webhook(&self, twilio_sid: &str, sms_url: &str) -> Result<(), TelephonyError> {
        let endpoint = format!("IncomingPhoneNumbers/{twilio_sid}.json");
        let _: OwnedNumber = self
            .call(
                &endpoint,
                self.client
                    .post(self.account_url(&endpoint))
                    .form(&[("SmsUrl", sms_url)]),
            )
            .await?;
        debug!(sid = twilio_sid, "Number webhook configured");
        Ok(())
    }
}

/// Stand-in when no vendor credentials are set. Every call fails with
/// `NotConfigured`, so inbound triage falls back to keywords and outbound
/// SMS is logged as failed.
pub struct UnconfiguredClient;

#[async_trait]
impl TelephonyClient for UnconfiguredClient {
    async fn send_sms(&self, _request: &SmsRequest) -> Result<String, TelephonyError> {
        Err(TelephonyError::NotConfigured("send_sms".into()))
    }

    async fn fetch_media(&self, _url: &str) -> Result<FetchedMedia, TelephonyError> {
        Err(TelephonyError::NotConfigured("fetch_media".into()))
    }

    async fn release_number(&self, _twilio_sid: &str) -> Result<(), TelephonyError> {
        Err(TelephonyError::NotConfigured("release_number".into()))
    }

    fn validate_media_url(&self, _url: &str) -> Result<(), TelephonyError> {
        Err(TelephonyError::NotConfigured("media".into()))
    }

    fn is_configured(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwilioClient {
        TwilioClient::new(&TwilioConfig {
            account_sid: "AC123".into(),
            auth_token: SecretString::from("token".to_string()),
            messaging_service_sid: None,
            default_from: None,
        })
        .unwrap()
    }

    #[test]
    fn accepts_own_account_media() {
        let c = client();
        assert!(
            c.validate_media_url(
                "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages/MM1/Media/ME1"
            )
            .is_ok()
        );
    }

    #[test]
    fn rejects_foreign_or_crafted_urls() {
        let c = client();
        for url in [
            "https://api.twilio.com/2010-04-01/Accounts/AC999/Messages/MM1/Media/ME1",
            "http://api.twilio.com/2010-04-01/Accounts/AC123/Messages/MM1/Media/ME1",
            "https://api.twilio.com.evil.io/2010-04-01/Accounts/AC123/Messages/MM1/Media/ME1",
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages/MM1/Media/ME1/extra",
            "http://169.254.169.254/latest/meta-data",
        ] {
            assert!(
                matches!(c.validate_media_url(url), Err(TelephonyError::InvalidMediaUrl(_))),
                "{url} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn fetch_rejects_before_network() {
        let c = client();
        let err = c.fetch_media("http://127.0.0.1:1/secret").await.unwrap_err();
        assert!(matches!(err, TelephonyError::InvalidMediaUrl(_)));
    }

    #[tokio::test]
    async fn send_without_sender_fails() {
        let c = client();
        let err = c
            .send_sms(&SmsRequest {
                to: "+15551234567".into(),
                body: "hi".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TelephonyError::NoSender));
    }

    #[tokio::test]
    async fn unconfigured_client_refuses_everything() {
        let c = UnconfiguredClient;
        assert!(matches!(
            c.validate_media_url("https://api.twilio.com/x"),
            Err(TelephonyError::NotConfigured(_))
        ));
        assert!(c.release_number("PN1").await.is_err());
        assert!(!c.is_configured());
        assert!(matches!(
            c.provision_number(NumberKind::Local, None, "https://x/api/webhooks/twilio").await,
            Err(TelephonyError::NotConfigured(_))
        ));
    }

    #[test]
    fn number_kind_uses_vendor_names() {
        let kind: NumberKind = serde_json::from_str(r#""TOLLFREE""#).unwrap();
        assert_eq!(kind, NumberKind::TollFree);
        assert_eq!(NumberKind::default(), NumberKind::Local);
        assert!(serde_json::from_str::<NumberKind>(r#""MOBILE""#).is_err());
    }

    #[test]
    fn decodes_number_listings() {
        let available: AvailableNumbers = serde_json::from_str(
            r#"{"available_phone_numbers":[{"phone_number":"+14155550100","locality":"SF"}],"uri":"/x"}"#,
        )
        .unwrap();
        assert_eq!(available.available_phone_numbers[0].phone_number, "+14155550100");

        let empty: IncomingNumbers = serde_json::from_str(r#"{"page":0}"#).unwrap();
        assert!(empty.incoming_phone_numbers.is_empty());

        let owned: IncomingNumbers = serde_json::from_str(
            r#"{"incoming_phone_numbers":[{"sid":"PN1","phone_number":"+14155550100","sms_url":""}]}"#,
        )
        .unwrap();
        assert_eq!(
            owned.incoming_phone_numbers[0],
            OwnedNumber {
                sid: "PN1".into(),
                phone_number: "+14155550100".into()
            }
        );
    }
}
