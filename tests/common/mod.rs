//! Shared harness: the full router on a random port with stub vendors.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use rental_maintenance::api::{self, AppState, WebhookAuth};
use rental_maintenance::config::WebhookLimit;
use rental_maintenance::error::{LlmError, TelephonyError};
use rental_maintenance::llm::{VisionModel, VisionRequest};
use rental_maintenance::pipeline::{InboundProcessor, TriageAnalyzer};
use rental_maintenance::ratelimit::MemoryRateLimiter;
use rental_maintenance::store::{Database, LibSqlBackend};
use rental_maintenance::telephony::signature::compute_signature;
use rental_maintenance::telephony::{
    FetchedMedia, NumberKind, Notifier, OwnedNumber, ProxyMediaStore, SmsRequest, TelephonyClient,
};

pub const AUTH_TOKEN: &str = "test-auth-token";
pub const PUBLIC_URL: &str = "https://sms.example.com";
pub const WEBHOOK_URL: &str = "https://sms.example.com/api/webhooks/twilio";
pub const MEDIA_PREFIX: &str = "https://api.twilio.com/2010-04-01/Accounts/ACTEST/";
/// The only number the stub account already owns.
pub const OWNED_E164: &str = "+15557770000";
/// Area code for which the stub has no numbers for sale.
pub const SOLD_OUT_AREA_CODE: u16 = 999;

/// Records outbound SMS, releases and webhook configuration; media fetches
/// return a tiny JPEG.
#[derive(Default)]
pub struct StubTelephony {
    pub sent: Mutex<Vec<SmsRequest>>,
    pub released: Mutex<Vec<String>>,
    /// `(sid, sms_url)` for every purchase or webhook update.
    pub webhooks: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl TelephonyClient for StubTelephony {
    async fn send_sms(&self, request: &SmsRequest) -> Result<String, TelephonyError> {
        self.sent.lock().await.push(request.clone());
        Ok(format!("SM{}", self.sent.lock().await.len()))
    }

    async fn fetch_media(&self, url: &str) -> Result<FetchedMedia, TelephonyError> {
        self.validate_media_url(url)?;
        Ok(FetchedMedia {
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            content_type: "image/jpeg".into(),
        })
    }

    async fn release_number(&self, twilio_sid: &str) -> Result<(), TelephonyError> {
        if twilio_sid == "PNFAIL" {
            return Err(TelephonyError::Status {
                endpoint: "IncomingPhoneNumbers".into(),
                status: 404,
            });
        }
        self.released.lock().await.push(twilio_sid.to_string());
        Ok(())
    }

    fn validate_media_url(&self, url: &str) -> Result<(), TelephonyError> {
        if url.starts_with(MEDIA_PREFIX) {
            Ok(())
        } else {
            Err(TelephonyError::InvalidMediaUrl(url.into()))
        }
    }

    async fn provision_number(
        &self,
        kind: NumberKind,
        area_code: Option<u16>,
        sms_url: &str,
    ) -> Result<Option<OwnedNumber>, TelephonyError> {
        if area_code == Some(SOLD_OUT_AREA_CODE) {
            return Ok(None);
        }
        let mut webhooks = self.webhooks.lock().await;
        let prefix = match kind {
            NumberKind::Local => area_code.unwrap_or(555).to_string(),
            NumberKind::TollFree => "888".to_string(),
        };
        let number = OwnedNumber {
            sid: format!("PNBUY{}", webhooks.len()),
            phone_number: format!("+1{prefix}555{:04}", webhooks.len()),
        };
        webhooks.push((number.sid.clone(), sms_url.to_string()));
        Ok(Some(number))
    }

    async fn find_owned_number(&self, e164: &str) -> Result<Option<OwnedNumber>, TelephonyError> {
        Ok((e164 == OWNED_E164).then(|| OwnedNumber {
            sid: "PNOWNED".into(),
            phone_number: OWNED_E164.into(),
        }))
    }

    async fn configure_webhook(&self, twilio_sid: &str, sms_url: &str) -> Result<(), TelephonyError> {
        self.webhooks
            .lock()
            .await
            .push((twilio_sid.to_string(), sms_url.to_string()));
        Ok(())
    }
}

/// Always answers with a fixed HVAC/HIGH verdict.
pub struct StubVision;

#[async_trait]
impl VisionModel for StubVision {
    fn model_name(&self) -> &str {
        "stub-vision"
    }

    async fn generate(&self, _request: VisionRequest) -> Result<String, LlmError> {
        Ok(r#"{"category":"HVAC","priority":"HIGH","short_reason":"Frozen coil"}"#.into())
    }
}

pub struct TestApp {
    pub base: String,
    pub db: Arc<LibSqlBackend>,
    pub telephony: Arc<StubTelephony>,
    pub client: reqwest::Client,
    pub org_id: String,
}

/// Start the app on a random port with a fresh in-memory database.
pub async fn start_server(limit: WebhookLimit) -> TestApp {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let org = db.create_organisation("Acme Rentals", "acme").await.unwrap();
    let telephony = Arc::new(StubTelephony::default());
    let limiter = Arc::new(MemoryRateLimiter::new());
    let notifier = Arc::new(Notifier::new(db.clone(), telephony.clone(), None));
    let processor = Arc::new(InboundProcessor::new(
        db.clone(),
        limiter.clone(),
        Arc::new(ProxyMediaStore::new(telephony.clone())),
        TriageAnalyzer::new(Some(Arc::new(StubVision)), telephony.clone()),
        notifier.clone(),
        limit,
    ));

    let db_dyn: Arc<dyn Database> = db.clone();
    let state = AppState {
        db: db_dyn,
        limiter,
        telephony: telephony.clone(),
        notifier,
        processor,
        webhook: WebhookAuth {
            auth_token: Some(SecretString::from(AUTH_TOKEN.to_string())),
            public_url: Some(PUBLIC_URL.to_string()),
            max_timestamp_skew: Duration::from_secs(300),
        },
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestApp {
        base: format!("http://127.0.0.1:{port}"),
        db,
        telephony,
        client: reqwest::Client::new(),
        org_id: org.id,
    }
}

pub fn form(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// POST a correctly signed webhook.
    pub async fn post_webhook(&self, params: &[(String, String)]) -> reqwest::Response {
        let signature = compute_signature(AUTH_TOKEN, WEBHOOK_URL, params);
        self.client
            .post(self.url("/api/webhooks/twilio"))
            .header("x-twilio-signature", signature)
            .form(params)
            .send()
            .await
            .unwrap()
    }

    /// A request builder carrying staff identity headers for this org.
    pub fn staff(&self, method: reqwest::Method, path: &str, role: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("x-user-id", "user-1")
            .header("x-org-id", &self.org_id)
            .header("x-org-role", role)
    }

    /// Wait until at least `n` SMS were sent (they go out on detached tasks).
    pub async fn sent(&self, n: usize) -> Vec<SmsRequest> {
        for _ in 0..100 {
            if self.telephony.sent.lock().await.len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.telephony.sent.lock().await.clone()
    }
}
