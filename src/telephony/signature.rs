//! Vendor webhook signature validation.
//!
//! The vendor signs each callback with HMAC-SHA1 keyed by the account auth
//! token. Form-encoded callbacks sign the URL followed by every parameter
//! (sorted by key); JSON callbacks sign the URL alone and carry a
//! `bodySHA256` query parameter covering the raw body.

use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::config::WEBHOOK_PATH;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";
pub const TIMESTAMP_HEADER: &str = "x-twilio-request-timestamp";

/// Base64 HMAC-SHA1 over `url` and the sorted parameters.
pub fn compute_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut data = String::from(url);
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match HmacSha1::new_from_slice(auth_token.as_bytes()) {
        Ok(mac) => mac,
        Err(e) => {
            error!("Failed to create HMAC: {}", e);
            return String::new();
        }
    };
    mac.update(data.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Validate a form-encoded callback signature in constant time.
pub fn validate_request(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(String, String)],
) -> bool {
    let Ok(provided) = BASE64.decode(signature.trim()) else {
        return false;
    };

    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    mac.verify_slice(&provided).is_ok()
}

/// Validate a callback whose URL carries `bodySHA256`.
///
/// Returns `false` when the URL has no such parameter.
pub fn validate_request_with_body(
    auth_token: &str,
    signature: &str,
    url: &str,
    raw_body: &[u8],
) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let Some(expected_hash) = parsed
        .query_pairs()
        .find(|(k, _)| k == "bodySHA256")
        .map(|(_, v)| v.into_owned())
    else {
        return false;
    };

    if !validate_request(auth_token, signature, url, &[]) {
        return false;
    }
    hex::encode(Sha256::digest(raw_body)).eq_ignore_ascii_case(&expected_hash)
}

/// A request is stale when the vendor timestamp header is numeric and more
/// than `max_skew_secs` away from `now_secs`. A missing or unparseable header
/// is not stale.
pub fn is_stale(headers: &HeaderMap, now_secs: i64, max_skew_secs: i64) -> bool {
    headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|ts| ts.is_finite())
        .is_some_and(|ts| (now_secs - ts.floor() as i64).abs() > max_skew_secs)
}

/// The URL the vendor signed.
///
/// A configured public base URL wins; otherwise rebuild it from the
/// forwarding headers and the request path.
pub fn expected_webhook_url(public_url: Option<&str>, headers: &HeaderMap, path: &str) -> String {
    if let Some(base) = public_url.filter(|b| !b.is_empty()) {
        if let Ok(joined) = url::Url::parse(base).and_then(|b| b.join(WEBHOOK_PATH)) {
            return joined.to_string();
        }
        return format!("{}{WEBHOOK_PATH}", base.trim_end_matches('/'));
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let proto = header("x-forwarded-proto").unwrap_or("https");
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .unwrap_or("localhost");
    format!("{proto}://{host}{path}")
}
