//! Configuration types, read from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Webhook path the telephony vendor is configured to call.
pub const WEBHOOK_PATH: &str = "/api/webhooks/twilio";

/// Default vision model for image triage.
pub const DEFAULT_VISION_MODEL: &str = "gemini-1.5-flash";

/// Telephony vendor credentials and sender defaults.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// When set, outbound SMS go through the messaging service instead of a `From` number.
    pub messaging_service_sid: Option<String>,
    /// Fallback sender when no org/property number is active.
    pub default_from: Option<String>,
}

impl TwilioConfig {
    /// `None` when neither credential is set; an error when only one is.
    pub fn from_vars(var: &impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let account_sid = non_empty(var, "TWILIO_ACCOUNT_SID");
        let auth_token = non_empty(var, "TWILIO_AUTH_TOKEN");
        let (account_sid, auth_token) = match (account_sid, auth_token) {
            (None, None) => return Ok(None),
            (Some(sid), Some(token)) => (sid, token),
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("TWILIO_AUTH_TOKEN".into())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("TWILIO_ACCOUNT_SID".into())),
        };

        Ok(Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            messaging_service_sid: non_empty(var, "TWILIO_MESSAGING_SERVICE_SID"),
            default_from: non_empty(var, "TWILIO_FROM_E164")
                .or_else(|| non_empty(var, "TWILIO_PHONE_NUMBER")),
        }))
    }
}

/// Vision model configuration (optional; keyword triage works without it).
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: SecretString,
    pub model: String,
}

impl VisionConfig {
    pub fn from_vars(var: &impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = non_empty(var, "GEMINI_API_KEY")?;
        let model =
            non_empty(var, "GEMINI_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());
        Some(Self {
            api_key: SecretString::from(api_key),
            model,
        })
    }
}

/// Per-sender limit applied to inbound webhooks.
#[derive(Debug, Clone, Copy)]
pub struct WebhookLimit {
    pub limit: u32,
    pub window: Duration,
}

impl Default for WebhookLimit {
    fn default() -> Self {
        Self {
            limit: 20,
            window: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: PathBuf,
    /// Public origin used to rebuild the signed webhook URL (e.g. behind a tunnel).
    pub public_url: Option<String>,
    pub twilio: Option<TwilioConfig>,
    pub vision: Option<VisionConfig>,
    pub webhook_limit: WebhookLimit,
    /// Maximum allowed clock skew for signed webhook timestamps.
    pub max_timestamp_skew: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: PathBuf::from("./data/rental-maintenance.db"),
            public_url: None,
            twilio: None,
            vision: None,
            webhook_limit: WebhookLimit::default(),
            max_timestamp_skew: Duration::from_secs(300),
        }
    }
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take their
    /// defaults; malformed ones are an error.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parsed(&var, "PORT", defaults.port)?;
        let database_path = non_empty(&var, "DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);
        let public_url = non_empty(&var, "PUBLIC_URL")
            .or_else(|| non_empty(&var, "NGROK_URL"))
            .map(|u| u.trim_end_matches('/').to_string());
        if let Some(url) = public_url.as_deref() {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                key: "PUBLIC_URL".into(),
                message: e.to_string(),
            })?;
        }

        let limit: u32 = parsed(&var, "WEBHOOK_RATE_LIMIT", defaults.webhook_limit.limit)?;
        let window_secs: u64 = parsed(
            &var,
            "WEBHOOK_RATE_WINDOW_SECS",
            defaults.webhook_limit.window.as_secs(),
        )?;
        if limit == 0 || window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WEBHOOK_RATE_LIMIT".into(),
                message: "limit and window must be positive".into(),
            });
        }

        Ok(Self {
            port,
            database_path,
            public_url,
            twilio: TwilioConfig::from_vars(&var)?,
            vision: VisionConfig::from_vars(&var),
            webhook_limit: WebhookLimit {
                limit,
                window: Duration::from_secs(window_secs),
            },
            max_timestamp_skew: defaults.max_timestamp_skew,
        })
    }
}

fn non_empty(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(var, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_webhook_limit_is_twenty_per_five_minutes() {
        let limit = WebhookLimit::default();
        assert_eq!(limit.limit, 20);
        assert_eq!(limit.window, Duration::from_secs(300));
    }

    #[test]
    fn default_config_has_no_vendors() {
        let config = AppConfig::default();
        assert!(config.twilio.is_none());
        assert!(config.vision.is_none());
        assert_eq!(config.port, 8080);
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| owned.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn unset_variables_take_defaults() {
        let config = AppConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.webhook_limit.limit, 20);
        assert!(config.twilio.is_none());
    }

    #[test]
    fn reads_vendor_sections() {
        let config = AppConfig::from_vars(vars(&[
            ("PORT", "9000"),
            ("NGROK_URL", "https://abc.ngrok.io/"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_PHONE_NUMBER", "+15550001111"),
            ("GEMINI_API_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.public_url.as_deref(), Some("https://abc.ngrok.io"));
        let twilio = config.twilio.unwrap();
        assert_eq!(twilio.default_from.as_deref(), Some("+15550001111"));
        assert_eq!(config.vision.unwrap().model, DEFAULT_VISION_MODEL);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        for pairs in [
            &[("PORT", "eighty")][..],
            &[("WEBHOOK_RATE_LIMIT", "-3")][..],
            &[("WEBHOOK_RATE_WINDOW_SECS", "0")][..],
        ] {
            let err = AppConfig::from_vars(vars(pairs)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{pairs:?}");
        }
    }

    #[test]
    fn half_configured_twilio_is_an_error() {
        let err = AppConfig::from_vars(vars(&[("TWILIO_ACCOUNT_SID", "AC1")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "TWILIO_AUTH_TOKEN"));
    }
}
