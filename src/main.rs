use std::sync::Arc;

use rental_maintenance::api::{self, AppState, WebhookAuth};
use rental_maintenance::config::{AppConfig, WEBHOOK_PATH};
use rental_maintenance::llm::create_vision_model;
use rental_maintenance::pipeline::{InboundProcessor, TriageAnalyzer};
use rental_maintenance::ratelimit::{MemoryRateLimiter, RateLimiter};
use rental_maintenance::store::{Database, LibSqlBackend};
use rental_maintenance::telephony::{
    MediaStore, Notifier, ProxyMediaStore, TelephonyClient, TwilioClient, UnconfiguredClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("🔧 Rental Maintenance v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   HTTP: http://0.0.0.0:{}", config.port);
    eprintln!("   Webhook: {WEBHOOK_PATH}");

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.database_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.database_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.database_path.display());

    // ── Telephony ────────────────────────────────────────────────────────
    let telephony: Arc<dyn TelephonyClient> = match config.twilio.as_ref() {
        Some(twilio) => {
            eprintln!("   Twilio: enabled (account {})", twilio.account_sid);
            Arc::new(TwilioClient::new(twilio)?)
        }
        None => {
            eprintln!("   Twilio: not configured (webhooks refused, SMS disabled)");
            Arc::new(UnconfiguredClient)
        }
    };
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&db),
        Arc::clone(&telephony),
        config.twilio.as_ref(),
    ));

    // ── Triage ───────────────────────────────────────────────────────────
    let vision = config.vision.as_ref().map(create_vision_model);
    match &vision {
        Some(model) => eprintln!("   Vision: {}", model.model_name()),
        None => eprintln!("   Vision: disabled (keyword triage only)"),
    }
    let analyzer = TriageAnalyzer::new(vision, Arc::clone(&telephony));

    // ── Pipeline ─────────────────────────────────────────────────────────
    let limiter: Arc<dyn RateLimiter> = Arc::new(MemoryRateLimiter::new());
    let media: Arc<dyn MediaStore> = Arc::new(ProxyMediaStore::new(Arc::clone(&telephony)));
    let processor = Arc::new(InboundProcessor::new(
        Arc::clone(&db),
        Arc::clone(&limiter),
        media,
        analyzer,
        Arc::clone(&notifier),
        config.webhook_limit,
    ));

    let state = AppState {
        db,
        limiter,
        telephony,
        notifier,
        processor,
        webhook: WebhookAuth {
            auth_token: config.twilio.as_ref().map(|t| t.auth_token.clone()),
            public_url: config.public_url.clone(),
            max_timestamp_skew: config.max_timestamp_skew,
        },
    };

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "HTTP server started");
    axum::serve(listener, api::router(state)).await?;

    Ok(())
}
