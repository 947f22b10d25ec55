//! Triage cascade: keyword pass, then vision on attached photos.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{ImagePart, VisionModel, VisionRequest};
use crate::model::{TicketCategory, TicketPriority};
use crate::pipeline::rules::keyword_analysis;
use crate::pipeline::types::MaintenanceAnalysis;
use crate::telephony::{MediaItem, TelephonyClient};

/// Most images sent to the vision model per message.
pub const MAX_VISION_IMAGES: usize = 4;

const VISION_BASE_CONFIDENCE: f32 = 0.85;
const VISION_AGREEMENT_BONUS: f32 = 0.05;
const VISION_MAX_CONFIDENCE: f32 = 0.95;
const VISION_MAX_TOKENS: u32 = 128;

/// Decides category and priority for an inbound request.
pub struct TriageAnalyzer {
    vision: Option<Arc<dyn VisionModel>>,
    telephony: Arc<dyn TelephonyClient>,
}

impl TriageAnalyzer {
    pub fn new(vision: Option<Arc<dyn VisionModel>>, telephony: Arc<dyn TelephonyClient>) -> Self {
        Self { vision, telephony }
    }

    /// Classify a request. Never fails: any vision problem falls back to the
    /// keyword result.
    pub async fn analyze(&self, description: &str, media: &[MediaItem]) -> MaintenanceAnalysis {
        let keywords = keyword_analysis(description);

        let Some(vision) = self.vision.as_ref().filter(|_| !media.is_empty()) else {
            return keywords;
        };

        let started = Instant::now();
        match self.vision_analysis(&**vision, description, media, &keywords).await {
            Ok(Some(analysis)) => {
                debug!(
                    model = vision.model_name(),
                    category = %analysis.category,
                    priority = %analysis.priority,
                    confidence = analysis.confidence,
                    ms = started.elapsed().as_millis() as u64,
                    "Vision triage complete"
                );
                analysis
            }
            Ok(None) => keywords,
            Err(e) => {
                warn!(model = vision.model_name(), "Vision triage failed: {e}");
                keywords
            }
        }
    }

    /// `Ok(None)` when no usable image could be loaded.
    async fn vision_analysis(
        &self,
        vision: &dyn VisionModel,
        description: &str,
        media: &[MediaItem],
        keywords: &MaintenanceAnalysis,
    ) -> Result<Option<MaintenanceAnalysis>, LlmError> {
        let images = self.load_images(media).await;
        if images.is_empty() {
            return Ok(None);
        }

        let text = vision
            .generate(VisionRequest {
                prompt: vision_prompt(),
                images,
                temperature: 0.0,
                max_output_tokens: VISION_MAX_TOKENS,
                json_response: true,
            })
            .await?;

        let parsed = parse_json_loose(&text);
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
        };

        let category = normalize_category(field("category")).unwrap_or(keywords.category);
        let priority = normalize_priority(field("priority")).unwrap_or(keywords.priority);
        let summary = field("short_reason")
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(description)
            .to_string();

        let mut confidence = VISION_BASE_CONFIDENCE;
        if category == keywords.category {
            confidence += VISION_AGREEMENT_BONUS;
        }
        if priority == keywords.priority {
            confidence += VISION_AGREEMENT_BONUS;
        }

        Ok(Some(MaintenanceAnalysis {
            category,
            priority,
            confidence: confidence.min(VISION_MAX_CONFIDENCE),
            summary,
        }))
    }

    /// Fetch up to `MAX_VISION_IMAGES`, skipping failures and non-images.
    async fn load_images(&self, media: &[MediaItem]) -> Vec<ImagePart> {
        let mut images = Vec::new();
        for item in media.iter().take(MAX_VISION_IMAGES) {
            let fetched = match self.telephony.fetch_media(&item.source_url).await {
                Ok(f) => f,
                Err(e) => {
                    debug!(url = %item.source_url, "Skipping image: {e}");
                    continue;
                }
            };
            let mime = canonical_mime(&fetched.content_type);
            if !mime.starts_with("image/") {
                debug!(url = %item.source_url, mime = %mime, "Skipping non-image media");
                continue;
            }
            images.push(ImagePart {
                mime_type: mime,
                data: fetched.bytes,
            });
        }
        images
    }
}

fn canonical_mime(mime: &str) -> String {
    let main = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match main.as_str() {
        "" => "image/jpeg".to_string(),
        "image/jpg" => "image/jpeg".to_string(),
        _ => main,
    }
}

pub fn vision_prompt() -> String {
    let categories: Vec<&str> = TicketCategory::ALL.iter().map(|c| c.as_str()).collect();
    [
        "You are a maintenance triage assistant.".to_string(),
        "Look at the attached image(s) and decide:".to_string(),
        format!("- category: one of {}", categories.join(", ")),
        "- priority: one of EMERGENCY, HIGH, MEDIUM, LOW".to_string(),
        "- short_reason: 3-12 words explaining why.".to_string(),
        String::new(),
        "Return ONLY minified JSON like:".to_string(),
        r#"{"category":"HVAC","priority":"HIGH","short_reason":"Condensate line leaking"}"#
            .to_string(),
    ]
    .join("\n")
}

/// Parse model output that should be JSON but may be fenced or wrapped in prose.
pub fn parse_json_loose(text: &str) -> Option<Value> {
    let stripped = text.replace("```json", "").replace("```", "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(stripped) {
        return Some(v);
    }
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&stripped[start..=end]).ok()
}

fn squash(value: &str) -> String {
    value
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || *c == '_')
        .collect()
}

/// Map a model-provided category (including common synonyms) to a category.
pub fn normalize_category(value: Option<&str>) -> Option<TicketCategory> {
    let s = squash(value?);
    if let Ok(category) = s.parse() {
        return Some(category);
    }
    match s.as_str() {
        "AC" | "AIRCONDITIONING" | "AIR_CONDITIONING" | "A_C" => Some(TicketCategory::Hvac),
        "ELECTRIC" | "ELECTRICALISSUE" => Some(TicketCategory::Electrical),
        "PLUMB" | "WATER" => Some(TicketCategory::Plumbing),
        "APPLIANCES" => Some(TicketCategory::Appliance),
        "PEST" | "PESTS" | "VERMIN" => Some(TicketCategory::PestControl),
        "LOCKS" | "SECURITYISSUE" => Some(TicketCategory::Security),
        "COSMETICS" => Some(TicketCategory::Cosmetic),
        "OTHERISSUE" | "MISC" | "GENERAL" => Some(TicketCategory::Other),
        _ => None,
    }
}

pub fn normalize_priority(value: Option<&str>) -> Option<TicketPriority> {
    let s = squash(value?);
    if let Ok(priority) = s.parse() {
        return Some(priority);
    }
    (s == "URGENT").then_some(TicketPriority::High)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelephonyError;
    use crate::telephony::{FetchedMedia, SmsRequest};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct FakeMedia {
        content_type: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl TelephonyClient for FakeMedia {
        async fn send_sms(&self, _request: &SmsRequest) -> Result<String, TelephonyError> {
            Ok("SM".into())
        }
        async fn fetch_media(&self, url: &str) -> Result<FetchedMedia, TelephonyError> {
            if self.fail {
                return Err(TelephonyError::InvalidMediaUrl(url.into()));
            }
            Ok(FetchedMedia {
                bytes: vec![1, 2, 3],
                content_type: self.content_type.into(),
            })
        }
        async fn release_number(&self, _sid: &str) -> Result<(), TelephonyError> {
            Ok(())
        }
        fn validate_media_url(&self, _url: &str) -> Result<(), TelephonyError> {
            Ok(())
        }
    }

    struct FakeVision {
        reply: Result<String, ()>,
        seen_images: Mutex<Vec<usize>>,
    }

    impl FakeVision {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.into()),
                seen_images: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VisionModel for FakeVision {
        fn model_name(&self) -> &str {
            "fake"
        }
        async fn generate(&self, request: VisionRequest) -> Result<String, LlmError> {
            self.seen_images.lock().await.push(request.images.len());
            self.reply.clone().map_err(|_| LlmError::RequestFailed {
                provider: "fake".into(),
                reason: "down".into(),
            })
        }
    }

    fn media(n: usize) -> Vec<MediaItem> {
        (0..n)
            .map(|i| MediaItem {
                source_url: format!("https://m/{i}"),
                content_type: "image/jpeg".into(),
            })
            .collect()
    }

    fn analyzer(vision: Option<Arc<dyn VisionModel>>, media: FakeMedia) -> TriageAnalyzer {
        TriageAnalyzer::new(vision, Arc::new(media))
    }

    fn images() -> FakeMedia {
        FakeMedia {
            content_type: "image/png",
            fail: false,
        }
    }

    #[test]
    fn loose_json_parsing() {
        assert_eq!(
            parse_json_loose("```json\n{\"category\":\"HVAC\"}\n```").unwrap()["category"],
            "HVAC"
        );
        assert_eq!(
            parse_json_loose("Sure! {\"priority\":\"LOW\"} hope that helps").unwrap()["priority"],
            "LOW"
        );
        assert!(parse_json_loose("no json here").is_none());
        assert!(parse_json_loose("").is_none());
    }

    #[test]
    fn category_synonyms() {
        assert_eq!(normalize_category(Some("hvac")), Some(TicketCategory::Hvac));
        assert_eq!(normalize_category(Some("A/C")), Some(TicketCategory::Hvac));
        assert_eq!(normalize_category(Some("Air Conditioning")), Some(TicketCategory::Hvac));
        assert_eq!(normalize_category(Some("pest control")), None);
        assert_eq!(normalize_category(Some("pest_control")), Some(TicketCategory::PestControl));
        assert_eq!(normalize_category(Some("Vermin")), Some(TicketCategory::PestControl));
        assert_eq!(normalize_category(Some("misc")), Some(TicketCategory::Other));
        assert_eq!(normalize_category(Some("roofing")), None);
        assert_eq!(normalize_category(None), None);
    }

    #[test]
    fn priority_synonyms() {
        assert_eq!(normalize_priority(Some("urgent")), Some(TicketPriority::High));
        assert_eq!(normalize_priority(Some(" low ")), Some(TicketPriority::Low));
        assert_eq!(normalize_priority(Some("whenever")), None);
    }

    #[test]
    fn prompt_lists_every_category() {
        let prompt = vision_prompt();
        assert!(prompt.contains("PLUMBING, ELECTRICAL, HVAC"));
        assert!(prompt.contains("OTHER, UNKNOWN"));
        assert!(prompt.ends_with(r#""short_reason":"Condensate line leaking"}"#));
    }

    #[tokio::test]
    async fn no_vision_uses_keywords() {
        let a = analyzer(None, images())
            .analyze("toilet clogged", &media(1))
            .await;
        assert_eq!(a.category, TicketCategory::Plumbing);
        assert_eq!(a.confidence, 0.8);
    }

    #[tokio::test]
    async fn vision_agreeing_with_keywords_gets_max_confidence() {
        let vision = FakeVision::replying(
            r#"{"category":"PLUMBING","priority":"MEDIUM","short_reason":"Clogged toilet bowl"}"#,
        );
        let a = analyzer(Some(vision), images())
            .analyze("toilet clogged", &media(1))
            .await;
        assert_eq!(a.category, TicketCategory::Plumbing);
        assert_eq!(a.priority, TicketPriority::Medium);
        assert!((a.confidence - 0.95).abs() < 1e-6);
        assert_eq!(a.summary, "Clogged toilet bowl");
    }

    #[tokio::test]
    async fn vision_overrides_and_fills_missing_fields() {
        let vision = FakeVision::replying(r#"{"category":"electric"}"#);
        let a = analyzer(Some(vision), images())
            .analyze("toilet clogged", &media(1))
            .await;
        assert_eq!(a.category, TicketCategory::Electrical);
        // Missing priority falls back to the keyword value and counts as agreement.
        assert_eq!(a.priority, TicketPriority::Medium);
        assert!((a.confidence - 0.90).abs() < 1e-6);
        assert_eq!(a.summary, "toilet clogged");
    }

    #[tokio::test]
    async fn caps_images_at_four() {
        let vision = FakeVision::replying("{}");
        let a = analyzer(Some(vision.clone()), images());
        a.analyze("", &media(7)).await;
        assert_eq!(*vision.seen_images.lock().await, vec![MAX_VISION_IMAGES]);
    }

    #[tokio::test]
    async fn non_images_skip_vision() {
        let vision = FakeVision::replying(r#"{"category":"HVAC"}"#);
        let pdf = FakeMedia {
            content_type: "application/pdf",
            fail: false,
        };
        let a = analyzer(Some(vision.clone()), pdf)
            .analyze("toilet clogged", &media(2))
            .await;
        assert_eq!(a.category, TicketCategory::Plumbing);
        assert!(vision.seen_images.lock().await.is_empty());
    }

    #[tokio::test]
    async fn fetch_failures_and_model_errors_fall_back() {
        let vision = FakeVision::replying(r#"{"category":"HVAC"}"#);
        let broken = FakeMedia {
            content_type: "image/png",
            fail: true,
        };
        let a = analyzer(Some(vision), broken).analyze("sink", &media(1)).await;
        assert_eq!(a.category, TicketCategory::Plumbing);

        let down: Arc<dyn VisionModel> = Arc::new(FakeVision {
            reply: Err(()),
            seen_images: Mutex::new(Vec::new()),
        });
        let a = analyzer(Some(down), images()).analyze("sink", &media(1)).await;
        assert_eq!(a.category, TicketCategory::Plumbing);
        assert_eq!(a.confidence, 0.8);
    }
}
