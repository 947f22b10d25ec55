//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::{VisionModel, VisionRequest};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "gemini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GeminiVision {
    api_key: SecretString,
    model: String,
    client: Client,
}

impl GeminiVision {
    pub fn new(api_key: SecretString, model: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            api_key,
            model,
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/models/{}:generateContent", self.model)
    }
}

/// Request body for a single user turn with inline images.
pub(crate) fn build_body(request: &VisionRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    parts.extend(request.images.iter().map(|img| {
        json!({
            "inlineData": {
                "mimeType": img.mime_type,
                "data": BASE64.encode(&img.data),
            }
        })
    }));

    let mut generation = json!({
        "temperature": request.temperature,
        "maxOutputTokens": request.max_output_tokens,
    });
    if request.json_response {
        generation["responseMimeType"] = json!("application/json");
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation,
    })
}

/// Concatenate the text parts of the first candidate.
pub(crate) fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

#[async_trait]
impl VisionModel for GeminiVision {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: VisionRequest) -> Result<String, LlmError> {
        debug!(
            model = %self.model,
            images = request.images.len(),
            "Calling vision model"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&build_body(&request))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}: {error_text}"),
            });
        }

        let body: Value = response.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: format!("Failed to parse response: {e}"),
        })?;

        extract_text(&body).ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "no text in first candidate".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImagePart;

    #[test]
    fn body_inlines_images_and_json_mode() {
        let body = build_body(&VisionRequest {
            prompt: "triage".into(),
            images: vec![ImagePart {
                mime_type: "image/png".into(),
                data: b"abc".to_vec(),
            }],
            temperature: 0.0,
            max_output_tokens: 128,
            json_response: true,
        });

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "triage");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "YWJj");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 128);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn extracts_joined_candidate_text() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"category\":" }, { "text": "\"HVAC\"}" }] }
            }]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("{\"category\":\"HVAC\"}"));
        assert!(extract_text(&json!({ "candidates": [] })).is_none());
    }
}
