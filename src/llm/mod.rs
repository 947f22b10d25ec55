//! Vision model integration for image triage.
//!
//! The classifier only needs "prompt + images in, text out", so the seam is
//! the small `VisionModel` trait. `GeminiVision` talks to the Gemini REST API.

mod gemini;

pub use gemini::GeminiVision;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::VisionConfig;
use crate::error::LlmError;

/// One inline image.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A single-turn multimodal request.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    pub images: Vec<ImagePart>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the model to answer with a JSON document.
    pub json_response: bool,
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Run the request and return the model's text.
    async fn generate(&self, request: VisionRequest) -> Result<String, LlmError>;
}

/// Build the configured vision model.
pub fn create_vision_model(config: &VisionConfig) -> Arc<dyn VisionModel> {
    tracing::info!("Using Gemini vision (model: {})", config.model);
    Arc::new(GeminiVision::new(config.api_key.clone(), config.model.clone()))
}
