// Gemini backend - try-on rendering through the generateContent API

use super::{BackendError, TryOnBackend, TryOnRequest};
use crate::tryon::types::{BackgroundSource, ImageBytes, ViewId};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Connection settings for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
}

/// Backend that asks a Gemini image model for each view
pub struct GeminiBackend {
    client: reqwest::Client,
    settings: GeminiSettings,
}

impl GeminiBackend {
    pub fn new(settings: GeminiSettings) -> Result<Self, BackendError> {
        if settings.api_key.trim().is_empty() {
            return Err(BackendError::Config("missing Gemini API key".to_string()));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }

    /// Build the text instruction sent alongside the two photos
    pub fn build_prompt(request: &TryOnRequest) -> String {
        let mut prompt = String::from(
            "You are a virtual fitting room. The first image shows a person, the second image shows a clothing item. \
             Generate a single photorealistic, full-body image of the same person wearing that clothing item. \
             Preserve the person's face, body shape, skin tone and hair exactly, and reproduce the garment's \
             color, pattern, fabric and fit faithfully.\n\n",
        );

        prompt.push_str(&format!("Pose: {}.\n", pose_description(request.view)));
        prompt.push_str(&format!("Background: {}\n", background_instruction(request.background)));

        let directives = request.directives.trim();
        if !directives.is_empty() {
            prompt.push_str(&format!("Creative directives from the user: {}\n", directives));
        }

        if request.regenerate {
            prompt.push_str(
                "This is a new attempt at this view: produce a noticeably different variation \
                 (framing, lighting, expression) while following all instructions above.\n",
            );
        }

        prompt.push_str("Return only the image.");
        prompt
    }

    fn build_body(request: &TryOnRequest) -> GenerateContentRequest {
        let parts = vec![
            Part::inline(&request.person.file.mime_type, &request.person.base64),
            Part::inline(&request.clothing.file.mime_type, &request.clothing.base64),
            Part::text(Self::build_prompt(request)),
        ];

        GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            },
        }
    }

    /// Pull the first image part out of a response
    fn extract_image(response: GenerateContentResponse) -> Result<ImageBytes, BackendError> {
        let mut texts = Vec::new();

        for candidate in response.candidates {
            let Some(content) = candidate.content else {
                if let Some(reason) = candidate.finish_reason {
                    texts.push(format!("finish reason {}", reason));
                }
                continue;
            };

            for part in content.parts {
                if let Some(inline) = part.inline_data {
                    if inline.mime_type.starts_with("image/") {
                        let data = base64::engine::general_purpose::STANDARD
                            .decode(inline.data.as_bytes())
                            .map_err(|e| BackendError::Parse(format!("invalid image data: {}", e)))?;
                        return Ok(ImageBytes::new(data, inline.mime_type));
                    }
                }
                if let Some(text) = part.text {
                    texts.push(text);
                }
            }
        }

        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            texts.push(format!("blocked: {}", reason));
        }

        let detail = texts.join(" ").trim().to_string();
        Err(BackendError::NoImage((!detail.is_empty()).then_some(detail)))
    }
}

fn pose_description(view: ViewId) -> &'static str {
    match view {
        ViewId::Front => "standing straight, facing the camera directly, full front view",
        ViewId::Side => "standing in a full side profile, turned 90 degrees from the camera",
        ViewId::Back => "standing with their back to the camera so the back of the outfit is visible",
        ViewId::Walking => "walking naturally mid-stride towards the camera",
        ViewId::Hero => "a confident hero pose, shot from a slightly low angle",
        ViewId::Casual => "a relaxed, casual everyday pose",
    }
}

fn background_instruction(background: BackgroundSource) -> &'static str {
    match background {
        BackgroundSource::Auto => "choose a clean, flattering setting that suits the outfit.",
        BackgroundSource::User => "keep the background from the person's photo.",
        BackgroundSource::Clothing => "use the background from the clothing item's photo.",
    }
}

#[async_trait]
impl TryOnBackend for GeminiBackend {
    async fn generate(&self, request: &TryOnRequest) -> Result<ImageBytes, BackendError> {
        tracing::debug!(view = %request.view, regenerate = request.regenerate, model = %self.settings.model, "sending generation request");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        let image = Self::extract_image(parsed)?;
        tracing::debug!(view = %request.view, bytes = image.data.len(), mime = %image.mime_type, "image received");
        Ok(image)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }

    fn inline(mime_type: &str, data: &str) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tryon::backends::testing::upload;

    fn request(view: ViewId, background: BackgroundSource, directives: &str, regenerate: bool) -> TryOnRequest {
        TryOnRequest {
            person: upload("me.png"),
            clothing: upload("shirt.png"),
            view,
            directives: directives.to_string(),
            background,
            regenerate,
        }
    }

    #[test]
    fn test_requires_api_key() {
        let settings = GeminiSettings {
            endpoint: "https://example.invalid/v1beta".into(),
            model: "m".into(),
            api_key: "  ".into(),
        };
        assert!(matches!(GeminiBackend::new(settings), Err(BackendError::Config(_))));
    }

    #[test]
    fn test_prompt_mentions_view_and_background() {
        let prompt = GeminiBackend::build_prompt(&request(ViewId::Back, BackgroundSource::User, "", false));
        assert!(prompt.contains("back to the camera"));
        assert!(prompt.contains("person's photo"));
        assert!(!prompt.contains("Creative directives"));
        assert!(!prompt.contains("new attempt"));
    }

    #[test]
    fn test_prompt_directives_and_regeneration() {
        let prompt = GeminiBackend::build_prompt(&request(
            ViewId::Hero,
            BackgroundSource::Clothing,
            "  dramatic lighting ",
            true,
        ));
        assert!(prompt.contains("Creative directives from the user: dramatic lighting\n"));
        assert!(prompt.contains("new attempt"));
        assert!(prompt.contains("clothing item's photo"));
    }

    #[test]
    fn test_request_body_shape() {
        let body = GeminiBackend::build_body(&request(ViewId::Front, BackgroundSource::Auto, "", false));
        let json = serde_json::to_value(&body).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "cGhvdG8=");
        assert!(parts[2]["text"].as_str().unwrap().contains("facing the camera"));
        assert!(parts[2].get("inlineData").is_none());
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");
    }

    #[test]
    fn test_extract_first_image_part() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "AQID" } },
                    { "inlineData": { "mimeType": "image/png", "data": "BAUG" } }
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let image = GeminiBackend::extract_image(response).unwrap();
        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn test_missing_image_reports_text() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't do that." }] } }]
        }))
        .unwrap();

        match GeminiBackend::extract_image(response) {
            Err(BackendError::NoImage(Some(text))) => assert_eq!(text, "I can't do that."),
            other => panic!("unexpected result: {:?}", other.map(|i| i.mime_type)),
        }
    }

    #[test]
    fn test_blocked_prompt() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();

        let err = GeminiBackend::extract_image(response).unwrap_err();
        assert_eq!(err.to_string(), "No image returned: blocked: SAFETY");
    }

    #[test]
    fn test_empty_response() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(GeminiBackend::extract_image(response), Err(BackendError::NoImage(None))));
    }
}
