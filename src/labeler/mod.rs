//! Scene labeling capability boundary.
//!
//! Used only when an image yields no face embeddings: a vision-language
//! model is asked for a short categorical label for the whole image. The
//! label is free text and not guaranteed slug-safe; the pipeline normalizes
//! it before use.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

pub trait SceneLabeler: Send + Sync {
    /// Return a short free-text label for the image
    fn label(&self, image: &[u8]) -> Result<String>;

    /// Provider name for display
    fn provider_name(&self) -> &'static str;
}

// ============================================================================
// OpenAI-compatible vision provider (works with LM Studio, Groq, OpenAI)
// ============================================================================

pub struct VisionSceneLabeler {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct VisionChatRequest {
    model: String,
    messages: Vec<VisionMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct VisionMessage {
    role: String,
    content: Vec<VisionContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum VisionContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VisionChatResponse {
    choices: Vec<VisionChoice>,
}

#[derive(Debug, Deserialize)]
struct VisionChoice {
    message: VisionResponseMessage,
}

#[derive(Debug, Deserialize)]
struct VisionResponseMessage {
    content: String,
}

fn label_prompt() -> &'static str {
    "1-3 word snake_case folder name for image subject. \
     E.g.: beach_sunset, birthday_cake, dog_playing. \
     Reply ONLY with the slug."
}

/// Decode image bytes, resize if either dimension exceeds `max_dimension`,
/// re-encode as JPEG, and return the base64-encoded string with MIME type.
fn encode_image_for_upload(image_bytes: &[u8], max_dimension: u32) -> Result<(String, &'static str)> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| anyhow!("Failed to decode image: {}", e))?;

    let (width, height) = img.dimensions();
    let img = if width > max_dimension || height > max_dimension {
        img.resize(
            max_dimension,
            max_dimension,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    };

    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    img.write_with_encoder(encoder)
        .map_err(|e| anyhow!("Failed to encode image as JPEG: {}", e))?;

    let base64_image = BASE64.encode(buf.into_inner());
    Ok((base64_image, "image/jpeg"))
}

impl VisionSceneLabeler {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            timeout,
        }
    }
}

impl SceneLabeler for VisionSceneLabeler {
    fn label(&self, image: &[u8]) -> Result<String> {
        let (base64_image, mime_type) = encode_image_for_upload(image, 1024)?;
        let data_url = format!("data:{};base64,{}", mime_type, base64_image);

        let request = VisionChatRequest {
            model: self.model.clone(),
            messages: vec![VisionMessage {
                role: "user".to_string(),
                content: vec![
                    VisionContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                    VisionContentPart::Text {
                        text: label_prompt().to_string(),
                    },
                ],
            }],
            max_tokens: 15,
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", self.endpoint);

        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();

        let mut req = agent.post(&url).set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| anyhow!("Labeler request failed: {}", e))?;

        let chat_response: VisionChatResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse labeler response: {}", e))?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow!("No response from labeler"))
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible vision"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{"choices":[{"message":{"content":" beach_sunset\n"}}]}"#;
        let parsed: VisionChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.trim(), "beach_sunset");
    }
}
