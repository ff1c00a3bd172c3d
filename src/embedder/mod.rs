//! Face embedding capability boundary.
//!
//! The embedder is an external service: it receives raw image bytes and
//! returns zero or more fixed-length face vectors. An empty list means "no
//! face detected above the service's confidence threshold" and is a normal
//! result, not an error. Callers in the pipeline additionally treat a failed
//! call as an empty result so one bad image never aborts a batch.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single detected face
#[derive(Debug, Clone)]
pub struct FaceEmbedding {
    /// Fixed-length numeric vector for similarity comparison
    pub vector: Vec<f32>,
    /// Detection confidence reported by the service (0-1)
    pub confidence: f32,
}

pub trait FaceEmbedder: Send + Sync {
    /// Extract face embeddings from raw image bytes. Empty is a valid result.
    fn embed(&self, image: &[u8]) -> Result<Vec<FaceEmbedding>>;

    /// Provider name for display
    fn provider_name(&self) -> &'static str;
}

// ============================================================================
// HTTP represent-endpoint provider
// ============================================================================

pub struct HttpFaceEmbedder {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct RepresentRequest {
    image: String,
}

#[derive(Debug, Deserialize)]
struct RepresentResponse {
    faces: Vec<RepresentFace>,
}

#[derive(Debug, Deserialize)]
struct RepresentFace {
    embedding: Vec<f32>,
    #[serde(default)]
    confidence: f32,
}

impl HttpFaceEmbedder {
    pub fn new(endpoint: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            timeout,
        }
    }
}

impl FaceEmbedder for HttpFaceEmbedder {
    fn embed(&self, image: &[u8]) -> Result<Vec<FaceEmbedding>> {
        let request = RepresentRequest {
            image: BASE64.encode(image),
        };

        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();

        let mut req = agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| anyhow!("Embedder request failed: {}", e))?;

        let represent: RepresentResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse embedder response: {}", e))?;

        Ok(represent
            .faces
            .into_iter()
            .map(|f| FaceEmbedding {
                vector: f.embedding,
                confidence: f.confidence,
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "HTTP represent endpoint"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_represent_response_parsing() {
        let json = r#"{"faces":[{"embedding":[0.1,0.2],"confidence":0.97},{"embedding":[0.3,0.4]}]}"#;
        let parsed: RepresentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.faces.len(), 2);
        assert_eq!(parsed.faces[0].embedding, vec![0.1, 0.2]);
        // Missing confidence defaults to 0.0
        assert_eq!(parsed.faces[1].confidence, 0.0);
    }

    #[test]
    fn test_empty_face_list_is_valid() {
        let parsed: RepresentResponse = serde_json::from_str(r#"{"faces":[]}"#).unwrap();
        assert!(parsed.faces.is_empty());
    }
}
