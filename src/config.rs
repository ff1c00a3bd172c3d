use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub embedder: EmbedderConfig,

    #[serde(default)]
    pub labeler: LabelerConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory under which per-owner upload trees live.
    #[serde(default = "default_upload_root")]
    pub upload_root: PathBuf,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_upload_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapsort")
        .join("uploads")
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
    ]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapsort")
        .join("snapsort.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Endpoint of the face representation service.
    #[serde(default = "default_embedder_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedder_timeout_secs")]
    pub timeout_secs: u64,

    /// Native distance threshold of the embedding model. Faces closer than
    /// this are the same identity; cosine matching uses `1.0 - distance_threshold`.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
}

fn default_embedder_endpoint() -> String {
    "http://127.0.0.1:8190/represent".to_string()
}

fn default_embedder_timeout_secs() -> u64 {
    30
}

fn default_distance_threshold() -> f32 {
    0.40
}

impl EmbedderConfig {
    /// Minimum cosine similarity for an embedding to match an existing group.
    pub fn similarity_threshold(&self) -> f32 {
        1.0 - self.distance_threshold
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedder_endpoint(),
            api_key: None,
            timeout_secs: default_embedder_timeout_secs(),
            distance_threshold: default_distance_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelerConfig {
    /// OpenAI-compatible endpoint used for the vision fallback.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_labeler_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_labeler_model() -> String {
    "gemma-3-4b".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_labeler_model(),
            api_key: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_assistant_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of prior conversation turns sent with each request.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_assistant_model() -> String {
    "gemma-3-4b".to_string()
}

fn default_history_window() -> usize {
    10
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_assistant_model(),
            api_key: None,
            timeout_secs: default_llm_timeout_secs(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
}

fn default_from_address() -> String {
    "snapsort@localhost".to_string()
}

fn default_max_attachments() -> usize {
    10
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            max_attachments: default_max_attachments(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, config_path: &PathBuf) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snapsort")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.delivery.max_attachments, 10);
        assert!((parsed.embedder.similarity_threshold() - 0.60).abs() < 1e-6);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[labeler]\nmodel = \"llava\"\n").unwrap();
        assert_eq!(parsed.labeler.model, "llava");
        assert_eq!(parsed.assistant.history_window, 10);
    }
}
