//! Configuration settings for Ragline.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable that overrides the configured Elasticsearch endpoint.
pub const ELASTICSEARCH_URL_ENV: &str = "ELASTICSEARCH_URL";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub elasticsearch: ElasticsearchSettings,
    pub collection: CollectionSettings,
    pub embedding: EmbeddingSettings,
    pub youtube: YoutubeSettings,
    pub chunking: ChunkingSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Elasticsearch connection settings.
///
/// `url` is the cluster endpoint; the remaining fields are the extra client
/// parameters passed along with every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ElasticsearchSettings {
    /// Cluster endpoint, e.g. `http://localhost:9200`.
    pub url: Option<String>,
    /// Base64 encoded API key (sent as `Authorization: ApiKey ...`).
    pub api_key: Option<String>,
    /// Basic auth user name.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Request timeout in seconds. None keeps the client default.
    pub timeout_secs: Option<u64>,
    /// Additional headers sent with every request.
    pub headers: HashMap<String, String>,
}

impl Default for ElasticsearchSettings {
    fn default() -> Self {
        Self {
            url: Some("http://localhost:9200".to_string()),
            api_key: None,
            username: None,
            password: None,
            timeout_secs: None,
            headers: HashMap::new(),
        }
    }
}

/// Collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// Logical collection name; the index is `{name}_{dimensions}`.
    pub name: String,
    /// Owning application id used to scope reads and tag writes.
    pub app_id: Option<String>,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            name: "ragline".to_string(),
            app_id: None,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// YouTube transcript settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// Caption languages in order of preference.
    pub languages: Vec<String>,
    /// Translate the selected captions into this language.
    pub translation: Option<String>,
    /// Attach title, author, publish date etc. to the document metadata.
    pub add_video_info: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            translation: None,
            add_video_info: true,
            timeout_secs: 30,
        }
    }
}

/// Content chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 0,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        if let Ok(url) = std::env::var(ELASTICSEARCH_URL_ENV) {
            if !url.trim().is_empty() {
                settings.elasticsearch.url = Some(url);
            }
        }

        Ok(settings)
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ragline")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.collection.name, "ragline");
        assert_eq!(settings.embedding.dimensions, 1536);
        assert_eq!(settings.youtube.languages, vec!["en".to_string()]);
        assert!(settings.youtube.add_video_info);
        assert_eq!(settings.chunking.chunk_size, 2000);
        assert_eq!(settings.chunking.chunk_overlap, 0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [elasticsearch]
            url = "https://es.internal:9243"
            api_key = "abc"

            [elasticsearch.headers]
            x-opaque-id = "ragline"

            [collection]
            name = "videos"
            app_id = "app-1"
        "#;

        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(
            settings.elasticsearch.url.as_deref(),
            Some("https://es.internal:9243")
        );
        assert_eq!(settings.elasticsearch.api_key.as_deref(), Some("abc"));
        assert_eq!(
            settings.elasticsearch.headers.get("x-opaque-id").map(String::as_str),
            Some("ragline")
        );
        assert_eq!(settings.collection.name, "videos");
        assert_eq!(settings.collection.app_id.as_deref(), Some("app-1"));
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
        assert_eq!(settings.youtube.timeout_secs, 30);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.collection.name = "lectures".to_string();
        settings.youtube.languages = vec!["de".to_string(), "en".to_string()];
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, toml::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.collection.name, "lectures");
        assert_eq!(loaded.youtube.languages, vec!["de".to_string(), "en".to_string()]);
    }

    #[test]
    fn test_embedding_section_ignores_provider_key() {
        let toml_str = r#"
            [embedding]
            provider = "openai"
            model = "text-embedding-3-large"
            dimensions = 3072
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.embedding.model, "text-embedding-3-large");
        assert_eq!(settings.embedding.dimensions, 3072);

        let written = toml::to_string_pretty(&settings).unwrap();
        assert!(!written.contains("provider"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.collection.name, "ragline");
    }
}
