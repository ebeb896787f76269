//! Configuration module for Ragline.
//!
//! Handles loading and saving application settings.

mod settings;

pub use settings::{
    ChunkingSettings, CollectionSettings, ElasticsearchSettings, EmbeddingSettings,
    GeneralSettings, Settings, YoutubeSettings, ELASTICSEARCH_URL_ENV,
};
