//! Ingestion pipeline for Ragline.
//!
//! Coordinates loading a source, chunking it, and adding only the chunks the
//! collection does not already hold.

use crate::chunking::{chunk_id, TextChunker};
use crate::config::Settings;
use crate::document::Metadata;
use crate::embedding::{EmbeddingProvider, OpenAIEmbedder};
use crate::error::{RaglineError, Result};
use crate::loader::{Loader, YoutubeVideoLoader};
use crate::vectordb::{ElasticsearchDb, QueryHit, VectorDb, WhereFilter, APP_ID_KEY};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Metadata key recording which loader produced a chunk.
pub const DATA_TYPE_KEY: &str = "data_type";

/// The main orchestrator for the Ragline pipeline.
pub struct Orchestrator {
    loader: Arc<dyn Loader>,
    vector_db: ElasticsearchDb,
    chunker: TextChunker,
    app_id: Option<String>,
}

impl Orchestrator {
    /// Build the pipeline described by `settings`: OpenAI embeddings, an
    /// Elasticsearch collection and the YouTube loader.
    pub async fn new(settings: &Settings) -> Result<Self> {
        let dimensions = settings.embedding.dimensions as usize;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            dimensions,
        )?);

        let vector_db = ElasticsearchDb::open(
            &settings.elasticsearch,
            embedder,
            dimensions,
            &settings.collection.name,
        )
        .await?;

        let loader = Arc::new(YoutubeVideoLoader::from_settings(&settings.youtube)?);
        let chunker = TextChunker::from_settings(&settings.chunking)?;

        Ok(Self::with_components(
            loader,
            vector_db,
            chunker,
            settings.collection.app_id.clone(),
        ))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        loader: Arc<dyn Loader>,
        vector_db: ElasticsearchDb,
        chunker: TextChunker,
        app_id: Option<String>,
    ) -> Self {
        Self {
            loader,
            vector_db,
            chunker,
            app_id,
        }
    }

    pub fn vector_db(&self) -> &ElasticsearchDb {
        &self.vector_db
    }

    pub fn loader(&self) -> Arc<dyn Loader> {
        self.loader.clone()
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    fn filter(&self) -> WhereFilter {
        WhereFilter {
            app_id: self.app_id.clone(),
        }
    }

    /// Load, chunk and store a source, skipping chunks already stored.
    #[instrument(skip(self), fields(source = %source))]
    pub async fn ingest(&self, source: &str) -> Result<IngestResult> {
        if !self.loader.can_handle(source) {
            return Err(RaglineError::InvalidInput(format!(
                "{} loader cannot handle {}",
                self.loader.data_type(),
                source
            )));
        }

        let records = self.loader.load_data(source).await?;

        let mut texts = Vec::new();
        let mut metadatas = Vec::new();
        let mut ids = Vec::new();
        let mut seen = HashSet::new();

        for record in &records {
            let metadata = self.chunk_metadata(&record.metadata);
            for chunk in self.chunker.split(&record.content) {
                let id = chunk_id(&chunk, source, self.app_id.as_deref());
                // identical chunks within one source collapse to one id
                if !seen.insert(id.clone()) {
                    continue;
                }
                texts.push(chunk);
                metadatas.push(metadata.clone());
                ids.push(id);
            }
        }

        let chunks_total = ids.len();
        let existing = self.vector_db.exists(&ids, &self.filter()).await?;
        debug!("{} of {} chunks already stored", existing.len(), chunks_total);

        let mut new_texts = Vec::new();
        let mut new_metadatas = Vec::new();
        let mut new_ids = Vec::new();
        for ((text, metadata), id) in texts.into_iter().zip(metadatas).zip(ids) {
            if !existing.contains(&id) {
                new_texts.push(text);
                new_metadatas.push(metadata);
                new_ids.push(id);
            }
        }

        if !new_ids.is_empty() {
            self.vector_db.add(&new_texts, &new_metadatas, &new_ids).await?;
        }
        info!("Added {} new chunks from {}", new_ids.len(), source);

        Ok(IngestResult {
            source: source.to_string(),
            data_type: self.loader.data_type().to_string(),
            chunks_total,
            chunks_added: new_ids.len(),
        })
    }

    fn chunk_metadata(&self, record_metadata: &Metadata) -> Metadata {
        let mut metadata = record_metadata.clone();
        metadata.insert(DATA_TYPE_KEY.to_string(), json!(self.loader.data_type()));
        if let Some(app_id) = &self.app_id {
            metadata.insert(APP_ID_KEY.to_string(), json!(app_id));
        }
        metadata
    }

    /// Texts most similar to `input_query`, scoped to the configured app.
    pub async fn query(&self, input_query: &str, n_results: usize) -> Result<Vec<String>> {
        self.vector_db
            .query(input_query, n_results, &self.filter())
            .await
    }

    /// Similarity search with ids, metadata and scores.
    pub async fn query_with_scores(
        &self,
        input_query: &str,
        n_results: usize,
    ) -> Result<Vec<QueryHit>> {
        self.vector_db
            .query_with_scores(input_query, n_results, &self.filter())
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.vector_db.count().await
    }

    pub async fn reset(&self) -> Result<()> {
        self.vector_db.reset().await
    }

    /// Release the search engine connection.
    pub async fn close(self) -> Result<()> {
        self.vector_db.close().await
    }
}

/// Result of ingesting a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    /// The reference that was ingested.
    pub source: String,
    /// Loader data type.
    pub data_type: String,
    /// Distinct chunks produced from the source.
    pub chunks_total: usize,
    /// Chunks that were not stored before.
    pub chunks_added: usize,
}

impl IngestResult {
    /// Chunks skipped because they were already stored.
    pub fn chunks_skipped(&self) -> usize {
        self.chunks_total - self.chunks_added
    }
}
