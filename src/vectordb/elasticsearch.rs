//! Elasticsearch-backed vector database.

use super::query::{
    count_all_query, document_source, exists_query, index_mapping, parse_bulk_failures,
    parse_hit_ids, parse_query_hits, similarity_query, MAX_RESULT_WINDOW, METADATA_FIELD,
    TEXT_FIELD,
};
use super::{index_name, BulkOperation, EsClient, QueryHit, SearchEngine, VectorDb, WhereFilter};
use crate::config::ElasticsearchSettings;
use crate::document::Metadata;
use crate::embedding::{validate_embeddings, EmbeddingProvider};
use crate::error::{RaglineError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Characters Elasticsearch refuses in index names.
const FORBIDDEN_INDEX_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

/// Vector database storing one collection in one Elasticsearch index.
pub struct ElasticsearchDb {
    engine: Arc<dyn SearchEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_dim: usize,
    collection_name: String,
    index: String,
    /// False until the mapped index is known to exist, and again after `reset`.
    index_ready: AtomicBool,
}

impl std::fmt::Debug for ElasticsearchDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchDb")
            .field("index", &self.index)
            .field("vector_dim", &self.vector_dim)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchDb {
    /// Connect to the cluster described by `settings` and open a collection.
    pub async fn open(
        settings: &ElasticsearchSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_dim: usize,
        collection_name: &str,
    ) -> Result<Self> {
        let client = EsClient::new(settings)?;
        info!("Connecting to Elasticsearch at {}", client.base_url());
        Self::with_engine(Arc::new(client), embedder, vector_dim, collection_name).await
    }

    /// Connect to the cluster without creating the collection's index.
    ///
    /// Reads on an absent index come back empty and `reset` leaves it absent.
    /// The first `add` creates it.
    pub fn connect(
        settings: &ElasticsearchSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_dim: usize,
        collection_name: &str,
    ) -> Result<Self> {
        let client = EsClient::new(settings)?;
        info!("Connecting to Elasticsearch at {}", client.base_url());
        Self::attach(Arc::new(client), embedder, vector_dim, collection_name)
    }

    /// Open a collection on an existing engine, creating its index if absent.
    pub async fn with_engine(
        engine: Arc<dyn SearchEngine>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_dim: usize,
        collection_name: &str,
    ) -> Result<Self> {
        let db = Self::attach(engine, embedder, vector_dim, collection_name)?;
        db.ensure_index().await?;
        Ok(db)
    }

    /// Validate the parameters and bind to the index without touching it.
    pub fn attach(
        engine: Arc<dyn SearchEngine>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_dim: usize,
        collection_name: &str,
    ) -> Result<Self> {
        if vector_dim == 0 {
            return Err(RaglineError::Config(
                "Vector dimension is required to refer to the correct index and mapping"
                    .to_string(),
            ));
        }
        validate_collection_name(collection_name)?;

        if embedder.dimensions() != vector_dim {
            return Err(RaglineError::Validation(format!(
                "embedding provider produces {}-dimensional vectors, collection expects {}",
                embedder.dimensions(),
                vector_dim
            )));
        }

        Ok(Self {
            engine,
            embedder,
            vector_dim,
            collection_name: collection_name.to_string(),
            index: index_name(collection_name, vector_dim),
            index_ready: AtomicBool::new(false),
        })
    }

    /// Name of the backing index.
    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Logical collection name.
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Dimensionality of stored embeddings.
    pub fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    /// Switch to another collection on the same connection.
    pub async fn set_collection_name(&mut self, collection_name: &str) -> Result<()> {
        validate_collection_name(collection_name)?;
        self.collection_name = collection_name.to_string();
        self.index = index_name(collection_name, self.vector_dim);
        self.index_ready.store(false, Ordering::SeqCst);
        self.ensure_index().await
    }

    async fn ensure_index(&self) -> Result<()> {
        if !self.engine.index_exists(&self.index).await? {
            let mapping = index_mapping(self.vector_dim);
            info!("Creating index {}", self.index);
            debug!("Index settings: {}", mapping);
            self.engine.create_index(&self.index, &mapping).await?;
        }
        self.index_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Similarity search returning ids, texts, metadata and scores.
    #[instrument(skip(self, input_query))]
    pub async fn query_with_scores(
        &self,
        input_query: &str,
        n_results: usize,
        filter: &WhereFilter,
    ) -> Result<Vec<QueryHit>> {
        self.search_similar(input_query, n_results, filter, &[TEXT_FIELD, METADATA_FIELD])
            .await
    }

    async fn search_similar(
        &self,
        input_query: &str,
        n_results: usize,
        filter: &WhereFilter,
        source_fields: &[&str],
    ) -> Result<Vec<QueryHit>> {
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(input_query).await?;
        validate_embeddings(std::slice::from_ref(&query_vector), 1, self.vector_dim)?;

        let body = similarity_query(&query_vector, filter, n_results, source_fields);
        let response = match self.engine.search(&self.index, &body).await {
            Ok(response) => response,
            Err(RaglineError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let hits = parse_query_hits(response)?;
        debug!("Similarity search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Release the engine connection.
    pub async fn close(self) -> Result<()> {
        debug!("Closing collection {}", self.index);
        self.engine.close().await
    }
}

/// Reject names Elasticsearch would refuse as index names.
fn validate_collection_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RaglineError::Config(
            "Collection name is required. It cannot be empty".to_string(),
        ));
    }
    if name.starts_with(['-', '_', '+']) || name == "." || name == ".." {
        return Err(RaglineError::Config(format!(
            "Collection name {:?} cannot start with '-', '_' or '+'",
            name
        )));
    }
    if name.chars().any(|c| c.is_uppercase() || FORBIDDEN_INDEX_CHARS.contains(&c)) {
        return Err(RaglineError::Config(format!(
            "Collection name {:?} must be lowercase without \\ / * ? \" < > | , # : or spaces",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl VectorDb for ElasticsearchDb {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn exists(&self, ids: &[String], filter: &WhereFilter) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        // one search may not return more than the result window
        for page in ids.chunks(MAX_RESULT_WINDOW) {
            let body = exists_query(page, filter);
            let response = match self.engine.search(&self.index, &body).await {
                Ok(response) => response,
                Err(RaglineError::NotFound(_)) => return Ok(HashSet::new()),
                Err(e) => return Err(e),
            };
            found.extend(parse_hit_ids(response)?);
        }
        Ok(found)
    }

    #[instrument(skip(self, texts, metadatas, ids), fields(count = texts.len()))]
    async fn add(&self, texts: &[String], metadatas: &[Metadata], ids: &[String]) -> Result<()> {
        if texts.len() != metadatas.len() || texts.len() != ids.len() {
            return Err(RaglineError::Validation(format!(
                "texts ({}), metadatas ({}) and ids ({}) must have the same length",
                texts.len(),
                metadatas.len(),
                ids.len()
            )));
        }
        if texts.is_empty() {
            return Ok(());
        }

        let embeddings = self.embedder.embed_batch(texts).await?;
        validate_embeddings(&embeddings, texts.len(), self.vector_dim)?;

        if !self.index_ready.load(Ordering::SeqCst) {
            self.ensure_index().await?;
        }

        let operations: Vec<BulkOperation> = ids
            .iter()
            .zip(texts)
            .zip(metadatas)
            .zip(&embeddings)
            .map(|(((id, text), metadata), embedding)| BulkOperation {
                index: self.index.clone(),
                id: id.clone(),
                source: document_source(text, metadata, embedding),
            })
            .collect();

        let response = self.engine.bulk(&operations).await?;
        let failures = parse_bulk_failures(&response);

        // accepted documents become visible even when some were rejected
        self.engine.refresh(&self.index).await?;

        if !failures.is_empty() {
            warn!(
                "Bulk write into {} rejected {} of {} documents",
                self.index,
                failures.len(),
                operations.len()
            );
            return Err(RaglineError::PartialWrite { failures });
        }

        info!("Indexed {} documents into {}", operations.len(), self.index);
        Ok(())
    }

    async fn query(
        &self,
        input_query: &str,
        n_results: usize,
        filter: &WhereFilter,
    ) -> Result<Vec<String>> {
        let hits = self
            .search_similar(input_query, n_results, filter, &[TEXT_FIELD])
            .await?;
        Ok(hits.into_iter().map(|h| h.text).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> Result<usize> {
        match self.engine.count(&self.index, &count_all_query()).await {
            Ok(count) => Ok(count as usize),
            Err(RaglineError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn reset(&self) -> Result<()> {
        if self.engine.index_exists(&self.index).await? {
            info!("Deleting index {}", self.index);
            self.engine.delete_index(&self.index).await?;
        }
        self.index_ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}
