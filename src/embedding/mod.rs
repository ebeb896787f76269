//! Embedding generation for semantic search and retrieval.

mod openai;

pub use openai::OpenAIEmbedder;

use crate::error::{RaglineError, Result};
use async_trait::async_trait;

/// Capability that turns texts into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per text in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RaglineError::Embedding("Empty embedding response".to_string()))
    }
}

/// Check that a provider returned one vector of `dimensions` floats per input.
pub fn validate_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimensions: usize,
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(RaglineError::Validation(format!(
            "embedding provider returned {} vectors for {} texts",
            embeddings.len(),
            expected_count
        )));
    }

    if let Some((i, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, e)| e.len() != dimensions)
    {
        return Err(RaglineError::Validation(format!(
            "embedding {} has length {}, expected {}",
            i,
            bad.len(),
            dimensions
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_embed_uses_first_vector() {
        let v = FixedEmbedder.embed("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }

    #[test]
    fn test_validate_embeddings() {
        let good = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        assert!(validate_embeddings(&good, 2, 2).is_ok());

        let err = validate_embeddings(&good, 3, 2).unwrap_err();
        assert!(matches!(err, RaglineError::Validation(_)));

        let ragged = vec![vec![0.0, 1.0], vec![1.0]];
        let err = validate_embeddings(&ragged, 2, 2).unwrap_err();
        assert!(err.to_string().contains("embedding 1 has length 1"));
    }
}
