//! Ragline - YouTube transcripts in an Elasticsearch vector index
//!
//! Loads the transcript of a YouTube video as a normalized document record and
//! keeps chunked, embedded text in Elasticsearch for similarity search.
//!
//! # Architecture
//!
//! - `loader` - YouTube transcript loading and text normalization
//! - `chunking` - Splitting records into chunks with content-derived ids
//! - `embedding` - Embedding generation
//! - `vectordb` - Elasticsearch vector database adapter
//! - `orchestrator` - Ingestion pipeline
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use ragline::config::Settings;
//! use ragline::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(&settings).await?;
//!
//!     let result = orchestrator.ingest("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//!     println!("Added {} chunks", result.chunks_added);
//!
//!     for text in orchestrator.query("what is the song about?", 3).await? {
//!         println!("{}", text);
//!     }
//!
//!     orchestrator.close().await?;
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod loader;
pub mod openai;
pub mod orchestrator;
pub mod vectordb;

pub use error::{RaglineError, Result};
