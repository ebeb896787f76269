//! YouTube video loader.

use super::transcript::{TranscriptOptions, TranscriptProvider, YoutubeTranscriptClient};
use super::{clean_string, Loader};
use crate::config::YoutubeSettings;
use crate::document::DocumentRecord;
use crate::error::{RaglineError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use tracing::{info, instrument};
use url::Url;

/// Metadata key holding the reference the record was loaded from.
pub const URL_KEY: &str = "url";

fn video_id_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Matches path-style YouTube URLs and bare video IDs
        Regex::new(
            r"(?x)
            (?:
                (?:https?://)?
                (?:www\.|m\.|music\.)?
                (?:youtu\.be/|youtube\.com/watch\?(?:[^\#]*&)?v=|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/|youtube\.com/live/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            # Bare video ID (11 characters)
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("Invalid regex")
    })
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the video ID from a YouTube URL or bare ID.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    // watch URLs carry the id in the query, wherever `v` appears
    if let Ok(url) = Url::parse(input) {
        let is_youtube = url
            .host_str()
            .is_some_and(|h| h == "youtube.com" || h.ends_with(".youtube.com"));
        if is_youtube && url.path() == "/watch" {
            return url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())
                .filter(|v| is_video_id(v));
        }
    }

    let caps = video_id_regex().captures(input)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Loads the transcript of a single YouTube video as one document record.
pub struct YoutubeVideoLoader {
    provider: Arc<dyn TranscriptProvider>,
    options: TranscriptOptions,
}

impl YoutubeVideoLoader {
    /// Create a loader over any transcript provider.
    pub fn new(provider: Arc<dyn TranscriptProvider>, options: TranscriptOptions) -> Self {
        Self { provider, options }
    }

    /// Create a loader fetching from youtube.com with the given settings.
    pub fn from_settings(settings: &YoutubeSettings) -> Result<Self> {
        let client = YoutubeTranscriptClient::from_settings(settings)?;
        Ok(Self::new(Arc::new(client), TranscriptOptions::from(settings)))
    }

    /// Transcript options in use.
    pub fn options(&self) -> &TranscriptOptions {
        &self.options
    }
}

#[async_trait]
impl Loader for YoutubeVideoLoader {
    #[instrument(skip(self))]
    async fn load_data(&self, source: &str) -> Result<Vec<DocumentRecord>> {
        let video_id = extract_video_id(source).ok_or_else(|| {
            RaglineError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", source))
        })?;

        let documents = self.provider.fetch(&video_id, &self.options).await?;
        let first = documents
            .into_iter()
            .next()
            .ok_or_else(|| RaglineError::NotFound(format!("No data found for {}", source)))?;

        let content = clean_string(&first.page_content);
        if content.is_empty() {
            return Err(RaglineError::NotFound(format!(
                "Transcript for {} is empty",
                source
            )));
        }

        let mut metadata = first.metadata;
        metadata.insert(URL_KEY.to_string(), json!(source));

        info!("Loaded transcript for {} ({} chars)", video_id, content.len());
        Ok(vec![DocumentRecord::new(content, metadata)])
    }

    fn can_handle(&self, source: &str) -> bool {
        extract_video_id(source).is_some()
    }

    fn data_type(&self) -> &'static str {
        "youtube_video"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::transcript::TranscriptDocument;
    use crate::document::Metadata;
    use std::sync::Mutex;

    /// Serves canned transcripts and records the requests it saw.
    struct FakeProvider {
        documents: Vec<TranscriptDocument>,
        requests: Mutex<Vec<(String, TranscriptOptions)>>,
    }

    impl FakeProvider {
        fn new(documents: Vec<TranscriptDocument>) -> Arc<Self> {
            Arc::new(Self {
                documents,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TranscriptProvider for FakeProvider {
        async fn fetch(
            &self,
            video_id: &str,
            options: &TranscriptOptions,
        ) -> Result<Vec<TranscriptDocument>> {
            self.requests
                .lock()
                .unwrap()
                .push((video_id.to_string(), options.clone()));
            Ok(self.documents.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl TranscriptProvider for FailingProvider {
        async fn fetch(&self, _: &str, _: &TranscriptOptions) -> Result<Vec<TranscriptDocument>> {
            Err(RaglineError::SourceUnavailable("connection refused".to_string()))
        }
    }

    fn transcript(text: &str) -> TranscriptDocument {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!("dQw4w9WgXcQ"));
        metadata.insert("title".to_string(), json!("Never Gonna Give You Up"));
        TranscriptDocument {
            page_content: text.to_string(),
            metadata,
        }
    }

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[test]
    fn test_extract_video_id() {
        let expected = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(extract_video_id(URL), expected);
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?list=PL1&v=dQw4w9WgXcQ&t=42s"),
            expected
        );
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("https://youtube.com/embed/dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("https://m.youtube.com/watch?v=dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("  dQw4w9WgXcQ "), expected);

        assert_eq!(extract_video_id("not-a-video-id"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[tokio::test]
    async fn test_load_returns_single_normalized_record() {
        let provider = FakeProvider::new(vec![
            transcript("  we're no strangers\n\nto love!!!   you know the rules "),
            transcript("second document is ignored"),
        ]);
        let loader = YoutubeVideoLoader::new(provider.clone(), TranscriptOptions::default());

        let records = loader.load_data(URL).await.unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.content, "we're no strangers to love! you know the rules");
        assert_eq!(record.url(), Some(URL));
        assert_eq!(record.title(), Some("Never Gonna Give You Up"));
        assert_eq!(record.metadata["source"], "dQw4w9WgXcQ");
        assert_eq!(clean_string(&record.content), record.content);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "dQw4w9WgXcQ");
        assert!(requests[0].1.add_video_info);
    }

    #[tokio::test]
    async fn test_load_without_documents_is_not_found() {
        let loader = YoutubeVideoLoader::new(FakeProvider::new(vec![]), TranscriptOptions::default());
        let err = loader.load_data(URL).await.unwrap_err();
        assert!(matches!(err, RaglineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_blank_transcript_is_not_found() {
        let provider = FakeProvider::new(vec![transcript(" \n\t ")]);
        let loader = YoutubeVideoLoader::new(provider, TranscriptOptions::default());
        let err = loader.load_data(URL).await.unwrap_err();
        assert!(matches!(err, RaglineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_propagates_provider_failure() {
        let loader = YoutubeVideoLoader::new(Arc::new(FailingProvider), TranscriptOptions::default());
        let err = loader.load_data(URL).await.unwrap_err();
        assert!(matches!(err, RaglineError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_reference() {
        let loader = YoutubeVideoLoader::new(FakeProvider::new(vec![]), TranscriptOptions::default());
        assert!(!loader.can_handle("/path/to/video.mp4"));
        let err = loader.load_data("/path/to/video.mp4").await.unwrap_err();
        assert!(matches!(err, RaglineError::InvalidInput(_)));
    }
}
