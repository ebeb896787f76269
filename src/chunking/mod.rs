//! Splitting loaded records into indexable chunks.
//!
//! Chunks are bounded by a character budget and cut on word boundaries, so a
//! transcript with no timing information still yields searchable segments.

use crate::config::ChunkingSettings;
use crate::error::{RaglineError, Result};
use sha2::{Digest, Sha256};

/// Word-boundary text splitter with optional overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Create a chunker; the overlap must be smaller than the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RaglineError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RaglineError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into chunks of at most `chunk_size` characters.
    ///
    /// Whitespace between words is normalized to single spaces. Words longer
    /// than the budget are split hard. Consecutive chunks share up to
    /// `chunk_overlap` characters of trailing whole words.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0;

        for word in text.split_whitespace().flat_map(|w| self.pieces(w)) {
            let word_len = word.chars().count();
            let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };

            if needed > self.chunk_size && !current.is_empty() {
                chunks.push(current.join(" "));
                current = self.overlap_tail(&current, word_len);
                current_len = joined_len(&current);
            }

            current_len = if current.is_empty() { word_len } else { current_len + 1 + word_len };
            current.push(word);
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        chunks
    }

    /// Break a word into pieces no longer than the chunk size.
    fn pieces(&self, word: &str) -> Vec<String> {
        let chars: Vec<char> = word.chars().collect();
        chars
            .chunks(self.chunk_size)
            .map(|piece| piece.iter().collect())
            .collect()
    }

    /// Trailing words of a finished chunk to repeat at the start of the next.
    fn overlap_tail(&self, words: &[String], next_len: usize) -> Vec<String> {
        if self.chunk_overlap == 0 {
            return Vec::new();
        }

        let mut tail = Vec::new();
        let mut len = 0;
        for word in words.iter().rev() {
            let word_len = word.chars().count();
            let with_word = if tail.is_empty() { word_len } else { len + 1 + word_len };
            // the carried words plus the next word must still fit
            if with_word > self.chunk_overlap || with_word + 1 + next_len > self.chunk_size {
                break;
            }
            len = with_word;
            tail.push(word.clone());
        }
        tail.reverse();
        tail
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        let settings = ChunkingSettings::default();
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        }
    }
}

fn joined_len(words: &[String]) -> usize {
    if words.is_empty() {
        return 0;
    }
    words.iter().map(|w| w.chars().count()).sum::<usize>() + words.len() - 1
}

/// Content-derived chunk id: SHA-256 hex of the chunk text, its source and
/// the owning app id when there is one.
///
/// The same chunk from the same source always maps to the same id, which is
/// what makes re-ingesting a source skip what is already stored. Different
/// apps get different ids, so one app's writes never replace another's.
pub fn chunk_id(chunk: &str, source: &str, app_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.as_bytes());
    hasher.update(source.as_bytes());
    if let Some(app_id) = app_id {
        hasher.update(app_id.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(TextChunker::new(0, 0), Err(RaglineError::Config(_))));
        assert!(matches!(TextChunker::new(10, 10), Err(RaglineError::Config(_))));
        assert!(TextChunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = TextChunker::default();
        assert_eq!(chunker.split("  hello \n world "), vec!["hello world"]);
        assert!(chunker.split(" \n ").is_empty());
    }

    #[test]
    fn test_splits_on_word_boundaries() {
        let chunker = TextChunker::new(11, 0).unwrap();
        let chunks = chunker.split("the quick brown fox jumps over");
        assert_eq!(chunks, vec!["the quick", "brown fox", "jumps over"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 11));
    }

    #[test]
    fn test_long_word_split_hard() {
        let chunker = TextChunker::new(4, 0).unwrap();
        assert_eq!(chunker.split("abcdefghij xy"), vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn test_overlap_carries_trailing_words() {
        let chunker = TextChunker::new(15, 5).unwrap();
        let chunks = chunker.split("one two three four five six");
        assert_eq!(chunks, vec!["one two three", "three four five", "five six"]);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 15);
        }
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunker = TextChunker::new(5, 0).unwrap();
        assert_eq!(chunker.split("héllo wörld"), vec!["héllo", "wörld"]);
    }

    #[test]
    fn test_chunk_id_is_deterministic() {
        let id = chunk_id("some text", "https://youtu.be/dQw4w9WgXcQ", None);
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, chunk_id("some text", "https://youtu.be/dQw4w9WgXcQ", None));
        assert_ne!(id, chunk_id("some text", "https://youtu.be/other", None));
        assert_ne!(id, chunk_id("other text", "https://youtu.be/dQw4w9WgXcQ", None));
    }

    #[test]
    fn test_chunk_id_scoped_by_app() {
        let source = "https://youtu.be/dQw4w9WgXcQ";
        let one = chunk_id("some text", source, Some("one"));
        assert_eq!(one, chunk_id("some text", source, Some("one")));
        assert_ne!(one, chunk_id("some text", source, Some("two")));
        assert_ne!(one, chunk_id("some text", source, None));
    }

    #[test]
    fn test_chunk_id_known_value() {
        // sha256("Hello, World!")
        assert_eq!(
            chunk_id("Hello, ", "World!", None),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
