//! Loaders turning external sources into normalized document records.

mod transcript;
mod youtube;

pub use transcript::{
    extract_player_response, parse_timedtext, select_track, CaptionTrack, TimedTextCue,
    TranscriptDocument, TranscriptOptions, TranscriptProvider, YoutubeTranscriptClient,
};
pub use youtube::{extract_video_id, YoutubeVideoLoader};

use crate::document::DocumentRecord;
use crate::error::Result;
use async_trait::async_trait;

/// Trait for data loaders.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Load records from a source reference (URL, id, path).
    async fn load_data(&self, source: &str) -> Result<Vec<DocumentRecord>>;

    /// Check if this loader can handle the given reference.
    fn can_handle(&self, source: &str) -> bool;

    /// Data type tag stored with every chunk this loader produces.
    fn data_type(&self) -> &'static str;
}

/// Normalize scraped text.
///
/// Drops backslashes, turns `#` into spaces, collapses runs of the same
/// punctuation character (`"!!!"` becomes `"!"`) and squeezes all whitespace
/// to single spaces. Applying it twice gives the same result as once.
pub fn clean_string(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut prev: Option<char> = None;

    for c in text.chars() {
        let c = match c {
            '\\' => continue,
            '#' => ' ',
            other => other,
        };
        if is_symbol(c) && prev == Some(c) {
            continue;
        }
        collapsed.push(c);
        prev = Some(c);
    }

    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_symbol(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_string_whitespace() {
        assert_eq!(clean_string("  hello \n\n  world\t "), "hello world");
        assert_eq!(clean_string("\n\t "), "");
    }

    #[test]
    fn test_clean_string_symbols() {
        assert_eq!(clean_string("!!! hello !!!"), "! hello !");
        assert_eq!(clean_string("wait... what??"), "wait. what?");
        assert_eq!(clean_string("a\\b"), "ab");
        assert_eq!(clean_string("#rust #async"), "rust async");
        assert_eq!(clean_string("snake__case"), "snake__case");
        assert_eq!(clean_string("!\\!"), "!");
    }

    #[test]
    fn test_clean_string_idempotent() {
        let samples = [
            "  [Music]   so... today   we're \n talking ## about Rust!!! ",
            "!#!  \\\\ ??..",
            "already clean text.",
            "émigré –– über–cool",
        ];
        for sample in samples {
            let once = clean_string(sample);
            assert_eq!(clean_string(&once), once, "not idempotent for {:?}", sample);
            assert_eq!(once.trim(), once);
            assert!(!once.contains("  "));
        }
    }
}
