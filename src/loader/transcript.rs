//! YouTube transcript retrieval.
//!
//! Reads the player response embedded in the watch page, picks a caption
//! track and downloads its timed-text XML.

use crate::config::YoutubeSettings;
use crate::document::Metadata;
use crate::error::{RaglineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Options controlling which transcript is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptOptions {
    /// Caption languages in order of preference.
    pub languages: Vec<String>,
    /// Translate the chosen track into this language.
    pub translation: Option<String>,
    /// Include video details in the metadata.
    pub add_video_info: bool,
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            translation: None,
            add_video_info: true,
        }
    }
}

impl From<&YoutubeSettings> for TranscriptOptions {
    fn from(settings: &YoutubeSettings) -> Self {
        Self {
            languages: settings.languages.clone(),
            translation: settings.translation.clone(),
            add_video_info: settings.add_video_info,
        }
    }
}

/// Raw transcript as returned by a provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptDocument {
    pub page_content: String,
    pub metadata: Metadata,
}

/// Source of video transcripts.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// Fetch transcript documents for a video id.
    ///
    /// Returns an empty list when the video has no usable transcript.
    async fn fetch(&self, video_id: &str, options: &TranscriptOptions)
        -> Result<Vec<TranscriptDocument>>;
}

/// A caption track listed in the player response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "languageCode")]
    pub language_code: String,
    /// `"asr"` for auto-generated tracks.
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    /// Whether YouTube generated this track by speech recognition.
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// One timed-text cue.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedTextCue {
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

/// Transcript provider backed by youtube.com.
pub struct YoutubeTranscriptClient {
    http: reqwest::Client,
    base_url: Url,
}

impl YoutubeTranscriptClient {
    /// Create a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// Create a client from settings.
    pub fn from_settings(settings: &YoutubeSettings) -> Result<Self> {
        Self::new(Duration::from_secs(settings.timeout_secs))
    }

    /// Create a client against another host (mirrors, proxies).
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RaglineError::Config(format!("Invalid YouTube base URL: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        // skip the EU consent interstitial
        headers.insert(COOKIE, HeaderValue::from_static("CONSENT=YES+cb"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RaglineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    async fn get_text(&self, url: Url, what: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RaglineError::unavailable(what, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RaglineError::SourceUnavailable(format!(
                "{} returned {}",
                what, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| RaglineError::unavailable(what, e))
    }

    fn timedtext_url(track: &CaptionTrack, translation: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&track.base_url).map_err(|e| {
            RaglineError::SourceUnavailable(format!("Invalid caption track URL: {}", e))
        })?;

        // the default XML format is the one parse_timedtext understands
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "fmt" && k != "tlang")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.extend_pairs(pairs);
            if let Some(lang) = translation {
                query.append_pair("tlang", lang);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl TranscriptProvider for YoutubeTranscriptClient {
    #[instrument(skip(self, options))]
    async fn fetch(
        &self,
        video_id: &str,
        options: &TranscriptOptions,
    ) -> Result<Vec<TranscriptDocument>> {
        let mut watch_url = self
            .base_url
            .join("watch")
            .map_err(|e| RaglineError::Config(format!("Invalid YouTube base URL: {}", e)))?;
        watch_url.query_pairs_mut().append_pair("v", video_id);

        let html = self.get_text(watch_url, "YouTube watch page").await?;
        let player = extract_player_response(&html)?;

        let status = player
            .pointer("/playabilityStatus/status")
            .and_then(Value::as_str)
            .unwrap_or("OK");
        if status != "OK" {
            let reason = player
                .pointer("/playabilityStatus/reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown reason");
            warn!("Video {} is not playable ({}): {}", video_id, status, reason);
            return Ok(Vec::new());
        }

        let tracks = caption_tracks(&player);
        let Some(track) = select_track(&tracks, &options.languages, options.translation.is_some())
        else {
            warn!(
                "No transcript for video {} in languages {:?}",
                video_id, options.languages
            );
            return Ok(Vec::new());
        };
        debug!(
            "Using {} caption track '{}'",
            if track.is_generated() { "generated" } else { "manual" },
            track.language_code
        );

        let url = Self::timedtext_url(track, options.translation.as_deref())?;
        let xml = self.get_text(url, "YouTube timed text").await?;
        let cues = parse_timedtext(&xml);
        if cues.is_empty() {
            return Ok(Vec::new());
        }

        let page_content = cues
            .iter()
            .map(|c| c.text.trim_matches(' '))
            .collect::<Vec<_>>()
            .join(" ");

        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!(video_id));
        if options.add_video_info {
            metadata.extend(video_info(&player));
        }

        Ok(vec![TranscriptDocument {
            page_content,
            metadata,
        }])
    }
}

fn player_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"ytInitialPlayerResponse\s*=\s*").expect("player marker pattern is valid")
    })
}

/// Pull the `ytInitialPlayerResponse` JSON object out of a watch page.
pub fn extract_player_response(html: &str) -> Result<Value> {
    let Some(marker) = player_marker().find(html) else {
        if html.contains("class=\"g-recaptcha\"") {
            return Err(RaglineError::SourceUnavailable(
                "YouTube is rate limiting requests from this address".to_string(),
            ));
        }
        return Err(RaglineError::SourceUnavailable(
            "player response not found in watch page".to_string(),
        ));
    };

    // the object is followed by more script; read exactly one JSON value
    let mut values = serde_json::Deserializer::from_str(&html[marker.end()..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) if value.is_object() => Ok(value),
        Some(Err(e)) => Err(RaglineError::unavailable("malformed player response", e)),
        _ => Err(RaglineError::SourceUnavailable(
            "player response is not an object".to_string(),
        )),
    }
}

fn caption_tracks(player: &Value) -> Vec<CaptionTrack> {
    player
        .pointer("/captions/playerCaptionsTracklistRenderer/captionTracks")
        .and_then(Value::as_array)
        .map(|tracks| {
            tracks
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Choose a caption track.
///
/// Languages are tried in order; for each, a manual track beats a generated
/// one. When nothing matches and a translation is requested, the first track
/// is used since it will be translated anyway.
pub fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &[String],
    translating: bool,
) -> Option<&'a CaptionTrack> {
    for language in languages {
        let matching = |t: &&CaptionTrack| t.language_code.eq_ignore_ascii_case(language);
        let manual = tracks.iter().filter(matching).find(|t| !t.is_generated());
        if let Some(track) = manual.or_else(|| tracks.iter().find(matching)) {
            return Some(track);
        }
    }

    if translating {
        return tracks
            .iter()
            .find(|t| !t.is_generated())
            .or_else(|| tracks.first());
    }
    None
}

fn cue_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<text\b([^>]*)>(.*?)</text>"#).expect("cue pattern is valid")
    })
}

fn attr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(\w+)="([^"]*)""#).expect("attribute pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Parse timed-text XML into cues, skipping cues with no text.
pub fn parse_timedtext(xml: &str) -> Vec<TimedTextCue> {
    cue_pattern()
        .captures_iter(xml)
        .filter_map(|caps| {
            let mut start = 0.0;
            let mut duration = 0.0;
            for attr in attr_pattern().captures_iter(&caps[1]) {
                match &attr[1] {
                    "start" => start = attr[2].parse().unwrap_or(0.0),
                    "dur" => duration = attr[2].parse().unwrap_or(0.0),
                    _ => {}
                }
            }

            // XML escaping wraps the HTML escaping YouTube applies to captions
            let decoded = unescape_html(&unescape_html(&caps[2]));
            let text = tag_pattern().replace_all(&decoded, "").into_owned();
            if text.trim().is_empty() {
                return None;
            }
            Some(TimedTextCue {
                start,
                duration,
                text,
            })
        })
        .collect()
}

/// Decode the named and numeric entities that appear in captions.
fn unescape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => {
                    let code = if let Some(hex) = entity
                        .strip_prefix("#x")
                        .or_else(|| entity.strip_prefix("#X"))
                    {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        entity.strip_prefix('#').and_then(|dec| dec.parse().ok())
                    };
                    code.and_then(char::from_u32)
                }
            };
            ch.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Normalize YouTube publish dates to `YYYY-MM-DD HH:MM:SS`.
fn format_publish_date(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local().format("%Y-%m-%d %H:%M:%S").to_string());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn video_info(player: &Value) -> Metadata {
    let details = player.get("videoDetails").cloned().unwrap_or(Value::Null);
    let micro = player
        .pointer("/microformat/playerMicroformatRenderer")
        .cloned()
        .unwrap_or(Value::Null);

    let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    let int_field = |v: &Value, key: &str| {
        v.get(key).and_then(|x| {
            x.as_u64()
                .or_else(|| x.as_str().and_then(|s| s.parse().ok()))
        })
    };

    let mut info = Metadata::new();
    if let Some(title) = str_field(&details, "title") {
        info.insert("title".to_string(), json!(title));
    }
    if let Some(description) = str_field(&details, "shortDescription") {
        info.insert("description".to_string(), json!(description));
    }
    if let Some(views) = int_field(&details, "viewCount") {
        info.insert("view_count".to_string(), json!(views));
    }
    let thumbnail = details
        .pointer("/thumbnail/thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbs| thumbs.last())
        .and_then(|t| t.get("url"))
        .and_then(Value::as_str);
    if let Some(url) = thumbnail {
        info.insert("thumbnail_url".to_string(), json!(url));
    }
    let publish_date = str_field(&micro, "publishDate")
        .or_else(|| str_field(&micro, "uploadDate"))
        .and_then(|raw| format_publish_date(&raw));
    if let Some(date) = publish_date {
        info.insert("publish_date".to_string(), json!(date));
    }
    if let Some(length) = int_field(&details, "lengthSeconds") {
        info.insert("length".to_string(), json!(length));
    }
    if let Some(author) = str_field(&details, "author") {
        info.insert("author".to_string(), json!(author));
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(lang: &str, generated: bool) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://www.youtube.com/api/timedtext?v=x&lang={}", lang),
            language_code: lang.to_string(),
            kind: generated.then(|| "asr".to_string()),
        }
    }

    fn langs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_player_response() {
        let html = r#"<html><script>var ytInitialPlayerResponse = {"videoDetails":{"title":"A {tricky} title;"},"x":[1,2]};var meta = {};</script>"#;
        let player = extract_player_response(html).unwrap();
        assert_eq!(player["videoDetails"]["title"], "A {tricky} title;");
        assert_eq!(player["x"], json!([1, 2]));
    }

    #[test]
    fn test_extract_player_response_missing() {
        let err = extract_player_response("<html></html>").unwrap_err();
        assert!(matches!(err, RaglineError::SourceUnavailable(_)));

        let err = extract_player_response(r#"<div class="g-recaptcha"></div>"#).unwrap_err();
        assert!(err.to_string().contains("rate limiting"));
    }

    #[test]
    fn test_select_track_prefers_manual() {
        let tracks = vec![track("en", true), track("de", false), track("en", false)];

        let chosen = select_track(&tracks, &langs(&["en"]), false).unwrap();
        assert_eq!(chosen.language_code, "en");
        assert!(!chosen.is_generated());

        let chosen = select_track(&tracks, &langs(&["fr", "de"]), false).unwrap();
        assert_eq!(chosen.language_code, "de");
    }

    #[test]
    fn test_select_track_falls_back_to_generated() {
        let tracks = vec![track("en", true)];
        let chosen = select_track(&tracks, &langs(&["en"]), false).unwrap();
        assert!(chosen.is_generated());
    }

    #[test]
    fn test_select_track_no_match() {
        let tracks = vec![track("ja", true), track("ko", false)];
        assert!(select_track(&tracks, &langs(&["en"]), false).is_none());

        let chosen = select_track(&tracks, &langs(&["en"]), true).unwrap();
        assert_eq!(chosen.language_code, "ko");
        assert!(select_track(&[], &langs(&["en"]), true).is_none());
    }

    #[test]
    fn test_timedtext_url_strips_format_and_adds_translation() {
        let mut t = track("en", false);
        t.base_url = "https://www.youtube.com/api/timedtext?v=abc&lang=en&fmt=srv3".to_string();

        let url = YoutubeTranscriptClient::timedtext_url(&t, Some("de")).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("v".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("tlang".to_string(), "de".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "fmt"));
    }

    #[test]
    fn test_parse_timedtext() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
<text start="0.04" dur="2.5">hey there &amp;#39;folks&amp;#39;</text>
<text start="2.54" dur="3.1">rock &amp;amp; roll
 tonight</text>
<text start="5.6" dur="1.0"> </text>
<text start="6.7" dur="2">&lt;font color=&quot;#E5E5E5&quot;&gt;colored&lt;/font&gt; words</text>
</transcript>"#;

        let cues = parse_timedtext(xml);
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].text, "hey there 'folks'");
        assert!((cues[0].start - 0.04).abs() < 1e-9);
        assert!((cues[0].duration - 2.5).abs() < 1e-9);
        assert_eq!(cues[1].text, "rock & roll\n tonight");
        assert_eq!(cues[2].text, "colored words");
    }

    #[test]
    fn test_unescape_html() {
        assert_eq!(unescape_html("a &lt;b&gt; &#x41;&#66;"), "a <b> AB");
        assert_eq!(unescape_html("fish & chips"), "fish & chips");
        assert_eq!(unescape_html("&unknown; &amp"), "&unknown; &amp");
    }

    #[test]
    fn test_video_info() {
        let player = json!({
            "videoDetails": {
                "videoId": "dQw4w9WgXcQ",
                "title": "Never Gonna Give You Up",
                "lengthSeconds": "212",
                "shortDescription": "The official video",
                "author": "Rick Astley",
                "viewCount": "1500000000",
                "thumbnail": {"thumbnails": [
                    {"url": "https://i.ytimg.com/small.jpg"},
                    {"url": "https://i.ytimg.com/large.jpg"}
                ]}
            },
            "microformat": {"playerMicroformatRenderer": {"publishDate": "2009-10-24T23:57:33-07:00"}}
        });

        let info = video_info(&player);
        assert_eq!(info["title"], "Never Gonna Give You Up");
        assert_eq!(info["length"], 212);
        assert_eq!(info["view_count"], 1_500_000_000u64);
        assert_eq!(info["author"], "Rick Astley");
        assert_eq!(info["thumbnail_url"], "https://i.ytimg.com/large.jpg");
        assert_eq!(info["publish_date"], "2009-10-24 23:57:33");
        assert_eq!(info["description"], "The official video");
    }

    #[test]
    fn test_format_publish_date() {
        assert_eq!(
            format_publish_date("2021-03-04").as_deref(),
            Some("2021-03-04 00:00:00")
        );
        assert_eq!(format_publish_date("yesterday"), None);
    }
}
