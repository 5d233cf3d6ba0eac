use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no captions found: {0}")]
    NoCaptions(String),
    #[error("video is not available (may have been removed): {0}")]
    VideoUnavailable(String),
    #[error("video is private or requires sign-in: {0}")]
    VideoPrivate(String),
    #[error("subtitles are disabled for this video: {0}")]
    CaptionsDisabled(String),
    #[error("request blocked by upstream: {0}")]
    Blocked(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("source failed: {0}")]
    Source(String),
}

impl Error {
    /// Terminal errors describe a video state no other source can fix;
    /// the resolver must stop instead of trying further strategies.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::VideoUnavailable(_) | Error::VideoPrivate(_) | Error::CaptionsDisabled(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Opaque 11-character YouTube video identifier.
///
/// Invariant: exactly 11 characters from `[A-Za-z0-9_-]`, enforced at
/// construction. `parse` accepts the common URL shapes or a bare id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

fn is_valid_id(s: &str) -> bool {
    s.len() == 11
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn id_from_url(u: &url::Url) -> Option<String> {
    let host = u.host_str()?.to_ascii_lowercase();
    let is_youtube = host == "youtube.com"
        || host == "youtu.be"
        || host.ends_with(".youtube.com")
        || host.ends_with(".youtu.be");
    if !is_youtube {
        return None;
    }

    // youtu.be/<id>
    if host == "youtu.be" || host.ends_with(".youtu.be") {
        if let Some(seg) = u.path_segments().and_then(|mut s| s.next()) {
            let seg = seg.trim();
            if !seg.is_empty() {
                return Some(seg.to_string());
            }
        }
    }

    let mut segs = u.path_segments()?;
    let a = segs.next().unwrap_or("");
    let b = segs.next().unwrap_or("");

    // youtube.com/live/<id>
    if a == "live" && !b.trim().is_empty() {
        return Some(b.to_string());
    }

    // youtube.com/watch?v=<id> — `v` may not be the first parameter.
    if a == "watch" {
        for (k, v) in u.query_pairs() {
            if k == "v" {
                let v = v.trim().to_string();
                if !v.is_empty() {
                    return Some(v);
                }
            }
        }
    }

    // youtube.com/embed/<id>, youtube.com/shorts/<id>
    if (a == "embed" || a == "shorts") && !b.trim().is_empty() {
        return Some(b.to_string());
    }

    None
}

impl VideoId {
    /// Extract a video id from a URL or bare id. Returns `None` on anything
    /// that does not yield a valid 11-character id; never panics.
    pub fn parse(raw: &str) -> Option<VideoId> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        // Idempotent fast path: already a valid bare id.
        if is_valid_id(raw) {
            return Some(VideoId(raw.to_string()));
        }

        // Accept scheme-less URLs the way people paste them.
        let candidate_url = if raw.contains("://") {
            raw.to_string()
        } else if raw.contains("youtube.com") || raw.contains("youtu.be") {
            format!("https://{raw}")
        } else {
            return None;
        };

        let u = url::Url::parse(&candidate_url).ok()?;
        let id = id_from_url(&u)?;
        // Path-segment ids can drag query-ish tails along on malformed URLs.
        let id = id.split(['&', '?']).next().unwrap_or("").to_string();
        if is_valid_id(&id) {
            Some(VideoId(id))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested caption language: the `auto` sentinel (prefer the video's own
/// language) or a concrete BCP-47-ish tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageRequest {
    Auto,
    Tag(String),
}

fn is_valid_language_tag(s: &str) -> bool {
    let mut subtags = s.split('-');
    let Some(primary) = subtags.next() else {
        return false;
    };
    if !(2..=3).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    subtags.all(|t| (1..=8).contains(&t.len()) && t.chars().all(|c| c.is_ascii_alphanumeric()))
}

impl LanguageRequest {
    /// Accepts `auto` (case-insensitive) or a BCP-47-ish tag. Deliberately
    /// wider than the original 2-letter rule so `pt-BR` and `zh-Hans` pass.
    pub fn parse(raw: &str) -> Result<LanguageRequest> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidInput("empty language".to_string()));
        }
        if raw.eq_ignore_ascii_case("auto") {
            return Ok(LanguageRequest::Auto);
        }
        if is_valid_language_tag(raw) {
            Ok(LanguageRequest::Tag(raw.to_string()))
        } else {
            Err(Error::InvalidInput(format!(
                "invalid language tag: {raw} (use a BCP-47 tag like 'en' or 'pt-BR', or 'auto')"
            )))
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, LanguageRequest::Auto)
    }
}

impl fmt::Display for LanguageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageRequest::Auto => f.write_str("auto"),
            LanguageRequest::Tag(t) => f.write_str(t),
        }
    }
}

/// Expand a requested language into the ordered list of codes worth trying
/// against the structured source before giving up on it.
///
/// Russian gets the historically bundled near-equivalents; anything that is
/// not English or Russian falls back to English variants last.
pub fn language_fallbacks(tag: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !s.is_empty() && !out.iter().any(|x| x == s) {
            out.push(s.to_string());
        }
    };

    let primary = tag.split('-').next().unwrap_or(tag);
    if primary.eq_ignore_ascii_case("ru") {
        for c in ["ru", "ru-RU", "ru-UA", "be", "uk", "kk"] {
            push(c);
        }
        return out;
    }

    push(tag);
    push(primary);
    if !primary.eq_ignore_ascii_case("en") {
        for c in ["en", "en-US", "en-GB"] {
            push(c);
        }
    }
    out
}

/// One available caption track for a video, as reported by the structured
/// source. Read-only; lives for a single resolution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_code: String,
    pub language_name: String,
    pub auto_generated: bool,
    pub translatable: bool,
    /// Source-internal handle for fetching the cue list.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationLanguage {
    pub code: String,
    pub name: String,
}

/// Everything the structured source reports about a video's captions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackList {
    pub video_id: String,
    pub tracks: Vec<CaptionTrack>,
    /// The video's declared default caption language, when reported.
    pub default_language: Option<String>,
    /// Translation targets supported by the translatable tracks.
    pub translation_languages: Vec<TranslationLanguage>,
}

impl TrackList {
    fn find(&self, codes: &[String], auto_generated: bool) -> Option<&CaptionTrack> {
        codes.iter().find_map(|code| {
            self.tracks
                .iter()
                .find(|t| t.auto_generated == auto_generated && t.language_code == *code)
        })
    }

    /// First manually authored track matching any of `codes`, in code order.
    pub fn find_manual(&self, codes: &[String]) -> Option<&CaptionTrack> {
        self.find(codes, false)
    }

    /// First auto-generated track matching any of `codes`, in code order.
    pub fn find_generated(&self, codes: &[String]) -> Option<&CaptionTrack> {
        self.find(codes, true)
    }

    pub fn first_translatable(&self) -> Option<&CaptionTrack> {
        self.tracks.iter().find(|t| t.translatable)
    }

    pub fn supports_translation_to(&self, code: &str) -> bool {
        self.translation_languages.iter().any(|t| t.code == code)
    }
}

/// One timed caption cue from the structured source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub text: String,
    /// Seconds from video start.
    pub start: f64,
    pub duration: f64,
}

/// Successful resolution output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    /// The language actually obtained; may differ from the request and is
    /// suffixed with " (auto-generated)" for machine-transcribed tracks.
    pub language: String,
    pub auto_generated: bool,
}

pub const STRATEGY_STRUCTURED: &str = "source_a_structured";
pub const STRATEGY_TRANSLATED: &str = "source_a_translated";
pub const STRATEGY_SCRAPER: &str = "source_b_scraper";

pub const NOT_ATTEMPTED: &str = "Not attempted";

/// Per-strategy outcome record, built only when every strategy failed.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionFailure {
    pub video_id: String,
    pub language: String,
    pub attempts: BTreeMap<&'static str, String>,
}

impl ResolutionFailure {
    pub fn new(video_id: &VideoId, language: &LanguageRequest) -> Self {
        let mut attempts = BTreeMap::new();
        for k in [STRATEGY_STRUCTURED, STRATEGY_TRANSLATED, STRATEGY_SCRAPER] {
            attempts.insert(k, NOT_ATTEMPTED.to_string());
        }
        Self {
            video_id: video_id.to_string(),
            language: language.to_string(),
            attempts,
        }
    }

    pub fn record(&mut self, strategy: &'static str, message: impl Into<String>) {
        self.attempts.insert(strategy, message.into());
    }

    /// Single human-readable diagnostic covering every strategy family.
    pub fn to_message(&self) -> String {
        let detail = self
            .attempts
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        format!(
            "no subtitles found for video {} (language {}): {detail}",
            self.video_id, self.language
        )
    }
}

/// Either output of a resolution; errors are values by the time they reach
/// the caller.
#[derive(Debug, Clone)]
pub enum Resolution {
    Success(TranscriptResult),
    Failure(ResolutionFailure),
}

/// Structured caption API ("Source A"): enumerates tracks and fetches cue
/// lists, optionally server-side translated.
#[async_trait::async_trait]
pub trait CaptionSource: Send + Sync {
    async fn list_tracks(&self, video_id: &VideoId) -> Result<TrackList>;
    async fn fetch_track(&self, video_id: &VideoId, track: &CaptionTrack) -> Result<Vec<Cue>>;
    async fn translate_track(
        &self,
        video_id: &VideoId,
        track: &CaptionTrack,
        target: &str,
    ) -> Result<Vec<Cue>>;
}

/// Generic extractor ("Source B"): downloads a WebVTT subtitle file for the
/// video in the requested language and returns its content.
#[async_trait::async_trait]
pub trait CaptionScraper: Send + Sync {
    async fn fetch_vtt(&self, video_id: &VideoId, lang: &str) -> Result<String>;
}
