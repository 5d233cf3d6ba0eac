//! Local implementations of the captionpipe sources plus the resolver.
//!
//! - `innertube`: structured caption API client (Source A).
//! - `ytdlp`: subtitle scraper shelling out to `yt-dlp` (Source B).
//! - `vtt`: deterministic caption-text normalization.
//! - `resolver`: the ordered fallback chain over both sources.

use std::time::Duration;

pub mod innertube;
pub mod resolver;
pub mod vtt;
pub mod ytdlp;

pub use innertube::InnertubeSource;
pub use resolver::CaptionResolver;
pub use ytdlp::YtDlpScraper;

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Env-configured timeout with sane bounds; external calls can hang
/// indefinitely without one.
pub fn timeout_from_env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default_ms)
        .clamp(50, 300_000);
    Duration::from_millis(ms)
}

/// Env-configured transcript size cap (chars).
pub fn max_chars_from_env() -> usize {
    env_usize("CAPTIONPIPE_MAX_CHARS", 200_000).clamp(200, 2_000_000)
}
