//! The caption-resolution fallback chain.
//!
//! Strategies run in a fixed order and stop at the first success:
//!
//! 1. native-language probe (only for `auto` requests)
//! 2. structured manual track over the expanded language list
//! 3. structured auto-generated track over the same list
//! 4. server-side translation of a translatable track
//! 5. scraper fallback (requested language, then English)
//!
//! Every strategy failure becomes a recorded value, never control flow; only
//! terminal video-state errors (unavailable / private / captions disabled)
//! abort the chain early, because no other source can fix those.

use captionpipe_core::{
    language_fallbacks, CaptionScraper, CaptionSource, CaptionTrack, Error, LanguageRequest,
    Resolution, ResolutionFailure, Result, TranscriptResult, TrackList, VideoId,
    STRATEGY_SCRAPER, STRATEGY_STRUCTURED, STRATEGY_TRANSLATED,
};
use std::sync::Arc;

use crate::vtt;

pub struct CaptionResolver {
    source: Arc<dyn CaptionSource>,
    scraper: Arc<dyn CaptionScraper>,
    default_language: String,
    max_chars: usize,
}

impl CaptionResolver {
    pub fn new(source: Arc<dyn CaptionSource>, scraper: Arc<dyn CaptionScraper>) -> Self {
        Self {
            source,
            scraper,
            default_language: "ru".to_string(),
            max_chars: crate::max_chars_from_env(),
        }
    }

    /// Language assumed when the request is `auto` and the video does not
    /// declare one.
    pub fn with_default_language(mut self, lang: impl Into<String>) -> Self {
        self.default_language = lang.into();
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn requested_tag<'a>(&'a self, language: &'a LanguageRequest) -> &'a str {
        match language {
            LanguageRequest::Auto => &self.default_language,
            LanguageRequest::Tag(t) => t,
        }
    }

    fn success(&self, raw: &str, language: String, auto_generated: bool) -> Resolution {
        let cleaned = vtt::normalize(raw);
        // Cleaning failure is non-fatal: an empty result falls back to the
        // raw text rather than reporting a missing transcript.
        let text = if cleaned.is_empty() {
            raw.trim().to_string()
        } else {
            cleaned
        };
        let language = if auto_generated {
            format!("{language} (auto-generated)")
        } else {
            language
        };
        Resolution::Success(TranscriptResult {
            text: vtt::clip(&text, self.max_chars),
            language,
            auto_generated,
        })
    }

    async fn try_track(
        &self,
        video_id: &VideoId,
        track: &CaptionTrack,
        errors: &mut Vec<String>,
    ) -> Result<Option<Resolution>> {
        match self.source.fetch_track(video_id, track).await {
            Ok(cues) => {
                let text = vtt::cues_to_text(&cues);
                Ok(Some(self.success(
                    &text,
                    track.language_code.clone(),
                    track.auto_generated,
                )))
            }
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                log::info!("track {} failed for {video_id}: {e}", track.language_code);
                errors.push(format!("{} track: {e}", track.language_code));
                Ok(None)
            }
        }
    }

    /// Structured lookup over the track list: manual first (unless the
    /// caller prefers auto-generated captions), then auto-generated.
    async fn try_structured(
        &self,
        video_id: &VideoId,
        list: &TrackList,
        codes: &[String],
        prefer_auto_generated: bool,
        errors: &mut Vec<String>,
    ) -> Result<Option<Resolution>> {
        if !prefer_auto_generated {
            if let Some(track) = list.find_manual(codes) {
                if let Some(r) = self.try_track(video_id, track, errors).await? {
                    return Ok(Some(r));
                }
            } else {
                errors.push(format!("no manual track in [{}]", codes.join(", ")));
            }
        }
        if let Some(track) = list.find_generated(codes) {
            if let Some(r) = self.try_track(video_id, track, errors).await? {
                return Ok(Some(r));
            }
        } else {
            errors.push(format!("no auto-generated track in [{}]", codes.join(", ")));
        }
        Ok(None)
    }

    async fn try_translation(
        &self,
        video_id: &VideoId,
        list: &TrackList,
        target: &str,
        failure: &mut ResolutionFailure,
    ) -> Result<Option<Resolution>> {
        let Some(track) = list.first_translatable() else {
            return Ok(None);
        };
        if track.language_code == target || !list.supports_translation_to(target) {
            return Ok(None);
        }
        match self.source.translate_track(video_id, track, target).await {
            Ok(cues) => {
                let text = vtt::cues_to_text(&cues);
                // Server-side translations are machine output regardless of
                // the source track's origin.
                Ok(Some(self.success(&text, target.to_string(), true)))
            }
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                log::info!("translation to {target} failed for {video_id}: {e}");
                record_attempt(failure, STRATEGY_TRANSLATED, &e);
                Ok(None)
            }
        }
    }

    async fn try_scraper(
        &self,
        video_id: &VideoId,
        requested: &str,
        failure: &mut ResolutionFailure,
    ) -> Result<Option<Resolution>> {
        let mut langs = vec![requested.to_string()];
        if requested != "en" {
            langs.push("en".to_string());
        }
        let mut errors: Vec<String> = Vec::new();
        let mut attempted = false;
        for lang in &langs {
            match self.scraper.fetch_vtt(video_id, lang).await {
                Ok(raw_vtt) => {
                    // The scraper cannot tell manual from auto-generated
                    // subtitles apart; report the plain language code.
                    return Ok(Some(self.success(&raw_vtt, lang.clone(), false)));
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(Error::NotConfigured(msg)) => {
                    log::warn!("scraper unavailable: {msg}");
                    // Tool missing: leave the entry as "Not attempted".
                    return Ok(None);
                }
                Err(e) => {
                    log::info!("scraper failed for {video_id} lang {lang}: {e}");
                    errors.push(format!("{lang}: {e}"));
                    attempted = true;
                }
            }
        }
        if attempted {
            failure.record(STRATEGY_SCRAPER, errors.join("; "));
        }
        Ok(None)
    }

    /// Resolve a transcript for one video.
    ///
    /// `Ok(Resolution)` carries either the transcript or the per-strategy
    /// failure report; `Err` is reserved for terminal video-state errors.
    pub async fn resolve(
        &self,
        video_id: &VideoId,
        language: &LanguageRequest,
        prefer_auto_generated: bool,
    ) -> Result<Resolution> {
        log::info!(
            "resolving transcript for {video_id} (language {language}, prefer_auto_generated {prefer_auto_generated})"
        );
        let mut failure = ResolutionFailure::new(video_id, language);
        let mut structured_errors: Vec<String> = Vec::new();

        let track_list = match self.source.list_tracks(video_id).await {
            Ok(list) => Some(list),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                log::warn!("structured source unavailable for {video_id}: {e}");
                if !matches!(e, Error::NotConfigured(_)) {
                    structured_errors.push(format!("track listing: {e}"));
                }
                None
            }
        };

        if let Some(list) = &track_list {
            // Native-language probe: manual then auto-generated in the
            // video's own language, each attempt independent.
            if language.is_auto() {
                if let Some(native) = list.default_language.clone() {
                    log::info!("native-language probe for {video_id}: {native}");
                    let native_codes = vec![native];
                    if let Some(r) = self
                        .try_structured(video_id, list, &native_codes, false, &mut structured_errors)
                        .await?
                    {
                        return Ok(r);
                    }
                }
            }

            let codes = language_fallbacks(self.requested_tag(language));
            if let Some(r) = self
                .try_structured(
                    video_id,
                    list,
                    &codes,
                    prefer_auto_generated,
                    &mut structured_errors,
                )
                .await?
            {
                return Ok(r);
            }
        }

        if !structured_errors.is_empty() {
            failure.record(STRATEGY_STRUCTURED, structured_errors.join("; "));
        }

        if let Some(list) = &track_list {
            let target = self.requested_tag(language);
            if let Some(r) = self
                .try_translation(video_id, list, target, &mut failure)
                .await?
            {
                return Ok(r);
            }
        }

        let requested = self.requested_tag(language).to_string();
        if let Some(r) = self.try_scraper(video_id, &requested, &mut failure).await? {
            return Ok(r);
        }

        log::warn!("all strategies failed for {video_id}: {}", failure.to_message());
        Ok(Resolution::Failure(failure))
    }
}

fn record_attempt(failure: &mut ResolutionFailure, strategy: &'static str, e: &Error) {
    if !matches!(e, Error::NotConfigured(_)) {
        failure.record(strategy, e.to_string());
    }
}
