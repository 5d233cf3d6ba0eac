//! Structured caption client (Source A) over YouTube's InnerTube API.
//!
//! Flow: fetch the watch page, pull `INNERTUBE_API_KEY` out of it, POST the
//! player endpoint with an ANDROID client context, then read the caption
//! track list out of `playerCaptionsTracklistRenderer`. Cue lists come from
//! each track's timedtext URL; server-side translation is a `tlang` query
//! parameter on the same URL.
//!
//! Upstream failure texts are classified into error kinds here, once, so the
//! resolver and HTTP layer only ever match on enum variants.

use captionpipe_core::{
    CaptionSource, CaptionTrack, Cue, Error, Result, TrackList, TranslationLanguage, VideoId,
};
use std::time::Duration;

use crate::{env, timeout_from_env_ms};

#[derive(Debug, Clone)]
pub struct InnertubeSource {
    client: reqwest::Client,
}

fn watch_base() -> String {
    env("CAPTIONPIPE_WATCH_ENDPOINT").unwrap_or_else(|| "https://www.youtube.com".to_string())
}

fn player_base() -> String {
    env("CAPTIONPIPE_INNERTUBE_ENDPOINT").unwrap_or_else(|| "https://www.youtube.com".to_string())
}

fn call_timeout() -> Duration {
    timeout_from_env_ms("CAPTIONPIPE_SOURCE_A_TIMEOUT_MS", 15_000)
}

impl InnertubeSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_text(&self, url: &str, video_id: &VideoId) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(call_timeout())
            .send()
            .await
            .map_err(|e| Error::Source(format!("request failed: {e}")))?;
        check_http_status(&resp, video_id)?;
        resp.text()
            .await
            .map_err(|e| Error::Source(format!("body read failed: {e}")))
    }

    async fn fetch_watch_html(&self, video_id: &VideoId) -> Result<String> {
        let url = format!("{}/watch?v={}", watch_base(), video_id);
        self.get_text(&url, video_id).await
    }

    async fn fetch_player(&self, video_id: &VideoId, api_key: &str) -> Result<serde_json::Value> {
        let url = format!("{}/youtubei/v1/player?key={api_key}", player_base());
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": "ANDROID",
                    "clientVersion": "20.10.38"
                }
            },
            "videoId": video_id.as_str()
        });
        let resp = self
            .client
            .post(&url)
            .timeout(call_timeout())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Source(format!("player request failed: {e}")))?;
        check_http_status(&resp, video_id)?;
        resp.json()
            .await
            .map_err(|e| Error::Source(format!("player response unparsable: {e}")))
    }
}

fn check_http_status(resp: &reqwest::Response, video_id: &VideoId) -> Result<()> {
    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::Blocked(format!("HTTP 429 for video {video_id}")));
    }
    if !resp.status().is_success() {
        return Err(Error::Source(format!(
            "HTTP {} for video {video_id}",
            resp.status()
        )));
    }
    Ok(())
}

/// Pull the InnerTube API key out of watch-page HTML.
pub(crate) fn extract_api_key(html: &str, video_id: &VideoId) -> Result<String> {
    // Captcha interstitial means the IP is flagged; no key will be present.
    if html.contains("g-recaptcha") {
        return Err(Error::Blocked(format!(
            "captcha challenge served for video {video_id}"
        )));
    }
    let marker = "\"INNERTUBE_API_KEY\":\"";
    let start = html
        .find(marker)
        .ok_or_else(|| Error::Source(format!("no API key in watch page for {video_id}")))?
        + marker.len();
    let rest = &html[start..];
    let end = rest
        .find('"')
        .ok_or_else(|| Error::Source(format!("truncated API key for {video_id}")))?;
    let key = &rest[..end];
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(Error::Source(format!("malformed API key for {video_id}")));
    }
    Ok(key.to_string())
}

/// Map `playabilityStatus` to an error kind. This is the single place the
/// known upstream status/reason strings are interpreted.
pub(crate) fn classify_playability(video_id: &VideoId, player: &serde_json::Value) -> Result<()> {
    let Some(ps) = player.get("playabilityStatus") else {
        return Ok(());
    };
    let status = ps.get("status").and_then(|s| s.as_str()).unwrap_or("");
    if status.is_empty() || status == "OK" {
        return Ok(());
    }
    let reason = ps
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match status {
        "LOGIN_REQUIRED" => {
            if reason.contains("not a bot") {
                Err(Error::Blocked(format!(
                    "sign-in challenge for video {video_id}"
                )))
            } else {
                Err(Error::VideoPrivate(video_id.to_string()))
            }
        }
        "ERROR" if reason.contains("unavailable") || reason.contains("removed") => {
            Err(Error::VideoUnavailable(video_id.to_string()))
        }
        "UNPLAYABLE" if reason.contains("members") || reason.contains("private") => {
            Err(Error::VideoPrivate(video_id.to_string()))
        }
        _ => Err(Error::Source(format!(
            "video {video_id} not playable ({status}: {reason})"
        ))),
    }
}

fn runs_text(v: &serde_json::Value) -> Option<String> {
    // {"runs":[{"text":"English"}]} or {"simpleText":"English"}
    if let Some(s) = v.get("simpleText").and_then(|s| s.as_str()) {
        return Some(s.to_string());
    }
    v.get("runs")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Parse the caption renderer out of a player response.
pub(crate) fn parse_track_list(
    video_id: &VideoId,
    player: &serde_json::Value,
) -> Result<TrackList> {
    classify_playability(video_id, player)?;

    let renderer = player
        .get("captions")
        .and_then(|c| c.get("playerCaptionsTracklistRenderer"))
        .ok_or_else(|| Error::CaptionsDisabled(video_id.to_string()))?;

    let translation_languages: Vec<TranslationLanguage> = renderer
        .get("translationLanguages")
        .and_then(|tl| tl.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|l| {
                    Some(TranslationLanguage {
                        code: l.get("languageCode")?.as_str()?.to_string(),
                        name: runs_text(l.get("languageName")?)?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut tracks: Vec<CaptionTrack> = Vec::new();
    if let Some(raw_tracks) = renderer.get("captionTracks").and_then(|t| t.as_array()) {
        for t in raw_tracks {
            let Some(language_code) = t.get("languageCode").and_then(|l| l.as_str()) else {
                continue;
            };
            let Some(base_url) = t.get("baseUrl").and_then(|u| u.as_str()) else {
                continue;
            };
            let language_name = t
                .get("name")
                .and_then(runs_text)
                .unwrap_or_else(|| language_code.to_string());
            let auto_generated = t
                .get("kind")
                .and_then(|k| k.as_str())
                .map(|k| k == "asr")
                .unwrap_or(false);
            let translatable = t
                .get("isTranslatable")
                .and_then(|b| b.as_bool())
                .unwrap_or(false);
            tracks.push(CaptionTrack {
                language_code: language_code.to_string(),
                language_name,
                auto_generated,
                translatable,
                // srv3 is the XML-with-styling variant; plain timedtext is
                // what the cue parser expects.
                base_url: base_url.replace("&fmt=srv3", ""),
            });
        }
    }

    if tracks.is_empty() {
        return Err(Error::CaptionsDisabled(video_id.to_string()));
    }

    // The default audio track points at the video's own caption language.
    let default_language = renderer
        .get("audioTracks")
        .and_then(|a| a.as_array())
        .and_then(|arr| arr.first())
        .and_then(|a| a.get("defaultCaptionTrackIndex"))
        .and_then(|i| i.as_u64())
        .and_then(|i| tracks.get(i as usize))
        .map(|t| t.language_code.clone());

    Ok(TrackList {
        video_id: video_id.to_string(),
        tracks,
        default_language,
        translation_languages,
    })
}

fn decode_entities(s: &str) -> String {
    // Timedtext bodies use a small, fixed set of entities.
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

/// Parse timedtext XML (`<text start="1.2" dur="3.4">...</text>`) into cues.
pub(crate) fn parse_timedtext(xml: &str) -> Vec<Cue> {
    fn attr_f64(tag: &str, name: &str) -> f64 {
        let marker = format!("{name}=\"");
        let Some(i) = tag.find(&marker) else {
            return 0.0;
        };
        let rest = &tag[i + marker.len()..];
        let Some(j) = rest.find('"') else { return 0.0 };
        rest[..j].parse::<f64>().unwrap_or(0.0)
    }

    let mut cues = Vec::new();
    let mut rest = xml;
    while let Some(open) = rest.find("<text") {
        rest = &rest[open..];
        let Some(tag_end) = rest.find('>') else { break };
        let tag = &rest[..tag_end];
        let body_start = tag_end + 1;
        // Self-closing cues carry no text.
        if tag.ends_with('/') {
            rest = &rest[body_start..];
            continue;
        }
        let Some(close) = rest[body_start..].find("</text>") else {
            break;
        };
        let body = &rest[body_start..body_start + close];
        let text = decode_entities(body).trim().to_string();
        if !text.is_empty() {
            cues.push(Cue {
                text,
                start: attr_f64(tag, "start"),
                duration: attr_f64(tag, "dur"),
            });
        }
        rest = &rest[body_start + close + "</text>".len()..];
    }
    cues
}

#[async_trait::async_trait]
impl CaptionSource for InnertubeSource {
    async fn list_tracks(&self, video_id: &VideoId) -> Result<TrackList> {
        let html = self.fetch_watch_html(video_id).await?;
        let api_key = extract_api_key(&html, video_id)?;
        let player = self.fetch_player(video_id, &api_key).await?;
        let list = parse_track_list(video_id, &player)?;
        log::debug!(
            "listed {} caption tracks for {video_id} (default language {:?})",
            list.tracks.len(),
            list.default_language
        );
        Ok(list)
    }

    async fn fetch_track(&self, video_id: &VideoId, track: &CaptionTrack) -> Result<Vec<Cue>> {
        let xml = self.get_text(&track.base_url, video_id).await?;
        let cues = parse_timedtext(&xml);
        if cues.is_empty() {
            return Err(Error::NoCaptions(format!(
                "empty cue list for {video_id} track {}",
                track.language_code
            )));
        }
        Ok(cues)
    }

    async fn translate_track(
        &self,
        video_id: &VideoId,
        track: &CaptionTrack,
        target: &str,
    ) -> Result<Vec<Cue>> {
        if !track.translatable {
            return Err(Error::NoCaptions(format!(
                "track {} for {video_id} is not translatable",
                track.language_code
            )));
        }
        let url = format!("{}&tlang={target}", track.base_url);
        let xml = self.get_text(&url, video_id).await?;
        let cues = parse_timedtext(&xml);
        if cues.is_empty() {
            return Err(Error::NoCaptions(format!(
                "empty translated cue list for {video_id} target {target}"
            )));
        }
        Ok(cues)
    }
}
