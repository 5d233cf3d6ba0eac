use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use captionpipe_core::{Error, LanguageRequest, Resolution, ResolutionFailure, VideoId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::AppState;

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<BTreeMap<&'static str, String>>,
}

fn error_response(
    code: StatusCode,
    error: &'static str,
    message: impl Into<String>,
    details: Option<BTreeMap<&'static str, String>>,
) -> Response {
    let body = ErrorBody {
        status: "error",
        error,
        message: message.into(),
        details,
    };
    (code, Json(body)).into_response()
}

/// Map a source/resolver error to a response. Video-state errors carry their
/// specific reason; anything unexpected is logged and answered generically
/// so internals never leak to clients.
fn map_error(e: &Error) -> Response {
    match e {
        Error::InvalidInput(msg) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_request", msg.clone(), None)
        }
        Error::VideoUnavailable(_) => error_response(
            StatusCode::NOT_FOUND,
            "video_unavailable",
            e.to_string(),
            None,
        ),
        Error::VideoPrivate(_) => {
            error_response(StatusCode::NOT_FOUND, "video_private", e.to_string(), None)
        }
        Error::CaptionsDisabled(_) => error_response(
            StatusCode::NOT_FOUND,
            "subtitles_disabled",
            e.to_string(),
            None,
        ),
        Error::NoCaptions(msg) => {
            error_response(StatusCode::NOT_FOUND, "no_subtitles", msg.clone(), None)
        }
        other => {
            log::error!("internal error: {other}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error while retrieving captions",
                None,
            )
        }
    }
}

fn failure_response(f: &ResolutionFailure) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "no_subtitles",
        f.to_message(),
        Some(f.attempts.clone()),
    )
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct TranscriptQuery {
    pub url: String,
    pub language: Option<String>,
    #[serde(default)]
    pub auto_generated: bool,
}

#[derive(Debug, Serialize)]
struct TranscriptResponse {
    status: &'static str,
    video_id: String,
    language: String,
    auto_generated: bool,
    transcript: String,
    timestamp: String,
}

pub async fn transcript(
    State(state): State<AppState>,
    Query(q): Query<TranscriptQuery>,
) -> Response {
    let Some(video_id) = VideoId::parse(&q.url) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_url",
            format!("not a YouTube URL or video id: {}", q.url),
            None,
        );
    };

    let raw_language = q.language.as_deref().unwrap_or(&state.default_language);
    let language = match LanguageRequest::parse(raw_language) {
        Ok(l) => l,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_language", e.to_string(), None)
        }
    };

    let started = Instant::now();
    let resolved = state
        .resolver
        .resolve(&video_id, &language, q.auto_generated)
        .await;
    log::info!(
        "transcript request for {video_id} (language {language}) took {}ms",
        started.elapsed().as_millis()
    );

    match resolved {
        Ok(Resolution::Success(t)) => Json(TranscriptResponse {
            status: "success",
            video_id: video_id.to_string(),
            language: t.language,
            auto_generated: t.auto_generated,
            transcript: t.text,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
        .into_response(),
        Ok(Resolution::Failure(f)) => failure_response(&f),
        Err(e) => map_error(&e),
    }
}

#[derive(Debug, Serialize)]
struct LanguageEntry {
    code: String,
    name: String,
    auto_generated: bool,
    translatable: bool,
}

#[derive(Debug, Serialize)]
struct LanguagesResponse {
    status: &'static str,
    video_id: String,
    languages: Vec<LanguageEntry>,
}

pub async fn languages(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let Some(video_id) = VideoId::parse(&raw_id) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_video_id",
            format!("not a valid video id: {raw_id}"),
            None,
        );
    };

    match state.source.list_tracks(&video_id).await {
        Ok(list) => Json(LanguagesResponse {
            status: "success",
            video_id: video_id.to_string(),
            languages: list
                .tracks
                .into_iter()
                .map(|t| LanguageEntry {
                    code: t.language_code,
                    name: t.language_name,
                    auto_generated: t.auto_generated,
                    translatable: t.translatable,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => map_error(&e),
    }
}
