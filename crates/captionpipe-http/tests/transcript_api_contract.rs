use captionpipe_core::{
    CaptionScraper, CaptionSource, CaptionTrack, Cue, Error, TrackList, VideoId,
};
use captionpipe_http::{router, AppState};
use captionpipe_local::CaptionResolver;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Canned structured source: either a fixed track list or a fixed error.
struct FixedSource {
    list: Option<TrackList>,
    error: Option<&'static str>,
}

impl FixedSource {
    fn with_manual_track(code: &str) -> Self {
        Self {
            list: Some(TrackList {
                video_id: "dQw4w9WgXcQ".to_string(),
                tracks: vec![CaptionTrack {
                    language_code: code.to_string(),
                    language_name: code.to_string(),
                    auto_generated: false,
                    translatable: false,
                    base_url: String::new(),
                }],
                default_language: None,
                translation_languages: vec![],
            }),
            error: None,
        }
    }

    fn private() -> Self {
        Self {
            list: None,
            error: Some("private"),
        }
    }

    fn empty() -> Self {
        Self {
            list: None,
            error: None,
        }
    }

    fn make_error(&self) -> Error {
        match self.error {
            Some("private") => Error::VideoPrivate("dQw4w9WgXcQ".to_string()),
            _ => Error::Source("listing failed".to_string()),
        }
    }
}

#[async_trait::async_trait]
impl CaptionSource for FixedSource {
    async fn list_tracks(&self, _v: &VideoId) -> captionpipe_core::Result<TrackList> {
        match &self.list {
            Some(l) => Ok(l.clone()),
            None => Err(self.make_error()),
        }
    }
    async fn fetch_track(
        &self,
        _v: &VideoId,
        t: &CaptionTrack,
    ) -> captionpipe_core::Result<Vec<Cue>> {
        Ok(vec![Cue {
            text: format!("transcript in {}", t.language_code),
            start: 0.0,
            duration: 1.0,
        }])
    }
    async fn translate_track(
        &self,
        _v: &VideoId,
        _t: &CaptionTrack,
        target: &str,
    ) -> captionpipe_core::Result<Vec<Cue>> {
        Err(Error::NoCaptions(format!("no translation to {target}")))
    }
}

struct CountingScraper {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl CaptionScraper for CountingScraper {
    async fn fetch_vtt(&self, _v: &VideoId, lang: &str) -> captionpipe_core::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::NoCaptions(format!("nothing for {lang}")))
    }
}

async fn spawn_app(source: FixedSource) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let source: Arc<dyn CaptionSource> = Arc::new(source);
    let scraper: Arc<dyn CaptionScraper> = Arc::new(CountingScraper {
        calls: calls.clone(),
    });
    let state = AppState {
        resolver: Arc::new(CaptionResolver::new(source.clone(), scraper)),
        source,
        default_language: "ru".to_string(),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    (format!("http://{addr}"), calls)
}

#[tokio::test]
async fn transcript_success_shape() {
    let (base, _) = spawn_app(FixedSource::with_manual_track("ru")).await;
    let resp = reqwest::get(format!(
        "{base}/api/transcript?url=https://youtu.be/dQw4w9WgXcQ&language=ru"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["video_id"], "dQw4w9WgXcQ");
    assert_eq!(body["language"], "ru");
    assert_eq!(body["auto_generated"], false);
    assert_eq!(body["transcript"], "transcript in ru");
    assert!(body["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn transcript_accepts_any_recognized_url_shape() {
    let (base, _) = spawn_app(FixedSource::with_manual_track("en")).await;
    for url in [
        "dQw4w9WgXcQ",
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10",
        "https://www.youtube.com/shorts/dQw4w9WgXcQ",
    ] {
        let resp = reqwest::get(format!("{base}/api/transcript?url={url}&language=en"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "failed for {url}");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["video_id"], "dQw4w9WgXcQ");
    }
}

#[tokio::test]
async fn invalid_url_is_400() {
    let (base, _) = spawn_app(FixedSource::empty()).await;
    let resp = reqwest::get(format!("{base}/api/transcript?url=not-a-video"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "invalid_url");
}

#[tokio::test]
async fn invalid_language_is_400_but_regional_tags_pass() {
    let (base, _) = spawn_app(FixedSource::with_manual_track("pt-BR")).await;
    let resp = reqwest::get(format!(
        "{base}/api/transcript?url=dQw4w9WgXcQ&language=english%20please"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_language");

    // The original 2-letter restriction is gone: pt-BR is a valid request.
    let resp = reqwest::get(format!(
        "{base}/api/transcript?url=dQw4w9WgXcQ&language=pt-BR"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn exhausted_strategies_return_no_subtitles_with_details() {
    let (base, _) = spawn_app(FixedSource::empty()).await;
    let resp = reqwest::get(format!(
        "{base}/api/transcript?url=dQw4w9WgXcQ&language=en"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "no_subtitles");
    let details = body["details"].as_object().unwrap();
    assert!(details["source_a_structured"]
        .as_str()
        .unwrap()
        .contains("listing failed"));
    assert_eq!(details["source_a_translated"], "Not attempted");
    assert!(details.contains_key("source_b_scraper"));
}

#[tokio::test]
async fn private_video_short_circuits_and_names_the_reason() {
    let (base, scraper_calls) = spawn_app(FixedSource::private()).await;
    let resp = reqwest::get(format!(
        "{base}/api/transcript?url=dQw4w9WgXcQ&language=en"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "video_private");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("private or requires sign-in"));
    // The terminal classification must stop the chain before Source B.
    assert_eq!(scraper_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn omitted_language_uses_configured_default() {
    // Default language is ru; the only track is uk, which is inside the
    // Russian fallback set, so resolution succeeds without a language param.
    let (base, _) = spawn_app(FixedSource::with_manual_track("uk")).await;
    let resp = reqwest::get(format!("{base}/api/transcript?url=dQw4w9WgXcQ"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["language"], "uk");
}
