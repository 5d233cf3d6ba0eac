//! Subtitle scraper (Source B) shelling out to `yt-dlp`.
//!
//! Bounded and scoped: the subprocess gets a coarse kill-on-timeout wait
//! loop with stderr drained on a separate thread, and all subtitle files
//! land in a `TempDir` that is removed on every exit path, success or not.

use captionpipe_core::{CaptionScraper, Error, Result, VideoId};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::{env, timeout_from_env_ms};

#[derive(Debug, Clone)]
pub struct YtDlpScraper {
    bin: String,
}

impl Default for YtDlpScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpScraper {
    pub fn new() -> Self {
        Self {
            bin: env("CAPTIONPIPE_YTDLP_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
        }
    }

    pub fn with_bin(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

fn which(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return p.is_file().then_some(p);
    }
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
    }
    None
}

/// Pick the downloaded subtitle file: exact `<id>.<lang>.vtt` first, then
/// any `.vtt` yt-dlp decided to write.
pub(crate) fn pick_vtt_file(dir: &Path, video_id: &VideoId, lang: &str) -> Option<PathBuf> {
    let exact = dir.join(format!("{video_id}.{lang}.vtt"));
    if exact.is_file() {
        return Some(exact);
    }
    let mut fallback: Option<PathBuf> = None;
    if let Ok(rd) = std::fs::read_dir(dir) {
        for ent in rd.flatten() {
            let p = ent.path();
            if p.extension().and_then(|s| s.to_str()) == Some("vtt") {
                match &fallback {
                    Some(prev) if prev <= &p => {}
                    _ => fallback = Some(p),
                }
            }
        }
    }
    fallback
}

/// Drain a stderr pipe to EOF, keeping only the last non-empty line of the
/// final 4 KiB. Draining must keep pace with the child: a full pipe buffer
/// blocks the child's writes and it would never exit.
fn read_tail(mut s: impl std::io::Read) -> String {
    let mut chunk = [0u8; 4096];
    let mut tail: Vec<u8> = Vec::new();
    while let Ok(n) = s.read(&mut chunk) {
        if n == 0 {
            break;
        }
        tail.extend_from_slice(&chunk[..n]);
        if tail.len() > 4096 {
            tail.drain(..tail.len() - 4096);
        }
    }
    let text = String::from_utf8_lossy(&tail);
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn join_tail(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn fetch_vtt_blocking(bin: &str, video_id: &VideoId, lang: &str, timeout: Duration) -> Result<String> {
    if which(bin).is_none() {
        return Err(Error::NotConfigured(format!("{bin} not found on PATH")));
    }

    // TempDir removal on drop covers every exit path below.
    let tmpdir = tempfile::tempdir()
        .map_err(|e| Error::Source(format!("could not create temp dir: {e}")))?;
    let out_tmpl = tmpdir.path().join("%(id)s.%(ext)s");

    let mut cmd = Command::new(bin);
    cmd.arg("--skip-download")
        .arg("--write-sub")
        .arg("--write-auto-sub")
        .arg("--sub-lang")
        .arg(lang)
        .arg("--sub-format")
        .arg("vtt")
        .arg("-o")
        .arg(out_tmpl.as_os_str())
        .arg("--no-warnings")
        .arg(video_id.watch_url())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotConfigured(format!("{bin} not found on PATH"))
        } else {
            Error::Source(format!("{bin} spawn failed: {e}"))
        }
    })?;

    let stderr_reader = child
        .stderr
        .take()
        .map(|s| std::thread::spawn(move || read_tail(s)));

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Err(e) => return Err(Error::Source(format!("{bin} wait failed: {e}"))),
            Ok(Some(status)) => {
                let tail = join_tail(stderr_reader);
                if !status.success() {
                    return Err(Error::Source(format!(
                        "{bin} exited with {status}: {tail}"
                    )));
                }
                break;
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = join_tail(stderr_reader);
                    return Err(Error::Source(format!(
                        "{bin} timed out after {}ms",
                        timeout.as_millis()
                    )));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    let Some(path) = pick_vtt_file(tmpdir.path(), video_id, lang) else {
        return Err(Error::NoCaptions(format!(
            "no subtitle file produced for {video_id} lang {lang}"
        )));
    };
    std::fs::read_to_string(&path)
        .map_err(|e| Error::Source(format!("could not read subtitle file: {e}")))
}

#[async_trait::async_trait]
impl CaptionScraper for YtDlpScraper {
    async fn fetch_vtt(&self, video_id: &VideoId, lang: &str) -> Result<String> {
        let bin = self.bin.clone();
        let video_id = video_id.clone();
        let lang = lang.to_string();
        let timeout = timeout_from_env_ms("CAPTIONPIPE_YTDLP_TIMEOUT_MS", 60_000);
        log::debug!("scraping subtitles for {video_id} lang {lang} via {bin}");
        tokio::task::spawn_blocking(move || fetch_vtt_blocking(&bin, &video_id, &lang, timeout))
            .await
            .map_err(|e| Error::Source(format!("scraper task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vid() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    #[test]
    fn pick_vtt_prefers_exact_language_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.en.vtt"), "en").unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.ru.vtt"), "ru").unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.info.json"), "{}").unwrap();

        let picked = pick_vtt_file(dir.path(), &vid(), "ru").unwrap();
        assert!(picked.ends_with("dQw4w9WgXcQ.ru.vtt"));
    }

    #[test]
    fn pick_vtt_falls_back_to_any_vtt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.en.vtt"), "en").unwrap();

        let picked = pick_vtt_file(dir.path(), &vid(), "ru").unwrap();
        assert!(picked.ends_with("dQw4w9WgXcQ.en.vtt"));
        assert!(pick_vtt_file(dir.path(), &vid(), "ru").is_some());

        let empty = tempfile::tempdir().unwrap();
        assert!(pick_vtt_file(empty.path(), &vid(), "ru").is_none());
    }

    #[tokio::test]
    async fn missing_binary_reports_not_configured() {
        let scraper = YtDlpScraper::with_bin("definitely-not-a-real-tool-xyz");
        let err = scraper.fetch_vtt(&vid(), "en").await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }

    // Stand-in for the real tool: a shell script that sees the exact argv the
    // scraper builds and records the work directory it was pointed at.
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_run_returns_vtt_and_removes_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("workdir");
        let script = format!(
            "#!/bin/sh\n\
             out=\"\"\n\
             while [ $# -gt 1 ]; do\n\
               if [ \"$1\" = \"-o\" ]; then out=\"$2\"; fi\n\
               shift\n\
             done\n\
             work=$(dirname \"$out\")\n\
             printf 'WEBVTT\\n\\nhello from fixture\\n' > \"$work/dQw4w9WgXcQ.en.vtt\"\n\
             echo \"$work\" > \"{record}\"\n\
             exit 0\n",
            record = record.display()
        );
        let bin = fake_ytdlp(dir.path(), &script);

        let scraper = YtDlpScraper::with_bin(bin.to_string_lossy());
        let vtt = scraper.fetch_vtt(&vid(), "en").await.unwrap();
        assert!(vtt.contains("hello from fixture"));

        let work = std::fs::read_to_string(&record).unwrap();
        let work = Path::new(work.trim());
        assert!(work.is_absolute());
        assert!(!work.exists(), "work dir {} survived", work.display());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_run_reports_stderr_and_removes_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("workdir");
        let script = format!(
            "#!/bin/sh\n\
             while [ $# -gt 1 ]; do\n\
               if [ \"$1\" = \"-o\" ]; then dirname \"$2\" > \"{record}\"; fi\n\
               shift\n\
             done\n\
             echo \"simulated failure\" >&2\n\
             exit 1\n",
            record = record.display()
        );
        let bin = fake_ytdlp(dir.path(), &script);

        let scraper = YtDlpScraper::with_bin(bin.to_string_lossy());
        let err = scraper.fetch_vtt(&vid(), "en").await.unwrap_err();
        match err {
            Error::Source(msg) => assert!(msg.contains("simulated failure"), "{msg}"),
            other => panic!("expected Source error, got {other}"),
        }

        let work = std::fs::read_to_string(&record).unwrap();
        let work = Path::new(work.trim());
        assert!(!work.exists(), "work dir {} survived", work.display());
    }

    #[cfg(unix)]
    #[test]
    fn noisy_stderr_does_not_stall_the_wait_loop() {
        // Well past the pipe buffer; without a concurrent drain the child
        // blocks on write and only the timeout would reap it.
        let dir = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\n\
                      i=0\n\
                      while [ $i -lt 9000 ]; do\n\
                        echo \"stderr noise line $i\" >&2\n\
                        i=$((i+1))\n\
                      done\n\
                      echo \"boom\" >&2\n\
                      exit 1\n";
        let bin = fake_ytdlp(dir.path(), script);

        let err = fetch_vtt_blocking(
            &bin.to_string_lossy(),
            &vid(),
            "en",
            Duration::from_secs(30),
        )
        .unwrap_err();
        match err {
            Error::Source(msg) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("expected Source error, got {other}"),
        }
    }
}
