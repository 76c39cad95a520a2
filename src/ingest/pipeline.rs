//! [`IngestPipeline`] — URL in, clip file out, one event per submission.
//!
//! Each submission is an independent tokio task.  Results come back over an
//! unbounded channel that the UI thread drains; tasks never touch the clip
//! store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::library::same_stem_files;

use super::extract::{extract_title, find_media_link, is_placeholder, sanitize_title, UNTITLED};
use super::fetcher::PageFetcher;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("'{0}' is not an http(s) URL")]
    InvalidUrl(String),

    #[error("download failed: {0}")]
    FetchFailed(String),

    #[error("no audio link found on {0}")]
    NoMediaFound(String),

    #[error("could not save clip: {0}")]
    WriteFailed(String),
}

/// Identifies one submission in its [`IngestEvent`].
pub type IngestTicket = u64;

/// A clip written to the clip directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedClip {
    pub display_name: String,
    pub path: PathBuf,
}

/// Final result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEvent {
    pub ticket: IngestTicket,
    pub url: String,
    pub outcome: Result<IngestedClip, IngestError>,
}

// ---------------------------------------------------------------------------
// IngestPipeline
// ---------------------------------------------------------------------------

pub struct IngestPipeline {
    fetcher: Arc<dyn PageFetcher>,
    clip_dir: PathBuf,
    runtime: Handle,
    events: mpsc::UnboundedSender<IngestEvent>,
    next_ticket: AtomicU64,
    /// Placeholder names claimed by in-flight submissions.
    reserved: Arc<Mutex<HashSet<String>>>,
}

impl IngestPipeline {
    /// Create a pipeline writing into `clip_dir` and running on `runtime`.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        clip_dir: PathBuf,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<IngestEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let pipeline = Self {
            fetcher,
            clip_dir,
            runtime,
            events,
            next_ticket: AtomicU64::new(1),
            reserved: Arc::new(Mutex::new(HashSet::new())),
        };
        (pipeline, rx)
    }

    pub fn clip_dir(&self) -> &Path {
        &self.clip_dir
    }

    /// Validate `url` and start fetching it in the background.
    pub fn submit(&self, url: &str) -> Result<IngestTicket, IngestError> {
        let url = url.trim();
        let lower = url.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(IngestError::InvalidUrl(url.to_string()));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            fetcher: Arc::clone(&self.fetcher),
            clip_dir: self.clip_dir.clone(),
            reserved: Arc::clone(&self.reserved),
            url: url.to_string(),
        };
        let events = self.events.clone();

        log::info!("ingest #{ticket}: {url}");
        self.runtime.spawn(async move {
            let url = job.url.clone();
            let outcome = job.run().await;
            match &outcome {
                Ok(clip) => log::info!("ingest #{ticket}: saved {}", clip.path.display()),
                Err(e) => log::warn!("ingest #{ticket}: {e}"),
            }
            let _ = events.send(IngestEvent {
                ticket,
                url,
                outcome,
            });
        });

        Ok(ticket)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

struct Job {
    fetcher: Arc<dyn PageFetcher>,
    clip_dir: PathBuf,
    reserved: Arc<Mutex<HashSet<String>>>,
    url: String,
}

impl Job {
    async fn run(self) -> Result<IngestedClip, IngestError> {
        let page = self
            .fetcher
            .fetch_text(&self.url)
            .await
            .map_err(|e| IngestError::FetchFailed(e.to_string()))?;

        let link = find_media_link(&page, &self.url)
            .ok_or_else(|| IngestError::NoMediaFound(self.url.clone()))?;
        let title = extract_title(&page).unwrap_or_else(|| UNTITLED.to_string());
        let name = sanitize_title(&title);

        let bytes = self
            .fetcher
            .fetch_bytes(&link.url)
            .await
            .map_err(|e| IngestError::FetchFailed(e.to_string()))?;

        let (display_name, reservation) = if is_placeholder(&name) {
            let unique = self.reserve_unique(&name);
            (unique.clone(), Some(unique))
        } else {
            (name, None)
        };

        let path = self
            .clip_dir
            .join(format!("{display_name}.{}", link.extension));
        let mut written = self.write(&path, &bytes).await;
        if written.is_ok() {
            written = self.remove_siblings(&display_name, &path).await;
        }

        if let Some(name) = reservation {
            if let Ok(mut reserved) = self.reserved.lock() {
                reserved.remove(&name);
            }
        }
        written?;

        Ok(IngestedClip { display_name, path })
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
        tokio::fs::create_dir_all(&self.clip_dir)
            .await
            .map_err(|e| IngestError::WriteFailed(e.to_string()))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| IngestError::WriteFailed(format!("{}: {e}", path.display())))
    }

    /// Delete older files that share the clip's name in another extension or
    /// case, so the new download is the only file behind the clip.
    async fn remove_siblings(&self, display_name: &str, keep: &Path) -> Result<(), IngestError> {
        let dir = self.clip_dir.clone();
        let name = display_name.to_string();
        let keep = keep.to_path_buf();

        let removed = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<PathBuf>> {
            let mut removed = Vec::new();
            for path in same_stem_files(&dir, &name)? {
                if path != keep {
                    std::fs::remove_file(&path)?;
                    removed.push(path);
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| IngestError::WriteFailed(e.to_string()))?
        .map_err(|e| IngestError::WriteFailed(e.to_string()))?;

        for path in removed {
            log::info!("replaced {}", path.display());
        }
        Ok(())
    }

    /// Pick `base`, `base_2`, `base_3`… whichever is neither on disk nor
    /// claimed by another submission, and claim it.
    fn reserve_unique(&self, base: &str) -> String {
        let mut reserved = match self.reserved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let taken = |name: &str, reserved: &HashSet<String>| {
            reserved.contains(name)
                || same_stem_files(&self.clip_dir, name)
                    .map(|files| !files.is_empty())
                    .unwrap_or(false)
        };

        let mut candidate = base.to_string();
        let mut n = 2;
        while taken(&candidate, &reserved) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        reserved.insert(candidate.clone());
        candidate
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetcher::StaticFetcher;
    use std::time::Duration;
    use tempfile::tempdir;

    const PAGE: &str = "https://example.com/instant/funny";
    const ASSET: &str = "https://example.com/clip.mp3";

    fn funny_page() -> StaticFetcher {
        StaticFetcher::default()
            .page(
                PAGE,
                r#"<html><head><title>Sound Button - Funny Clip | MyInstants</title></head>
                   <body><a href="https://example.com/clip.mp3">play</a></body></html>"#,
            )
            .asset(ASSET, b"ID3fake")
    }

    fn pipeline(
        fetcher: StaticFetcher,
        dir: &Path,
    ) -> (IngestPipeline, mpsc::UnboundedReceiver<IngestEvent>) {
        IngestPipeline::new(Arc::new(fetcher), dir.to_path_buf(), Handle::current())
    }

    #[tokio::test]
    async fn downloads_and_names_clip_from_title() {
        let dir = tempdir().expect("temp dir");
        let (pipeline, mut rx) = pipeline(funny_page(), dir.path());

        let ticket = pipeline.submit(PAGE).expect("submit");
        let event = rx.recv().await.expect("event");
        assert_eq!(event.ticket, ticket);

        let clip = event.outcome.expect("ingest ok");
        assert_eq!(clip.display_name, "Funny Clip");
        assert_eq!(clip.path, dir.path().join("Funny Clip.mp3"));
        assert_eq!(std::fs::read(&clip.path).unwrap(), b"ID3fake");
    }

    #[tokio::test]
    async fn non_http_urls_are_rejected_synchronously() {
        let dir = tempdir().expect("temp dir");
        let (pipeline, mut rx) = pipeline(StaticFetcher::default(), dir.path());

        for bad in ["ftp://x.test/a.mp3", "example.com", ""] {
            assert!(matches!(pipeline.submit(bad), Err(IngestError::InvalidUrl(_))));
        }
        drop(pipeline);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn page_without_audio_reports_no_media() {
        let dir = tempdir().expect("temp dir");
        let fetcher = StaticFetcher::default().page(PAGE, "<title>Nothing</title>");
        let (pipeline, mut rx) = pipeline(fetcher, dir.path());

        pipeline.submit(PAGE).unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.outcome, Err(IngestError::NoMediaFound(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unreachable_page_reports_fetch_failure() {
        let dir = tempdir().expect("temp dir");
        let (pipeline, mut rx) = pipeline(StaticFetcher::default(), dir.path());

        pipeline.submit("https://nowhere.test/").unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.outcome, Err(IngestError::FetchFailed(_))));
    }

    #[tokio::test]
    async fn same_title_overwrites_existing_file() {
        let dir = tempdir().expect("temp dir");
        std::fs::write(dir.path().join("Funny Clip.mp3"), b"old").unwrap();
        let (pipeline, mut rx) = pipeline(funny_page(), dir.path());

        pipeline.submit(PAGE).unwrap();
        let clip = rx.recv().await.unwrap().outcome.unwrap();
        assert_eq!(clip.display_name, "Funny Clip");
        assert_eq!(std::fs::read(&clip.path).unwrap(), b"ID3fake");
    }

    #[tokio::test]
    async fn new_download_replaces_same_name_in_other_format() {
        let dir = tempdir().expect("temp dir");
        std::fs::write(dir.path().join("Funny Clip.wav"), b"old").unwrap();
        std::fs::write(dir.path().join("funny clip.ogg"), b"old").unwrap();
        let (pipeline, mut rx) = pipeline(funny_page(), dir.path());

        pipeline.submit(PAGE).unwrap();
        let clip = rx.recv().await.unwrap().outcome.unwrap();
        assert_eq!(clip.path, dir.path().join("Funny Clip.mp3"));
        assert_eq!(
            same_stem_files(dir.path(), "Funny Clip").unwrap(),
            vec![clip.path.clone()]
        );
    }

    #[tokio::test]
    async fn placeholder_suffix_ignores_case() {
        let dir = tempdir().expect("temp dir");
        std::fs::write(dir.path().join("sound.ogg"), b"old").unwrap();
        let fetcher = StaticFetcher::default()
            .page(PAGE, r#"<a href="https://example.com/clip.mp3">"#)
            .asset(ASSET, b"new");
        let (pipeline, mut rx) = pipeline(fetcher, dir.path());

        pipeline.submit(PAGE).unwrap();
        let clip = rx.recv().await.unwrap().outcome.unwrap();
        assert_eq!(clip.display_name, "Sound_2");
        assert!(dir.path().join("sound.ogg").exists());
    }

    #[tokio::test]
    async fn placeholder_names_get_a_suffix_when_taken() {
        let dir = tempdir().expect("temp dir");
        std::fs::write(dir.path().join("Sound.wav"), b"old").unwrap();
        let fetcher = StaticFetcher::default()
            .page(PAGE, r#"<a href="https://example.com/clip.mp3">"#)
            .asset(ASSET, b"new");
        let (pipeline, mut rx) = pipeline(fetcher, dir.path());

        pipeline.submit(PAGE).unwrap();
        let clip = rx.recv().await.unwrap().outcome.unwrap();
        assert_eq!(clip.display_name, "Sound_2");
        assert_eq!(std::fs::read(dir.path().join("Sound.wav")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn concurrent_submissions_each_emit_one_event() {
        let dir = tempdir().expect("temp dir");
        let mut fetcher = funny_page()
            .page(
                "https://example.com/instant/other",
                r#"<title>Other Clip</title> src="https://example.com/other.ogg""#,
            )
            .asset("https://example.com/other.ogg", b"OggS");
        fetcher.latency = Some(Duration::from_millis(20));
        let (pipeline, mut rx) = pipeline(fetcher, dir.path());

        let a = pipeline.submit(PAGE).unwrap();
        let b = pipeline.submit("https://example.com/instant/other").unwrap();
        assert_ne!(a, b);

        let mut events = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        events.sort_by_key(|e| e.ticket);
        assert_eq!(events[0].ticket, a);
        assert_eq!(events[1].ticket, b);
        assert_eq!(events[1].outcome.as_ref().unwrap().display_name, "Other Clip");

        drop(pipeline);
        assert!(rx.recv().await.is_none(), "no extra events");
    }

    #[tokio::test]
    async fn concurrent_placeholders_do_not_collide() {
        let dir = tempdir().expect("temp dir");
        let mut fetcher = StaticFetcher::default()
            .page(PAGE, r#"<a href="https://example.com/clip.mp3">"#)
            .asset(ASSET, b"x");
        fetcher.latency = Some(Duration::from_millis(10));
        let (pipeline, mut rx) = pipeline(fetcher, dir.path());

        pipeline.submit(PAGE).unwrap();
        pipeline.submit(PAGE).unwrap();
        let mut names: Vec<String> = vec![
            rx.recv().await.unwrap().outcome.unwrap().display_name,
            rx.recv().await.unwrap().outcome.unwrap().display_name,
        ];
        names.sort();
        assert_eq!(names, vec!["Sound", "Sound_2"]);
    }
}
