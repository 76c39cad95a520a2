//! [`Soundboard`] — application state and the single command handler.
//!
//! # Architecture
//!
//! ```text
//!  egui update() ──Command──▶ Soundboard::handle ──▶ ClipStore / Playback /
//!        ▲                           │                AudioRouteController
//!        │                           ▼
//!        └────── Vec<Notice> ◀───────┘
//!
//!  IngestPipeline (tokio) ──IngestEvent (mpsc)──▶ Soundboard::poll_ingest
//! ```
//!
//! The soundboard is owned by the UI thread.  Background work only reaches
//! it through the ingest channel, which is drained once per frame.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::config::LibraryConfig;
use crate::hotkey::{dispatch, DispatchOutcome, KeyEvent};
use crate::ingest::{IngestEvent, IngestPipeline};
use crate::library::{same_stem_files, Clip, ClipStore, ALL_CATEGORY};
use crate::playback::{Playback, PlaybackEngine, SYSTEM_DEFAULT_DEVICE};
use crate::routing::{AudioRouteController, RouteState, MAX_MIC_GAIN};

// ---------------------------------------------------------------------------
// Command / Notice
// ---------------------------------------------------------------------------

/// Every user action the UI can request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(String),
    StopAll,
    SetVolume(f32),
    SetMicGain(u16),
    SelectOutput(String),
    SetVoiceChat(bool),
    CreateCategory(String),
    DeleteCategory(String),
    MoveClip { clip: String, category: String },
    ToggleFavorite(String),
    BindHotkey { token: String, clip: String },
    /// Remove the clip from the library and delete its file.
    DeleteClip(String),
    SubmitUrl(String),
    /// Re-scan the clip directory.
    Rescan,
    Key(KeyEvent),
}

/// Advisory message for the user.  Nothing here is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Warning(String),
}

impl Notice {
    pub fn text(&self) -> &str {
        match self {
            Notice::Info(t) | Notice::Warning(t) => t,
        }
    }
}

// ---------------------------------------------------------------------------
// Soundboard
// ---------------------------------------------------------------------------

pub struct Soundboard<P: Playback = PlaybackEngine> {
    store: ClipStore,
    playback: P,
    routing: AudioRouteController,
    ingest: IngestPipeline,
    ingest_rx: mpsc::UnboundedReceiver<IngestEvent>,
    library_file: PathBuf,
    volume: f32,
    mic_gain: u16,
}

impl<P: Playback> Soundboard<P> {
    pub fn new(
        library: &LibraryConfig,
        library_file: PathBuf,
        playback: P,
        routing: AudioRouteController,
        (ingest, ingest_rx): (IngestPipeline, mpsc::UnboundedReceiver<IngestEvent>),
    ) -> Self {
        Self {
            store: ClipStore::from_config(library),
            playback,
            routing,
            ingest,
            ingest_rx,
            library_file,
            volume: library.volume.clamp(0.0, 1.0),
            mic_gain: library.mic_volume.min(MAX_MIC_GAIN),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Provision routing, open the default output, apply saved levels and
    /// load the clip directory.  Blocks briefly while virtual devices settle.
    pub fn startup(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();

        match self.routing.ensure_virtual_devices() {
            Ok(true) => notices.push(Notice::Info(format!(
                "Created virtual microphone '{}'. Select it as the input device in your chat app.",
                self.routing.virtual_source_name()
            ))),
            Ok(false) => {}
            Err(e) => notices.push(Notice::Warning(format!(
                "Voice chat mode unavailable: {e}"
            ))),
        }

        if let Err(e) = self
            .routing
            .set_output_target(SYSTEM_DEFAULT_DEVICE, &mut self.playback)
        {
            notices.push(Notice::Warning(e.to_string()));
        }
        if !self.playback.has_output() {
            notices.push(Notice::Warning(
                "No audio output available; sounds will not play.".into(),
            ));
        }

        if self.routing.is_ready() {
            if let Err(e) = self.routing.set_mic_gain(self.mic_gain) {
                log::warn!("initial mic gain not applied: {e}");
            }
        }
        self.playback.set_volume(self.volume);

        notices.extend(self.reload_library());
        log::info!("soundboard ready with {} clips", self.store.len());
        notices
    }

    /// Stop playback and persist the library.
    pub fn shutdown(&mut self) {
        self.playback.stop_all();
        if let Some(notice) = self.save() {
            log::error!("{}", notice.text());
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn store(&self) -> &ClipStore {
        &self.store
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }

    pub fn route_state(&self) -> &RouteState {
        self.routing.state()
    }

    pub fn routing_ready(&self) -> bool {
        self.routing.is_ready()
    }

    pub fn virtual_source_name(&self) -> &str {
        self.routing.virtual_source_name()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn mic_gain(&self) -> u16 {
        self.mic_gain
    }

    pub fn output_devices(&self) -> Vec<String> {
        self.routing.list_output_devices(&self.playback)
    }

    pub fn visible_clips(&self, category: &str) -> Vec<Clip> {
        self.store.list_visible(category)
    }

    // ── Commands ──────────────────────────────────────────────────────────

    /// Apply one command and return whatever the user should be told.
    pub fn handle(&mut self, cmd: Command) -> Vec<Notice> {
        let mut notices = Vec::new();
        let mut dirty = false;

        match cmd {
            Command::Play(name) => {
                if let Err(e) = self.playback.play(&name) {
                    notices.push(Notice::Warning(format!("Cannot play '{name}': {e}")));
                }
            }
            Command::StopAll => self.playback.stop_all(),
            Command::SetVolume(v) => {
                self.volume = v.clamp(0.0, 1.0);
                self.playback.set_volume(self.volume);
                dirty = true;
            }
            Command::SetMicGain(percent) => {
                self.mic_gain = percent.min(MAX_MIC_GAIN);
                if let Err(e) = self.routing.set_mic_gain(self.mic_gain) {
                    notices.push(Notice::Warning(format!("Mic gain not applied: {e}")));
                }
                dirty = true;
            }
            Command::SelectOutput(label) => {
                if let Err(e) = self.routing.set_output_target(&label, &mut self.playback) {
                    notices.push(Notice::Warning(e.to_string()));
                }
            }
            Command::SetVoiceChat(enabled) => {
                if let Err(e) = self.routing.set_voice_chat_mode(enabled, &mut self.playback) {
                    notices.push(Notice::Warning(e.to_string()));
                }
            }
            Command::CreateCategory(name) => match self.store.create_category(&name) {
                Ok(created) => dirty = created,
                Err(e) => notices.push(Notice::Warning(e.to_string())),
            },
            Command::DeleteCategory(name) => match self.store.delete_category(&name) {
                Ok(()) => dirty = true,
                Err(e) => notices.push(Notice::Warning(e.to_string())),
            },
            Command::MoveClip { clip, category } => {
                match self.store.set_category(&clip, &category) {
                    Ok(()) => dirty = true,
                    Err(e) => notices.push(Notice::Warning(e.to_string())),
                }
            }
            Command::ToggleFavorite(name) => match self.store.toggle_favorite(&name) {
                Ok(_) => dirty = true,
                Err(e) => notices.push(Notice::Warning(e.to_string())),
            },
            Command::BindHotkey { token, clip } => match self.store.bind_hotkey(&token, &clip) {
                Ok(()) => dirty = true,
                Err(e) => notices.push(Notice::Warning(e.to_string())),
            },
            Command::DeleteClip(name) => {
                notices.extend(self.delete_clip(&name));
                dirty = true;
            }
            Command::SubmitUrl(url) => match self.ingest.submit(&url) {
                Ok(_) => notices.push(Notice::Info(format!("Downloading {}", url.trim()))),
                Err(e) => notices.push(Notice::Warning(e.to_string())),
            },
            Command::Rescan => notices.extend(self.reload_library()),
            Command::Key(event) => {
                if let DispatchOutcome::PlayFailed { clip, reason } =
                    dispatch(&event, &self.store, &mut self.playback)
                {
                    notices.push(Notice::Warning(format!("Cannot play '{clip}': {reason}")));
                }
            }
        }

        if dirty {
            notices.extend(self.save());
        }
        notices
    }

    /// Drain finished ingest jobs into the library.
    pub fn poll_ingest(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        let mut dirty = false;

        while let Ok(event) = self.ingest_rx.try_recv() {
            match event.outcome {
                Ok(clip) => {
                    let displaced = self
                        .store
                        .canonical_name(&clip.display_name)
                        .filter(|old| *old != clip.display_name)
                        .map(str::to_string);
                    if let Err(e) = self.playback.reload(&clip.display_name, &clip.path) {
                        notices.push(Notice::Warning(format!(
                            "Downloaded '{}' but it cannot be played: {e}",
                            clip.display_name
                        )));
                        continue;
                    }
                    if let Some(old) = displaced {
                        self.playback.unload(&old);
                    }
                    self.store.register(clip.display_name.clone(), clip.path);
                    notices.push(Notice::Info(format!("Added '{}'", clip.display_name)));
                    dirty = true;
                }
                Err(e) => notices.push(Notice::Warning(format!("{}: {e}", event.url))),
            }
        }

        if dirty {
            notices.extend(self.save());
        }
        notices
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn reload_library(&mut self) -> Vec<Notice> {
        let before: Vec<String> = self
            .store
            .list_visible(ALL_CATEGORY)
            .into_iter()
            .map(|c| c.display_name)
            .collect();

        let dir = self.ingest.clip_dir().to_path_buf();
        let playback = &mut self.playback;
        let report = match self.store.load(&dir, |name, path| playback.load(name, path)) {
            Ok(report) => report,
            Err(e) => {
                return vec![Notice::Warning(format!(
                    "Cannot read clip directory {}: {e}",
                    dir.display()
                ))]
            }
        };

        for name in before {
            if !self.store.contains(&name) {
                self.playback.unload(&name);
            }
        }

        let mut notices = Vec::new();
        if !report.skipped.is_empty() {
            notices.push(Notice::Warning(format!(
                "Skipped {} file(s) that could not be decoded",
                report.skipped.len()
            )));
        }
        notices
    }

    fn delete_clip(&mut self, name: &str) -> Vec<Notice> {
        let clip = match self.store.remove(name) {
            Ok(clip) => clip,
            Err(e) => return vec![Notice::Warning(e.to_string())],
        };
        self.playback.unload(name);

        let dir = self.ingest.clip_dir().to_path_buf();
        let mut files = same_stem_files(&dir, name).unwrap_or_default();
        if !files.contains(&clip.path) {
            files.push(clip.path.clone());
        }

        let mut notices = Vec::new();
        for path in files {
            match std::fs::remove_file(&path) {
                Ok(()) => log::info!("deleted {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => notices.push(Notice::Warning(format!(
                    "Removed '{name}' but could not delete {}: {e}",
                    path.display()
                ))),
            }
        }
        notices
    }

    fn save(&self) -> Option<Notice> {
        let cfg = self.store.to_config(self.volume, self.mic_gain);
        match cfg.save_to(&self.library_file) {
            Ok(()) => None,
            Err(e) => {
                log::error!("failed to save {}: {e}", self.library_file.display());
                Some(Notice::Warning(format!("Settings not saved: {e}")))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingSettings;
    use crate::hotkey::KeyCode;
    use crate::ingest::StaticFetcher;
    use crate::playback::{MockPlayback, OutputTarget};
    use crate::routing::{MockSoundServer, RouteMode, UnavailableServer};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        board: Soundboard<MockPlayback>,
    }

    impl Fixture {
        fn clip_dir(&self) -> PathBuf {
            self.dir.path().join("sounds")
        }

        fn library_file(&self) -> PathBuf {
            self.dir.path().join("library.json")
        }
    }

    fn routing(ready: bool) -> AudioRouteController {
        let settings = RoutingSettings {
            settle_timeout_ms: 200,
            poll_interval_ms: 1,
            ..RoutingSettings::default()
        };
        if ready {
            AudioRouteController::new(Box::new(MockSoundServer::default()), settings)
        } else {
            AudioRouteController::new(Box::new(UnavailableServer), settings)
        }
    }

    fn fixture_with(
        files: &[&str],
        fetcher: StaticFetcher,
        ready: bool,
        playback: MockPlayback,
    ) -> Fixture {
        let dir = tempdir().expect("temp dir");
        let clip_dir = dir.path().join("sounds");
        std::fs::create_dir_all(&clip_dir).unwrap();
        for f in files {
            std::fs::write(clip_dir.join(f), b"x").unwrap();
        }

        let ingest = IngestPipeline::new(
            Arc::new(fetcher),
            clip_dir,
            tokio::runtime::Handle::current(),
        );
        let mut board = Soundboard::new(
            &LibraryConfig::default(),
            dir.path().join("library.json"),
            playback,
            routing(ready),
            ingest,
        );
        board.startup();
        Fixture { dir, board }
    }

    fn fixture(files: &[&str]) -> Fixture {
        fixture_with(files, StaticFetcher::default(), true, MockPlayback::default())
    }

    async fn wait_for_ingest(board: &mut Soundboard<MockPlayback>) -> Vec<Notice> {
        for _ in 0..200 {
            let notices = board.poll_ingest();
            if !notices.is_empty() {
                return notices;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("ingest never finished");
    }

    // ---- startup ---------------------------------------------------------

    #[tokio::test]
    async fn startup_loads_clips_and_reports_new_devices() {
        let dir = tempdir().expect("temp dir");
        let clip_dir = dir.path().join("sounds");
        std::fs::create_dir_all(&clip_dir).unwrap();
        std::fs::write(clip_dir.join("Airhorn.mp3"), b"x").unwrap();

        let mut board = Soundboard::new(
            &LibraryConfig::default(),
            dir.path().join("library.json"),
            MockPlayback::default(),
            routing(true),
            IngestPipeline::new(
                Arc::new(StaticFetcher::default()),
                clip_dir,
                tokio::runtime::Handle::current(),
            ),
        );
        let notices = board.startup();

        assert!(notices
            .iter()
            .any(|n| matches!(n, Notice::Info(t) if t.contains("Virtual_Mic_Remap"))));
        assert!(board.store().contains("Airhorn"));
        assert!(board.playback().is_loaded("Airhorn"));
        assert_eq!(board.playback().current, Some(OutputTarget::Default));
    }

    #[tokio::test]
    async fn undecodable_files_are_skipped_with_a_warning() {
        let mut playback = MockPlayback::default();
        playback.undecodable.insert("broken".into());
        let fx = fixture_with(&["ok.mp3", "broken.mp3"], StaticFetcher::default(), true, playback);

        assert!(fx.board.store().contains("ok"));
        assert!(!fx.board.store().contains("broken"));
    }

    #[tokio::test]
    async fn startup_without_sound_server_is_degraded_not_fatal() {
        let fx = fixture_with(&["a.mp3"], StaticFetcher::default(), false, MockPlayback::default());
        assert!(!fx.board.routing_ready());
        assert!(fx.board.store().contains("a"));
    }

    // ---- commands --------------------------------------------------------

    #[tokio::test]
    async fn play_and_stop() {
        let mut fx = fixture(&["a.mp3"]);
        assert!(fx.board.handle(Command::Play("a".into())).is_empty());
        fx.board.handle(Command::StopAll);
        assert_eq!(fx.board.playback().played, vec!["a"]);
        assert_eq!(fx.board.playback().stop_count, 1);
    }

    #[tokio::test]
    async fn playing_a_missing_clip_warns() {
        let mut fx = fixture(&[]);
        let notices = fx.board.handle(Command::Play("ghost".into()));
        assert!(matches!(notices.as_slice(), [Notice::Warning(_)]));
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let mut fx = fixture(&["a.mp3"]);
        fx.board.handle(Command::CreateCategory("Memes".into()));
        fx.board.handle(Command::MoveClip {
            clip: "a".into(),
            category: "Memes".into(),
        });
        fx.board.handle(Command::ToggleFavorite("a".into()));
        fx.board.handle(Command::BindHotkey {
            token: "F1".into(),
            clip: "a".into(),
        });
        fx.board.handle(Command::SetVolume(0.25));

        let saved = LibraryConfig::load_from(&fx.library_file()).expect("saved");
        assert_eq!(saved.categories, vec!["All", "Uncategorized", "Memes"]);
        assert_eq!(saved.sound_to_cat.get("a").map(String::as_str), Some("Memes"));
        assert_eq!(saved.favorites, vec!["a"]);
        assert_eq!(saved.hotkeys.get("f1").map(String::as_str), Some("a"));
        assert!((saved.volume - 0.25).abs() < f32::EPSILON);
        assert!((fx.board.playback().volume - 0.25).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn binding_space_warns_and_changes_nothing() {
        let mut fx = fixture(&["a.mp3"]);
        let notices = fx.board.handle(Command::BindHotkey {
            token: "space".into(),
            clip: "a".into(),
        });
        assert!(matches!(notices.as_slice(), [Notice::Warning(_)]));
        assert_eq!(fx.board.store().resolve_hotkey("space"), None);
    }

    #[tokio::test]
    async fn delete_clip_removes_file_and_bindings() {
        let mut fx = fixture(&["a.mp3"]);
        fx.board.handle(Command::BindHotkey {
            token: "q".into(),
            clip: "a".into(),
        });

        let notices = fx.board.handle(Command::DeleteClip("a".into()));
        assert!(notices.is_empty());
        assert!(!fx.clip_dir().join("a.mp3").exists());
        assert!(!fx.board.store().contains("a"));
        assert!(!fx.board.playback().is_loaded("a"));
        assert_eq!(fx.board.store().resolve_hotkey("q"), None);
    }

    #[tokio::test]
    async fn deleted_clip_stays_gone_after_rescan() {
        let mut fx = fixture(&["Bruh.mp3", "bruh.wav"]);
        assert_eq!(fx.board.store().len(), 1);

        let name = fx.board.store().canonical_name("bruh").unwrap().to_string();
        fx.board.handle(Command::DeleteClip(name));
        fx.board.handle(Command::Rescan);
        assert!(fx.board.store().is_empty());
        assert!(!fx.clip_dir().join("Bruh.mp3").exists());
        assert!(!fx.clip_dir().join("bruh.wav").exists());
    }

    #[tokio::test]
    async fn key_events_are_dispatched() {
        let mut fx = fixture(&["a.mp3"]);
        fx.board.handle(Command::BindHotkey {
            token: "a".into(),
            clip: "a".into(),
        });

        fx.board.handle(Command::Key(KeyEvent::new(KeyCode::Char('a'))));
        fx.board.handle(Command::Key(KeyEvent::new(KeyCode::Space)));
        assert_eq!(fx.board.playback().played, vec!["a"]);
        assert_eq!(fx.board.playback().stop_count, 1);
    }

    #[tokio::test]
    async fn mic_gain_is_clamped_and_saved() {
        let mut fx = fixture(&[]);
        fx.board.handle(Command::SetMicGain(999));
        assert_eq!(fx.board.mic_gain(), 200);
        assert_eq!(fx.board.route_state().mic_gain, Some(200));
        let saved = LibraryConfig::load_from(&fx.library_file()).unwrap();
        assert_eq!(saved.mic_volume, 200);
    }

    // ---- routing ---------------------------------------------------------

    #[tokio::test]
    async fn voice_chat_while_degraded_warns_and_keeps_device() {
        let playback = MockPlayback::with_devices(&["Headphones"]);
        let mut fx = fixture_with(&[], StaticFetcher::default(), false, playback);
        fx.board.handle(Command::SelectOutput("Headphones".into()));

        let notices = fx.board.handle(Command::SetVoiceChat(true));
        assert!(matches!(notices.as_slice(), [Notice::Warning(_)]));
        assert_eq!(fx.board.route_state().selected_device, "Headphones");
        assert_eq!(fx.board.route_state().mode, RouteMode::Normal);
    }

    #[tokio::test]
    async fn voice_chat_round_trip() {
        let mut fx = fixture(&[]);
        assert!(fx.board.handle(Command::SetVoiceChat(true)).is_empty());
        assert_eq!(fx.board.route_state().mode, RouteMode::VoiceChat);
        assert!(fx.board.handle(Command::SetVoiceChat(false)).is_empty());
        assert_eq!(fx.board.playback().current, Some(OutputTarget::Default));
    }

    // ---- ingest ----------------------------------------------------------

    #[tokio::test]
    async fn ingested_clip_is_registered_and_playable() {
        let fetcher = StaticFetcher::default()
            .page(
                "https://example.com/x",
                r#"<title>Sound Button - Funny Clip | MyInstants</title>
                   <a href="https://example.com/clip.mp3">"#,
            )
            .asset("https://example.com/clip.mp3", b"mp3");
        let mut fx = fixture_with(&[], fetcher, true, MockPlayback::default());

        let notices = fx.board.handle(Command::SubmitUrl("https://example.com/x".into()));
        assert!(matches!(notices.as_slice(), [Notice::Info(_)]));

        let notices = wait_for_ingest(&mut fx.board).await;
        assert_eq!(notices, vec![Notice::Info("Added 'Funny Clip'".into())]);
        assert!(fx.clip_dir().join("Funny Clip.mp3").exists());
        assert!(fx.board.store().contains("Funny Clip"));
        assert!(fx.board.handle(Command::Play("Funny Clip".into())).is_empty());
    }

    #[tokio::test]
    async fn ingest_renaming_a_clip_unloads_the_old_spelling() {
        let fetcher = StaticFetcher::default()
            .page(
                "https://example.com/x",
                r#"<title>funny clip</title> src="https://example.com/clip.mp3""#,
            )
            .asset("https://example.com/clip.mp3", b"mp3");
        let mut fx = fixture_with(&["FUNNY CLIP.wav"], fetcher, true, MockPlayback::default());
        fx.board.handle(Command::ToggleFavorite("FUNNY CLIP".into()));

        fx.board.handle(Command::SubmitUrl("https://example.com/x".into()));
        wait_for_ingest(&mut fx.board).await;

        assert_eq!(fx.board.store().len(), 1);
        assert!(fx.board.store().clip("Funny Clip").unwrap().favorite);
        assert!(!fx.board.playback().is_loaded("FUNNY CLIP"));
        assert!(fx.board.playback().is_loaded("Funny Clip"));
        assert!(!fx.clip_dir().join("FUNNY CLIP.wav").exists());
    }

    #[tokio::test]
    async fn failed_ingest_registers_nothing() {
        let fetcher = StaticFetcher::default().page("https://example.com/x", "<p>no audio</p>");
        let mut fx = fixture_with(&[], fetcher, true, MockPlayback::default());

        fx.board.handle(Command::SubmitUrl("https://example.com/x".into()));
        let notices = wait_for_ingest(&mut fx.board).await;
        assert!(matches!(notices.as_slice(), [Notice::Warning(_)]));
        assert!(fx.board.store().is_empty());
    }

    #[tokio::test]
    async fn invalid_url_warns_immediately() {
        let mut fx = fixture(&[]);
        let notices = fx.board.handle(Command::SubmitUrl("not a url".into()));
        assert!(matches!(notices.as_slice(), [Notice::Warning(_)]));
    }

    #[tokio::test]
    async fn shutdown_saves_library() {
        let mut fx = fixture(&["a.mp3"]);
        fx.board.shutdown();
        assert!(fx.library_file().exists());
    }
}
