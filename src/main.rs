//! Application entry point — soundboard.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Resolve [`AppPaths`], load [`AppSettings`] and [`LibraryConfig`]
//!    (defaults on first run or parse failure).
//! 3. Create the [`tokio`] runtime that runs clip downloads.
//! 4. Build the collaborators: `pactl` sound server, HTTP fetcher, ingest
//!    pipeline and the cpal playback engine.
//! 5. [`Soundboard::startup`]: provision virtual devices (blocking, bounded),
//!    open the default output, apply saved levels, scan the clip folder.
//! 6. Run [`eframe::run_native`] — blocks the main thread until the window
//!    is closed.

use std::sync::Arc;

use eframe::egui;
use soundboard::{
    app::SoundboardApp,
    config::{AppPaths, AppSettings, LibraryConfig, UiSettings},
    controller::Soundboard,
    ingest::{HttpFetcher, IngestPipeline, PageFetcher},
    playback::PlaybackEngine,
    routing::{AudioRouteController, PactlServer},
};

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(ui: &UiSettings) -> eframe::NativeOptions {
    let mut vp = egui::ViewportBuilder::default()
        .with_title("Soundboard")
        .with_inner_size([760.0, 560.0])
        .with_min_inner_size([420.0, 320.0]);

    if ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> eframe::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("soundboard starting up");

    // 2. Configuration
    let paths = AppPaths::new();
    let settings = AppSettings::load_from(&paths.settings_file).unwrap_or_else(|e| {
        log::warn!("Failed to load settings ({e}); using defaults");
        AppSettings::default()
    });
    let library = LibraryConfig::load_or_default(&paths.library_file);

    let sounds_dir = settings.resolved_sounds_dir(&paths);
    if let Err(e) = std::fs::create_dir_all(&sounds_dir) {
        log::warn!("cannot create clip folder {}: {e}", sounds_dir.display());
    }
    log::info!("clip folder: {}", sounds_dir.display());

    // 3. Tokio runtime (downloads only; playback runs on the cpal thread)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // 4. Collaborators
    let routing = AudioRouteController::new(PactlServer::detect(), settings.routing.clone());
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::from_settings(&settings.ingest));
    let ingest = IngestPipeline::new(fetcher, sounds_dir, rt.handle().clone());
    let playback = PlaybackEngine::new(library.volume);

    // 5. Application state
    let mut board = Soundboard::new(
        &library,
        paths.library_file.clone(),
        playback,
        routing,
        ingest,
    );
    let notices = board.startup();

    // 6. Window (blocks until closed; the runtime must outlive it)
    let app = SoundboardApp::new(board, notices, &settings.ui);
    let result = eframe::run_native(
        "Soundboard",
        native_options(&settings.ui),
        Box::new(move |_cc| Ok(Box::new(app))),
    );

    rt.shutdown_background();
    result
}
