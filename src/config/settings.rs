//! Application settings structs, defaults and TOML persistence.
//!
//! `settings.toml` holds the knobs a user edits by hand (clip directory,
//! virtual device names, network timeouts).  Library state that changes on
//! every click lives in `library.json`, see [`crate::config::LibraryConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// RoutingSettings
// ---------------------------------------------------------------------------

/// Names and timings used when provisioning the virtual audio devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Name of the null sink that sounds are played into in voice-chat mode.
    pub virtual_sink_name: String,
    /// Name of the remap source other applications pick as their microphone.
    pub virtual_source_name: String,
    /// Upper bound on how long to wait for a freshly created device to show
    /// up in the server's device list.
    pub settle_timeout_ms: u64,
    /// First poll interval; doubled after every miss.
    pub poll_interval_ms: u64,
}

impl RoutingSettings {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Human-readable description attached to the virtual source.
    pub fn virtual_source_description(&self) -> String {
        format!("Virtual_Mic_{}", self.virtual_sink_name)
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            virtual_sink_name: "MemeBoard_Virtual_Output".into(),
            virtual_source_name: "Virtual_Mic_Remap".into(),
            settle_timeout_ms: 2_000,
            poll_interval_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// IngestSettings
// ---------------------------------------------------------------------------

/// Settings for fetching clips from web pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// `User-Agent` header sent with every request.  Several sound sites
    /// reject clients that do not look like a browser.
    pub user_agent: String,
    /// Maximum seconds to wait for the page fetch.
    pub fetch_timeout_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0".into(),
            fetch_timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// UiSettings
// ---------------------------------------------------------------------------

/// Window behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// Start with the window floating above all others.
    pub always_on_top: bool,
    /// Also listen for hotkeys while the window is unfocused (rdev).
    pub global_hotkeys: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            always_on_top: false,
            global_hotkeys: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AppSettings  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application settings, serialised as `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Clip directory override.  `None` uses [`AppPaths::sounds_dir`].
    pub sounds_dir: Option<PathBuf>,
    /// Virtual device provisioning.
    pub routing: RoutingSettings,
    /// Clip ingest over HTTP.
    pub ingest: IngestSettings,
    /// Window behaviour.
    pub ui: UiSettings,
}

impl AppSettings {
    /// Load `settings.toml` from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The directory clips are scanned from and downloaded into.
    pub fn resolved_sounds_dir(&self, paths: &AppPaths) -> PathBuf {
        self.sounds_dir
            .clone()
            .unwrap_or_else(|| paths.sounds_dir.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
