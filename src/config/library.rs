//! Persisted library state (`library.json`).
//!
//! Written on every mutating library or routing action and once more at
//! shutdown.  Loading never fails the application: a missing or corrupt file
//! yields [`LibraryConfig::default`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::library::{ALL_CATEGORY, UNCATEGORIZED};

/// Default master volume (0.0 – 1.0).
pub const DEFAULT_VOLUME: f32 = 0.7;
/// Default virtual microphone gain in percent (0 – 200).
pub const DEFAULT_MIC_GAIN: u16 = 100;

/// On-disk library state.  Field names are part of the file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Display names of favorited clips.
    pub favorites: Vec<String>,
    /// Hotkey token → case-folded clip key.
    pub hotkeys: BTreeMap<String, String>,
    /// Ordered category list, system categories included.
    pub categories: Vec<String>,
    /// Display name → category.
    pub sound_to_cat: BTreeMap<String, String>,
    /// Master playback volume (0.0 – 1.0).
    pub volume: f32,
    /// Virtual microphone gain in percent (0 – 200).
    pub mic_volume: u16,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            favorites: Vec::new(),
            hotkeys: BTreeMap::new(),
            categories: vec![ALL_CATEGORY.into(), UNCATEGORIZED.into()],
            sound_to_cat: BTreeMap::new(),
            volume: DEFAULT_VOLUME,
            mic_volume: DEFAULT_MIC_GAIN,
        }
    }
}

impl LibraryConfig {
    /// Load from `path`, falling back to defaults when the file is missing
    /// or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!(
                    "library config at {} unreadable ({e}); using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Load from an explicit path.  A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut cfg: Self = serde_json::from_str(&content)?;
        cfg.volume = cfg.volume.clamp(0.0, 1.0);
        cfg.mic_volume = cfg.mic_volume.min(200);
        Ok(cfg)
    }

    /// Save to `path` as pretty-printed JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
