//! [`ClipStore`] — the in-memory catalog.
//!
//! Favorites and category assignments are keyed by display name and are
//! kept even for clips whose files are currently absent, so that a clip
//! restored to the directory comes back with its old metadata.  Explicit
//! [`ClipStore::remove`] is the only operation that forgets them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::LibraryConfig;
use crate::hotkey::STOP_TOKEN;

use super::scan::scan_clip_dir;
use super::{clip_key, is_system_category, Clip, LibraryError, ALL_CATEGORY, UNCATEGORIZED};

/// Result of [`ClipStore::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Display names registered by the scan.
    pub loaded: Vec<String>,
    /// Files the decode hook rejected, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Catalog of clips plus the metadata persisted in `library.json`.
#[derive(Debug, Clone)]
pub struct ClipStore {
    /// Display name → file path.
    clips: BTreeMap<String, PathBuf>,
    favorites: BTreeSet<String>,
    /// Ordered, system categories first.
    categories: Vec<String>,
    /// Display name → category.
    assignments: BTreeMap<String, String>,
    /// Hotkey token → case-folded clip key.
    hotkeys: BTreeMap<String, String>,
}

impl Default for ClipStore {
    fn default() -> Self {
        Self::from_config(&LibraryConfig::default())
    }
}

impl ClipStore {
    /// Build a store from persisted state, repairing anything that violates
    /// the library invariants.
    pub fn from_config(cfg: &LibraryConfig) -> Self {
        let mut categories = vec![ALL_CATEGORY.to_string(), UNCATEGORIZED.to_string()];
        for name in &cfg.categories {
            let name = name.trim();
            if !name.is_empty() && !categories.iter().any(|c| c == name) {
                categories.push(name.to_string());
            }
        }

        let assignments = cfg
            .sound_to_cat
            .iter()
            .filter(|(_, cat)| cat.as_str() != ALL_CATEGORY && categories.contains(cat))
            .map(|(name, cat)| (name.clone(), cat.clone()))
            .collect();

        let hotkeys = cfg
            .hotkeys
            .iter()
            .filter_map(|(token, key)| {
                let token = normalize_token(token)?;
                (token != STOP_TOKEN).then(|| (token, key.to_lowercase()))
            })
            .collect();

        Self {
            clips: BTreeMap::new(),
            favorites: cfg.favorites.iter().cloned().collect(),
            categories,
            assignments,
            hotkeys,
        }
    }

    /// Snapshot the persisted part of the store.
    pub fn to_config(&self, volume: f32, mic_volume: u16) -> LibraryConfig {
        LibraryConfig {
            favorites: self.favorites.iter().cloned().collect(),
            hotkeys: self.hotkeys.clone(),
            categories: self.categories.clone(),
            sound_to_cat: self.assignments.clone(),
            volume,
            mic_volume,
        }
    }

    // ── Clips ─────────────────────────────────────────────────────────────

    /// Replace the clip catalog with the supported files in `dir`.
    ///
    /// `accept` is called for every candidate; a file it rejects is skipped
    /// and recorded in the report, the scan itself carries on.
    pub fn load<F, E>(&mut self, dir: &Path, mut accept: F) -> io::Result<LoadReport>
    where
        F: FnMut(&str, &Path) -> Result<(), E>,
        E: Display,
    {
        self.clips.clear();
        let mut report = LoadReport::default();

        for file in scan_clip_dir(dir)? {
            match accept(&file.display_name, &file.path) {
                Ok(()) => {
                    self.insert_clip(&file.display_name, file.path);
                    report.loaded.push(file.display_name);
                }
                Err(e) => {
                    log::warn!("skipping {}: {e}", file.path.display());
                    report.skipped.push((file.path, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Add a clip, or replace the path of the clip with the same
    /// case-folded name.  A clip that differs only in case is renamed to
    /// `display_name` and keeps its favorite/category/hotkey metadata.
    pub fn register(&mut self, display_name: impl Into<String>, path: PathBuf) -> Clip {
        let display_name = display_name.into();
        self.insert_clip(&display_name, path);
        self.view(&display_name)
    }

    /// Delete a clip and every index entry that refers to it.
    pub fn remove(&mut self, display_name: &str) -> Result<Clip, LibraryError> {
        let clip = self
            .clip(display_name)
            .ok_or_else(|| LibraryError::UnknownClip(display_name.to_string()))?;

        self.clips.remove(display_name);
        self.favorites.remove(display_name);
        self.assignments.remove(display_name);
        self.hotkeys.retain(|_, key| *key != clip.key);
        Ok(clip)
    }

    pub fn clip(&self, display_name: &str) -> Option<Clip> {
        self.clips
            .contains_key(display_name)
            .then(|| self.view(display_name))
    }

    /// Stored spelling of the clip whose name matches `display_name`
    /// ignoring case.
    pub fn canonical_name(&self, display_name: &str) -> Option<&str> {
        let key = clip_key(display_name);
        self.clips
            .keys()
            .find(|name| clip_key(name) == key)
            .map(String::as_str)
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.clips.contains_key(display_name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Clips shown under `category`: favorites first, then alphabetical
    /// (case-insensitive).  `"All"` lists every clip exactly once.
    pub fn list_visible(&self, category: &str) -> Vec<Clip> {
        let mut visible: Vec<Clip> = self
            .clips
            .keys()
            .map(|name| self.view(name))
            .filter(|clip| category == ALL_CATEGORY || clip.category == category)
            .collect();

        visible.sort_by(|a, b| {
            (!a.favorite, a.display_name.to_lowercase(), &a.display_name).cmp(&(
                !b.favorite,
                b.display_name.to_lowercase(),
                &b.display_name,
            ))
        });
        visible
    }

    // ── Favorites ─────────────────────────────────────────────────────────

    /// Flip favorite membership; returns the new state.
    pub fn toggle_favorite(&mut self, display_name: &str) -> Result<bool, LibraryError> {
        if !self.contains(display_name) {
            return Err(LibraryError::UnknownClip(display_name.to_string()));
        }
        if self.favorites.remove(display_name) {
            Ok(false)
        } else {
            self.favorites.insert(display_name.to_string());
            Ok(true)
        }
    }

    // ── Categories ────────────────────────────────────────────────────────

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Append a category.  Returns `Ok(false)` when it already exists.
    pub fn create_category(&mut self, name: &str) -> Result<bool, LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::InvalidName);
        }
        if self.categories.iter().any(|c| c == name) {
            return Ok(false);
        }
        self.categories.push(name.to_string());
        Ok(true)
    }

    /// Remove a user category, moving its clips to `"Uncategorized"`.
    pub fn delete_category(&mut self, name: &str) -> Result<(), LibraryError> {
        if is_system_category(name) {
            return Err(LibraryError::ProtectedCategory(name.to_string()));
        }
        let idx = self
            .categories
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| LibraryError::UnknownCategory(name.to_string()))?;

        self.categories.remove(idx);
        for cat in self.assignments.values_mut() {
            if cat == name {
                *cat = UNCATEGORIZED.to_string();
            }
        }
        Ok(())
    }

    /// File a clip under an existing category.  `"All"` is not a valid
    /// target; the category must be created first.
    pub fn set_category(&mut self, display_name: &str, category: &str) -> Result<(), LibraryError> {
        if category == ALL_CATEGORY || !self.categories.iter().any(|c| c == category) {
            return Err(LibraryError::UnknownCategory(category.to_string()));
        }
        if !self.contains(display_name) {
            return Err(LibraryError::UnknownClip(display_name.to_string()));
        }
        self.assignments
            .insert(display_name.to_string(), category.to_string());
        Ok(())
    }

    // ── Hotkeys ───────────────────────────────────────────────────────────

    /// Bind `token` to a clip, replacing any previous target for the token.
    pub fn bind_hotkey(&mut self, token: &str, display_name: &str) -> Result<(), LibraryError> {
        let token = normalize_token(token).ok_or(LibraryError::InvalidToken)?;
        if token == STOP_TOKEN {
            return Err(LibraryError::ReservedToken(token));
        }
        if !self.contains(display_name) {
            return Err(LibraryError::UnknownClip(display_name.to_string()));
        }
        self.hotkeys.insert(token, clip_key(display_name));
        Ok(())
    }

    /// Display name of the clip bound to `token`, if it is still present.
    pub fn resolve_hotkey(&self, token: &str) -> Option<&str> {
        let token = normalize_token(token)?;
        let target = self.hotkeys.get(&token)?;
        self.canonical_name(target)
    }

    /// Tokens currently bound to `display_name`, in token order.
    pub fn hotkeys_for(&self, display_name: &str) -> Vec<&str> {
        let key = clip_key(display_name);
        self.hotkeys
            .iter()
            .filter(|(_, target)| **target == key)
            .map(|(token, _)| token.as_str())
            .collect()
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    /// Keep at most one clip per case-folded key.
    fn insert_clip(&mut self, display_name: &str, path: PathBuf) {
        let previous = self.canonical_name(display_name).map(str::to_string);

        if let Some(old) = previous.filter(|old| old != display_name) {
            log::debug!("renaming clip '{old}' to '{display_name}'");
            self.clips.remove(&old);
            if self.favorites.remove(&old) {
                self.favorites.insert(display_name.to_string());
            }
            if let Some(cat) = self.assignments.remove(&old) {
                self.assignments.insert(display_name.to_string(), cat);
            }
        }

        if let Some(old) = self.clips.insert(display_name.to_string(), path) {
            log::debug!("replaced clip '{display_name}' (was {})", old.display());
        }
    }

    fn category_of(&self, display_name: &str) -> String {
        self.assignments
            .get(display_name)
            .filter(|cat| self.categories.contains(cat))
            .cloned()
            .unwrap_or_else(|| UNCATEGORIZED.to_string())
    }

    fn view(&self, display_name: &str) -> Clip {
        Clip {
            key: clip_key(display_name),
            display_name: display_name.to_string(),
            path: self.clips.get(display_name).cloned().unwrap_or_default(),
            category: self.category_of(display_name),
            favorite: self.favorites.contains(display_name),
        }
    }
}

/// Trim and lowercase a hotkey token; `None` when nothing is left.
fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim().to_lowercase();
    (!token.is_empty()).then_some(token)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
