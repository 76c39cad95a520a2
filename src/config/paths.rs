//! Where the soundboard keeps its files.
//!
//! `settings.toml` and `library.json` live together in the per-user config
//! directory (`~/.config/soundboard` on Linux). Clips go under the local data
//! directory (`~/.local/share/soundboard/sounds`) unless the settings point
//! somewhere else.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "soundboard";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Favorites, hotkeys, categories and volume.
    pub library_file: PathBuf,
    /// Clip folder used when the settings leave `sounds_dir` empty.
    pub sounds_dir: PathBuf,
}

impl AppPaths {
    /// Platform locations from `dirs`; a platform without them gets the
    /// working directory instead.
    pub fn new() -> Self {
        let here = || PathBuf::from(".");
        Self::under(
            &dirs::config_dir().unwrap_or_else(here),
            &dirs::data_local_dir().unwrap_or_else(here),
        )
    }

    fn under(config_root: &Path, data_root: &Path) -> Self {
        let config_dir = config_root.join(APP_DIR);
        Self {
            settings_file: config_dir.join("settings.toml"),
            library_file: config_dir.join("library.json"),
            sounds_dir: data_root.join(APP_DIR).join("sounds"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
