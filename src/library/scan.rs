//! Clip directory enumeration.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::clip_key;

/// File extensions the playback decoder understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac"];

/// One candidate file found in the clip directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    /// File stem, used as the initial display name.
    pub display_name: String,
    pub path: PathBuf,
}

/// Returns `true` when `path` has one of [`SUPPORTED_EXTENSIONS`]
/// (case-insensitive).
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// List supported audio files in `dir`, sorted by file name.
///
/// A missing directory yields an empty list.  Subdirectories, unreadable
/// entries and files with non-UTF-8 names are skipped.
///
/// Clip identity is the case-folded stem, so `Funny Clip.mp3` and
/// `funny clip.wav` compete for one slot: the most recently modified file
/// wins, ties go to the first in name order.
pub fn scan_clip_dir(dir: &Path) -> io::Result<Vec<ScannedFile>> {
    let mut files = audio_files(dir)?;
    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));

    let mut kept: Vec<(ScannedFile, Option<SystemTime>)> = Vec::with_capacity(files.len());
    for file in files {
        let modified = modified_at(&file.path);
        let key = clip_key(&file.display_name);
        match kept.iter_mut().find(|(k, _)| clip_key(&k.display_name) == key) {
            Some(slot) if modified > slot.1 => {
                log::warn!(
                    "{} shadows older {}",
                    file.path.display(),
                    slot.0.path.display()
                );
                *slot = (file, modified);
            }
            Some(slot) => log::warn!(
                "{} ignored, {} has the same name",
                file.path.display(),
                slot.0.path.display()
            ),
            None => kept.push((file, modified)),
        }
    }

    Ok(kept.into_iter().map(|(file, _)| file).collect())
}

/// Every supported audio file in `dir` whose stem matches `display_name`
/// case-insensitively, in any extension.
pub fn same_stem_files(dir: &Path, display_name: &str) -> io::Result<Vec<PathBuf>> {
    let key = clip_key(display_name);
    Ok(audio_files(dir)?
        .into_iter()
        .filter(|f| clip_key(&f.display_name) == key)
        .map(|f| f.path)
        .collect())
}

fn audio_files(dir: &Path) -> io::Result<Vec<ScannedFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !is_supported_audio(&path) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            log::debug!("skipping non-UTF-8 file name {}", path.display());
            continue;
        };
        files.push(ScannedFile {
            display_name: stem.to_string(),
            path,
        });
    }
    Ok(files)
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
