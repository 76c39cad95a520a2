//! Sound library — clips, categories, favorites and hotkey bindings.
//!
//! [`ClipStore`] is pure data plus invariants.  Its only contact with the
//! filesystem is [`ClipStore::load`], which enumerates the clip directory
//! and asks a caller-supplied hook (normally the playback engine's decoder)
//! whether each file is usable.
//!
//! # Invariants
//!
//! * Clip identity is the case-folded display name: no two clips differ
//!   only in case.
//! * `"All"` and `"Uncategorized"` always exist and cannot be deleted.
//! * Every clip's category is a listed category or `"Uncategorized"`.
//! * The stop token (`"space"`) is never bound to a clip.

pub mod scan;
pub mod store;

pub use scan::{
    is_supported_audio, same_stem_files, scan_clip_dir, ScannedFile, SUPPORTED_EXTENSIONS,
};
pub use store::{ClipStore, LoadReport};

use std::path::PathBuf;

use thiserror::Error;

/// Virtual category that matches every clip.
pub const ALL_CATEGORY: &str = "All";
/// Default category and fallback for clips whose category was deleted.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Returns `true` for the two categories that can never be deleted.
pub fn is_system_category(name: &str) -> bool {
    name == ALL_CATEGORY || name == UNCATEGORIZED
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

/// A snapshot view of one clip in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// Lowercase display name, used for hotkey lookup.
    pub key: String,
    /// Original-case name shown on the button.
    pub display_name: String,
    /// Location of the audio file.
    pub path: PathBuf,
    /// Category the clip is filed under.
    pub category: String,
    /// Whether the clip is pinned to the top of every listing.
    pub favorite: bool,
}

/// Case-fold a display name into the key used for hotkey targets.
pub fn clip_key(display_name: &str) -> String {
    display_name.to_lowercase()
}

// ---------------------------------------------------------------------------
// LibraryError
// ---------------------------------------------------------------------------

/// Rejected library mutations.  None of these leave the store modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    #[error("the system category '{0}' cannot be deleted")]
    ProtectedCategory(String),

    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    #[error("unknown clip '{0}'")]
    UnknownClip(String),

    #[error("'{0}' is reserved for stop-all and cannot be bound to a clip")]
    ReservedToken(String),

    #[error("hotkey must not be empty")]
    InvalidToken,

    #[error("category name must not be empty")]
    InvalidName,
}
