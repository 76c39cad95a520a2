//! Clip playback — decode → convert → mix → cpal output.
//!
//! # Architecture
//!
//! ```text
//!  load(key, path) ──▶ decode_file ──▶ remix_channels + resample
//!                                              │
//!  play(key) ─────────────────────────▶ Mixer::start (Arc<Mutex<Mixer>>)
//!                                              │
//!                              cpal callback ◀─┘ Mixer::fill
//! ```
//!
//! Everything outside this module talks to the [`Playback`] trait so the
//! controller and hotkey dispatch can be tested without an audio device.

pub mod decode;
pub mod engine;
pub mod mixer;
pub mod output;
pub mod resample;

#[cfg(test)]
mod mock;

use std::path::Path;

use thiserror::Error;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use decode::{decode_file, DecodeError, DecodedAudio};
pub use engine::PlaybackEngine;
pub use mixer::Mixer;
pub use output::{list_output_devices, OutputTarget, SYSTEM_DEFAULT_DEVICE};

#[cfg(test)]
pub use mock::MockPlayback;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Failures scoped to one playback call.  None of them stop other voices.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("clip '{0}' is not loaded")]
    NotLoaded(String),

    #[error("no audio output is open")]
    NoOutput,

    #[error("cannot open audio output: {0}")]
    Output(String),
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Polyphonic clip player keyed by clip display name.
pub trait Playback {
    /// Decode `path` and keep it under `key`, replacing any previous entry.
    fn load(&mut self, key: &str, path: &Path) -> Result<(), PlaybackError>;

    /// Forget a decoded clip.  Unknown keys are ignored.
    fn unload(&mut self, key: &str);

    fn is_loaded(&self, key: &str) -> bool;

    /// Re-decode after the clip's file changed.
    fn reload(&mut self, key: &str, path: &Path) -> Result<(), PlaybackError> {
        self.unload(key);
        self.load(key, path)
    }

    /// Start a new voice; overlaps with everything already playing.
    fn play(&mut self, key: &str) -> Result<(), PlaybackError>;

    /// Halt every in-flight voice.
    fn stop_all(&mut self);

    /// Master volume in `[0, 1]`, applied to current and future voices.
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    /// (Re)open the output stream on `target`.  On failure no stream is
    /// open and [`Playback::play`] reports [`PlaybackError::NoOutput`].
    fn open_output(&mut self, target: &OutputTarget) -> Result<(), PlaybackError>;

    fn has_output(&self) -> bool;

    /// Output device labels, [`SYSTEM_DEFAULT_DEVICE`] first.
    fn output_devices(&self) -> Vec<String>;
}
