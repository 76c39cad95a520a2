//! [`PlaybackEngine`] — the cpal-backed [`Playback`] implementation.
//!
//! Decoded clips are kept at their native format and converted to the
//! current stream's format on load and whenever the output is reopened, so
//! the real-time callback only sums pre-converted buffers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::decode::{decode_file, DecodedAudio};
use super::mixer::Mixer;
use super::output::{self, OutputStream, OutputTarget};
use super::resample::{remix_channels, resample};
use super::{Playback, PlaybackError};

struct LoadedClip {
    source: DecodedAudio,
    /// `source` converted to the open stream's format.
    converted: Option<Arc<[f32]>>,
}

/// Polyphonic clip player on a single cpal output stream.
pub struct PlaybackEngine {
    clips: HashMap<String, LoadedClip>,
    mixer: Arc<Mutex<Mixer>>,
    output: Option<OutputStream>,
    volume: f32,
}

impl PlaybackEngine {
    /// Create an engine with no output stream open.
    pub fn new(volume: f32) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        Self {
            clips: HashMap::new(),
            mixer: Arc::new(Mutex::new(Mixer::new(volume))),
            output: None,
            volume,
        }
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&mut Mixer) -> R) -> Option<R> {
        match self.mixer.lock() {
            Ok(mut m) => Some(f(&mut m)),
            Err(e) => {
                log::error!("mixer lock poisoned: {e}");
                None
            }
        }
    }

    fn convert(source: &DecodedAudio, output: &OutputStream) -> Arc<[f32]> {
        let remixed = remix_channels(&source.samples, source.channels, output.channels);
        let resampled = resample(
            &remixed,
            output.channels,
            source.sample_rate,
            output.sample_rate,
        );
        Arc::from(resampled)
    }

    fn reconvert_all(&mut self) {
        let Some(output) = &self.output else {
            for clip in self.clips.values_mut() {
                clip.converted = None;
            }
            return;
        };
        for clip in self.clips.values_mut() {
            clip.converted = Some(Self::convert(&clip.source, output));
        }
    }
}

impl Playback for PlaybackEngine {
    fn load(&mut self, key: &str, path: &Path) -> Result<(), PlaybackError> {
        let source = decode_file(path)?;
        let converted = self.output.as_ref().map(|o| Self::convert(&source, o));
        self.clips
            .insert(key.to_string(), LoadedClip { source, converted });
        Ok(())
    }

    fn unload(&mut self, key: &str) {
        self.clips.remove(key);
    }

    fn is_loaded(&self, key: &str) -> bool {
        self.clips.contains_key(key)
    }

    fn play(&mut self, key: &str) -> Result<(), PlaybackError> {
        let clip = self
            .clips
            .get(key)
            .ok_or_else(|| PlaybackError::NotLoaded(key.to_string()))?;
        let data = clip.converted.clone().ok_or(PlaybackError::NoOutput)?;
        self.with_mixer(|m| m.start(data));
        Ok(())
    }

    fn stop_all(&mut self) {
        self.with_mixer(Mixer::stop_all);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        let v = self.volume;
        self.with_mixer(|m| m.set_gain(v));
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn open_output(&mut self, target: &OutputTarget) -> Result<(), PlaybackError> {
        // Stop the old stream before opening the new one so both never pull
        // from the mixer at once.
        self.output = None;
        self.with_mixer(Mixer::stop_all);

        let result = output::open_output(target, Arc::clone(&self.mixer));
        match result {
            Ok(stream) => {
                self.output = Some(stream);
                self.reconvert_all();
                Ok(())
            }
            Err(e) => {
                self.reconvert_all();
                Err(PlaybackError::Output(e.to_string()))
            }
        }
    }

    fn has_output(&self) -> bool {
        self.output.is_some()
    }

    fn output_devices(&self) -> Vec<String> {
        output::list_output_devices()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
