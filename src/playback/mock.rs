//! In-memory [`Playback`] test double.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use super::{DecodeError, OutputTarget, Playback, PlaybackError, SYSTEM_DEFAULT_DEVICE};

/// Records every call instead of producing sound.
#[derive(Debug)]
pub struct MockPlayback {
    pub loaded: BTreeSet<String>,
    pub played: Vec<String>,
    pub stop_count: usize,
    pub volume: f32,
    /// Every target passed to `open_output`, in call order.
    pub opened: Vec<OutputTarget>,
    pub current: Option<OutputTarget>,
    /// Physical devices reported after "System Default".
    pub devices: Vec<String>,
    /// Keys whose `load` fails with a decode error.
    pub undecodable: HashSet<String>,
    /// Targets whose `open_output` fails.
    pub broken_targets: Vec<OutputTarget>,
}

impl Default for MockPlayback {
    fn default() -> Self {
        Self {
            loaded: BTreeSet::new(),
            played: Vec::new(),
            stop_count: 0,
            volume: 0.7,
            opened: Vec::new(),
            current: Some(OutputTarget::Default),
            devices: Vec::new(),
            undecodable: HashSet::new(),
            broken_targets: Vec::new(),
        }
    }
}

impl MockPlayback {
    pub fn with_devices(devices: &[&str]) -> Self {
        Self {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl Playback for MockPlayback {
    fn load(&mut self, key: &str, path: &Path) -> Result<(), PlaybackError> {
        if self.undecodable.contains(key) {
            return Err(PlaybackError::Decode(DecodeError::Empty(PathBuf::from(path))));
        }
        self.loaded.insert(key.to_string());
        Ok(())
    }

    fn unload(&mut self, key: &str) {
        self.loaded.remove(key);
    }

    fn is_loaded(&self, key: &str) -> bool {
        self.loaded.contains(key)
    }

    fn play(&mut self, key: &str) -> Result<(), PlaybackError> {
        if !self.loaded.contains(key) {
            return Err(PlaybackError::NotLoaded(key.to_string()));
        }
        if self.current.is_none() {
            return Err(PlaybackError::NoOutput);
        }
        self.played.push(key.to_string());
        Ok(())
    }

    fn stop_all(&mut self) {
        self.stop_count += 1;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn open_output(&mut self, target: &OutputTarget) -> Result<(), PlaybackError> {
        self.opened.push(target.clone());
        if self.broken_targets.contains(target) {
            self.current = None;
            return Err(PlaybackError::Output(format!("{target:?} unavailable")));
        }
        self.current = Some(target.clone());
        Ok(())
    }

    fn has_output(&self) -> bool {
        self.current.is_some()
    }

    fn output_devices(&self) -> Vec<String> {
        let mut list = vec![SYSTEM_DEFAULT_DEVICE.to_string()];
        list.extend(self.devices.iter().cloned());
        list
    }
}
