//! Polyphonic voice mixer shared with the cpal output callback.
//!
//! The mixer knows nothing about devices: it sums every active voice into an
//! interleaved output buffer at the master gain.  Clip data must already be
//! in the stream's rate and channel layout.

use std::sync::Arc;

/// One in-flight playback of a clip.
#[derive(Debug)]
struct Voice {
    data: Arc<[f32]>,
    /// Next sample index (interleaved).
    pos: usize,
}

/// Sums voices into an output buffer.
#[derive(Debug)]
pub struct Mixer {
    voices: Vec<Voice>,
    gain: f32,
}

impl Mixer {
    pub fn new(gain: f32) -> Self {
        Self {
            voices: Vec::new(),
            gain: gain.clamp(0.0, 1.0),
        }
    }

    /// Start a new voice.  Existing voices keep playing.
    pub fn start(&mut self, data: Arc<[f32]>) {
        if !data.is_empty() {
            self.voices.push(Voice { data, pos: 0 });
        }
    }

    /// Drop every voice immediately.
    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    /// Master gain, applied to all voices including ones already playing.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Overwrite `out` with the mix of all voices and retire finished ones.
    pub fn fill(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        for voice in &mut self.voices {
            let remaining = &voice.data[voice.pos..];
            let n = remaining.len().min(out.len());
            for (dst, &src) in out.iter_mut().zip(&remaining[..n]) {
                *dst += src;
            }
            voice.pos += n;
        }
        self.voices.retain(|v| v.pos < v.data.len());

        let gain = self.gain;
        for s in out.iter_mut() {
            *s = (*s * gain).clamp(-1.0, 1.0);
        }
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
