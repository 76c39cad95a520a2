//! Sample-rate and channel conversion.
//!
//! Clips are converted once at load time to the output stream's format so
//! the mixer callback only has to sum and scale.
//!
//! 1. [`remix_channels`] — map any interleaved channel count to another.
//! 2. [`resample`] — sinc resampling via `rubato`, with a linear-interpolation
//!    fallback when the resampler cannot be constructed.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Frames handed to the sinc resampler per call.
const CHUNK_FRAMES: usize = 4096;

// ---------------------------------------------------------------------------
// remix_channels
// ---------------------------------------------------------------------------

/// Convert interleaved audio from `from` channels to `to` channels.
///
/// * mono → N duplicates the single channel into every output channel.
/// * N → mono averages all channels.
/// * otherwise channels are copied by index; missing ones repeat the last
///   source channel and extra ones are dropped.
pub fn remix_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }
    if from == 0 || to == 0 {
        return Vec::new();
    }

    let from = from as usize;
    let to = to as usize;
    let mut out = Vec::with_capacity(samples.len() / from * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                out.push(frame[ch.min(from - 1)]);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample interleaved `samples` from `from_rate` to `to_rate`.
///
/// The output holds `ceil(frames * to_rate / from_rate)` frames.
pub fn resample(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || channels == 0 {
        return samples.to_vec();
    }

    match resample_sinc(samples, channels, from_rate, to_rate) {
        Ok(out) => out,
        Err(e) => {
            log::warn!("sinc resampler unavailable ({e}); using linear interpolation");
            resample_linear(samples, channels, from_rate, to_rate)
        }
    }
}

fn output_frames(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    (frames as f64 * to_rate as f64 / from_rate as f64).ceil() as usize
}

fn resample_sinc(
    samples: &[f32],
    channels: u16,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, String> {
    let ch = channels as usize;
    let frames = samples.len() / ch;
    let ratio = to_rate as f64 / from_rate as f64;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
        oversampling_factor: 128,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, ch)
        .map_err(|e| e.to_string())?;

    // De-interleave, padding so the resampler's delay is flushed too.
    let delay = resampler.output_delay();
    let tail = (delay as f64 / ratio).ceil() as usize + CHUNK_FRAMES;
    let padded = (frames + tail).div_ceil(CHUNK_FRAMES) * CHUNK_FRAMES;
    let mut planar = vec![vec![0.0_f32; padded]; ch];
    for (i, frame) in samples.chunks_exact(ch).enumerate() {
        for (c, &s) in frame.iter().enumerate() {
            planar[c][i] = s;
        }
    }

    let mut out_planar: Vec<Vec<f32>> = vec![Vec::new(); ch];
    for start in (0..padded).step_by(CHUNK_FRAMES) {
        let chunk: Vec<&[f32]> = planar
            .iter()
            .map(|p| &p[start..start + CHUNK_FRAMES])
            .collect();
        let processed = resampler.process(&chunk, None).map_err(|e| e.to_string())?;
        for (dst, src) in out_planar.iter_mut().zip(processed) {
            dst.extend(src);
        }
    }

    let wanted = output_frames(frames, from_rate, to_rate);
    let mut out = Vec::with_capacity(wanted * ch);
    for i in delay..delay + wanted {
        for plane in &out_planar {
            out.push(plane.get(i).copied().unwrap_or(0.0));
        }
    }
    Ok(out)
}

/// Linear interpolation between adjacent frames.
pub fn resample_linear(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || channels == 0 {
        return samples.to_vec();
    }

    let ch = channels as usize;
    let frames = samples.len() / ch;
    let ratio = to_rate as f64 / from_rate as f64;
    let out_frames = output_frames(frames, from_rate, to_rate);
    let mut output = Vec::with_capacity(out_frames * ch);

    for i in 0..out_frames {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        for c in 0..ch {
            let sample = if idx + 1 < frames {
                samples[idx * ch + c] * (1.0 - frac) + samples[(idx + 1) * ch + c] * frac
            } else if idx < frames {
                samples[idx * ch + c]
            } else {
                0.0
            };
            output.push(sample);
        }
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
