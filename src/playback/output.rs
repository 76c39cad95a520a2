//! Output device enumeration and stream setup via `cpal`.
//!
//! [`open_output`] builds a stream on the requested [`OutputTarget`] whose
//! callback pulls from a shared [`Mixer`].  The returned [`OutputStream`] is
//! a RAII guard: dropping it stops the hardware stream.
//!
//! A [`OutputTarget::VirtualSink`] stream is opened on the `pulse` ALSA
//! device, so it shows up as a sink input of this process.  Moving it onto
//! the sink is the route controller's job (`pactl move-sink-input`).

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use thiserror::Error;

use super::mixer::Mixer;

/// Label shown for the host's default output device.
pub const SYSTEM_DEFAULT_DEVICE: &str = "System Default";

/// ALSA device provided by the PulseAudio/PipeWire plugin.
const PULSE_DEVICE: &str = "pulse";

// ---------------------------------------------------------------------------
// OutputTarget
// ---------------------------------------------------------------------------

/// Where the engine's output stream goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// The host's default output device.
    Default,
    /// A physical device, by the name cpal reports.
    Device(String),
    /// A sound-server sink, by sink name.
    VirtualSink(String),
}

impl OutputTarget {
    /// Map a device-list label back to a target.
    pub fn from_label(label: &str) -> Self {
        if label.is_empty() || label == SYSTEM_DEFAULT_DEVICE {
            Self::Default
        } else {
            Self::Device(label.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// OutputError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output device '{0}' not found")]
    NoDevice(String),

    #[error("failed to query output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported output sample format {0:?}")]
    SampleFormat(SampleFormat),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// OutputStream
// ---------------------------------------------------------------------------

/// Live output stream plus the format clips must be converted to.
pub struct OutputStream {
    _stream: cpal::Stream,
    pub sample_rate: u32,
    pub channels: u16,
    pub device_name: String,
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("device_name", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Output device labels with [`SYSTEM_DEFAULT_DEVICE`] first.
pub fn list_output_devices() -> Vec<String> {
    let mut devices = vec![SYSTEM_DEFAULT_DEVICE.to_string()];
    let host = cpal::default_host();

    match host.output_devices() {
        Ok(iter) => {
            for device in iter {
                if let Ok(name) = device.name() {
                    if !devices.contains(&name) {
                        devices.push(name);
                    }
                }
            }
        }
        Err(e) => log::warn!("cannot enumerate output devices: {e}"),
    }

    devices
}

fn find_output_device(host: &cpal::Host, name: &str) -> Option<cpal::Device> {
    host.output_devices()
        .ok()?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
}

fn resolve_device(target: &OutputTarget) -> Result<cpal::Device, OutputError> {
    let host = cpal::default_host();

    match target {
        OutputTarget::Default => host
            .default_output_device()
            .ok_or_else(|| OutputError::NoDevice(SYSTEM_DEFAULT_DEVICE.into())),
        OutputTarget::Device(name) => {
            find_output_device(&host, name).ok_or_else(|| OutputError::NoDevice(name.clone()))
        }
        OutputTarget::VirtualSink(sink) => {
            find_output_device(&host, PULSE_DEVICE)
                .or_else(|| host.default_output_device())
                .ok_or_else(|| OutputError::NoDevice(sink.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// open_output
// ---------------------------------------------------------------------------

/// Open and start a stream on `target` fed by `mixer`.
pub fn open_output(
    target: &OutputTarget,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<OutputStream, OutputError> {
    let device = resolve_device(target)?;
    let device_name = device.name().unwrap_or_else(|_| "<unnamed>".into());

    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
        other => return Err(OutputError::SampleFormat(other)),
    };
    stream.play()?;

    log::info!("output open on '{device_name}' ({sample_rate} Hz x{channels}, {target:?})");

    Ok(OutputStream {
        _stream: stream,
        sample_rate,
        channels,
        device_name,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream, OutputError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            match mixer.lock() {
                Ok(mut m) => m.fill(&mut scratch),
                Err(_) => scratch.fill(0.0),
            }
            for (dst, &src) in data.iter_mut().zip(&scratch) {
                *dst = T::from_sample(src);
            }
        },
        |err: cpal::StreamError| {
            log::error!("cpal output stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_label_maps_to_default_target() {
        assert_eq!(OutputTarget::from_label("System Default"), OutputTarget::Default);
        assert_eq!(OutputTarget::from_label(""), OutputTarget::Default);
        assert_eq!(
            OutputTarget::from_label("Headphones"),
            OutputTarget::Device("Headphones".into())
        );
    }

    #[test]
    fn device_list_starts_with_system_default() {
        let devices = list_output_devices();
        assert_eq!(devices.first().map(String::as_str), Some(SYSTEM_DEFAULT_DEVICE));
    }
}
