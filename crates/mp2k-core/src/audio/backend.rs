//! Output stream bound to the playback ring buffer
//!
//! The data callback runs on the host driver's real-time thread. Its whole
//! job is one non-blocking [`RingBuffer::take`]: no allocation, no logging,
//! no fallible path. Underflow comes out as silence, so the callback is
//! infallible by construction.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, Stream, StreamConfig};

use crate::player::RingBuffer;
use crate::types::N_CHANNELS;

use super::device::{default_output_device, pick_output_config, select_output_host};
use super::error::{AudioError, AudioResult};

/// Largest callback buffer we pre-allocate demux scratch for (frames).
const MAX_CALLBACK_FRAMES: usize = 8192;

/// Handle keeping the output stream alive.
///
/// Dropping it stops and closes the stream; the ring buffer itself stays
/// alive through the `Arc` captured by the callback until then.
pub struct OutputStream {
    _stream: Stream,
    sample_rate: u32,
}

impl OutputStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Open and start an f32 output stream at `sample_rate` that drains `ring`.
///
/// The frames-per-buffer choice is left to the host API.
pub fn open_output_stream(sample_rate: u32, ring: Arc<RingBuffer>) -> AudioResult<OutputStream> {
    let host = select_output_host();
    let device = default_output_device(&host)?;
    log::info!(
        "using output device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let supported = pick_output_config(&device, sample_rate)?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?}",
            supported.sample_format()
        )));
    }

    let channels = supported.channels() as usize;
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: BufferSize::Default,
    };
    log::info!(
        "output stream: {} channels, {} Hz",
        config.channels,
        config.sample_rate.0
    );

    let mut scratch = vec![0.0f32; MAX_CALLBACK_FRAMES * N_CHANNELS];
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                if channels == N_CHANNELS {
                    ring.take(data);
                    return;
                }
                // Devices with more than two channels get the stereo pair in
                // the first two slots and silence in the rest.
                let frames = data.len() / channels;
                let wanted = (frames * N_CHANNELS).min(scratch.len());
                ring.take(&mut scratch[..wanted]);
                for (frame, pair) in data
                    .chunks_mut(channels)
                    .zip(scratch[..wanted].chunks(N_CHANNELS))
                {
                    frame[0] = pair[0];
                    frame[1] = pair[1];
                    for extra in frame.iter_mut().skip(N_CHANNELS) {
                        *extra = 0.0;
                    }
                }
            },
            move |err| {
                log::error!("audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    Ok(OutputStream {
        _stream: stream,
        sample_rate,
    })
}
