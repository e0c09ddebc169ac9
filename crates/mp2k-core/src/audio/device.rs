//! Host and device selection
//!
//! Host APIs are tried in a fixed preference order — pro-audio servers
//! first, then the OS-native PCM API — before falling back to cpal's
//! platform default. A host only qualifies if it actually exposes a default
//! output device, so a JACK backend without a running server falls through
//! to the next entry.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId, SampleFormat, SupportedStreamConfig};

use super::error::{AudioError, AudioResult};

/// Preferred host APIs, most specific first. Anything not listed is reached
/// through the platform default fallback.
const HOST_PRIORITY: [&str; 3] = ["Jack", "Alsa", "Wasapi"];

/// Name of a host ID as cpal spells it (debug representation).
fn host_name(host_id: HostId) -> String {
    format!("{:?}", host_id)
}

/// Pick the output host by preference order, falling back to the default.
pub fn select_output_host() -> Host {
    for preferred in HOST_PRIORITY {
        for host_id in cpal::available_hosts() {
            if host_name(host_id) != preferred {
                continue;
            }
            match cpal::host_from_id(host_id) {
                Ok(host) => {
                    if host.default_output_device().is_some() {
                        log::info!("using {} host API", preferred);
                        return host;
                    }
                    log::debug!("{} host has no output device, skipping", preferred);
                }
                Err(e) => log::debug!("could not initialize {} host: {}", preferred, e),
            }
        }
    }

    let host = cpal::default_host();
    log::info!("using default host API {}", host_name(host.id()));
    host
}

/// The default output device of `host`.
pub fn default_output_device(host: &Host) -> AudioResult<cpal::Device> {
    host.default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice(host_name(host.id())))
}

/// Find an f32 stereo output configuration running at exactly
/// `sample_rate`.
pub fn pick_output_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> AudioResult<SupportedStreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported.is_empty() {
        return Err(AudioError::ConfigError(
            "no supported output configurations".to_string(),
        ));
    }

    let range = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0);

    match range {
        Some(range) => Ok(range.clone().with_sample_rate(cpal::SampleRate(sample_rate))),
        None => {
            // Distinguish "no f32 at all" from "rate out of range" for the log.
            if !supported.iter().any(|c| c.sample_format() == SampleFormat::F32) {
                Err(AudioError::UnsupportedFormat(format!(
                    "{:?}",
                    supported[0].sample_format()
                )))
            } else {
                Err(AudioError::ConfigError(format!(
                    "device does not support {} Hz stereo f32 output",
                    sample_rate
                )))
            }
        }
    }
}
