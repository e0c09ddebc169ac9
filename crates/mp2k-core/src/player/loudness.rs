//! VU loudness estimation
//!
//! A one-pole lowpass over the squared signal gives an RMS-style envelope
//! per channel; [`LoudnessCalculator::get_loudness`] converts it to the
//! peak-equivalent amplitude (RMS times sqrt 2, assuming a sinusoid) that a
//! volume meter expects.
//!
//! The calculators themselves are plain state owned by the mixer thread.
//! Publication to the control thread goes through [`MeterLevels`], a pair of
//! relaxed atomic cells — meters are indicative, not authoritative, so
//! slightly stale reads are fine and no lock ever sits on the audio path.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::{StereoSample, STREAM_SAMPLE_RATE};

/// Lowpass cutoff for the master VU meter (Hz).
pub const MASTER_VU_LOWPASS_HZ: f32 = 20.0;

/// Lowpass cutoff for the per-track VU meters (Hz). Slower, so short notes
/// stay readable in the track view.
pub const TRACK_VU_LOWPASS_HZ: f32 = 5.0;

/// One-pole lowpassed squared-envelope follower for one stereo stream.
#[derive(Debug, Clone)]
pub struct LoudnessCalculator {
    alpha: f32,
    left_sq: f32,
    right_sq: f32,
}

impl LoudnessCalculator {
    /// Create a follower with the given lowpass cutoff frequency.
    pub fn new(lowpass_hz: f32) -> Self {
        let rc = 1.0 / (lowpass_hz * 2.0 * std::f32::consts::PI);
        let dt = 1.0 / STREAM_SAMPLE_RATE as f32;
        Self {
            alpha: dt / (rc + dt),
            left_sq: 0.0,
            right_sq: 0.0,
        }
    }

    /// Fold one block of audio into the envelope.
    pub fn calc_loudness(&mut self, audio: &[StereoSample]) {
        for frame in audio {
            let l = frame.left * frame.left;
            let r = frame.right * frame.right;
            self.left_sq += self.alpha * (l - self.left_sq);
            self.right_sq += self.alpha * (r - self.right_sq);
        }
    }

    /// Current peak-equivalent amplitude per channel.
    pub fn get_loudness(&self) -> (f32, f32) {
        (
            self.left_sq.sqrt() * std::f32::consts::SQRT_2,
            self.right_sq.sqrt() * std::f32::consts::SQRT_2,
        )
    }

    pub fn reset(&mut self) {
        self.left_sq = 0.0;
        self.right_sq = 0.0;
    }
}

/// Lock-free meter cell the mixer thread publishes into after each block.
///
/// Stores the f32 bit patterns in atomics; relaxed ordering is enough for a
/// display value.
#[derive(Debug)]
pub struct MeterLevels {
    left: AtomicU32,
    right: AtomicU32,
}

impl MeterLevels {
    pub fn new() -> Self {
        Self {
            left: AtomicU32::new(0.0f32.to_bits()),
            right: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    pub fn store(&self, left: f32, right: f32) {
        self.left.store(left.to_bits(), Ordering::Relaxed);
        self.right.store(right.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> (f32, f32) {
        (
            f32::from_bits(self.left.load(Ordering::Relaxed)),
            f32::from_bits(self.right.load(Ordering::Relaxed)),
        )
    }
}

impl Default for MeterLevels {
    fn default() -> Self {
        Self::new()
    }
}
