//! Stream generator contract
//!
//! The generator is the sequence decoder and synthesizer: it pulls musical
//! time forward one block at a time and emits per-track stereo audio. Its
//! DSP internals live outside this crate; the playback core only depends on
//! the interface below.
//!
//! Generators are rebuilt in two places — by the player facade while the
//! mixer thread is stopped, and by the mixer thread itself when a running
//! song is restarted — so construction goes through a [`GeneratorFactory`]
//! shared between both.

use crate::config::{GameConfig, ReverbType};
use crate::sequence::Sequence;
use crate::types::StereoBuffer;

/// Synthesis parameters handed to every generator, taken from the game
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    /// Master PCM volume (0-15).
    pub pcm_vol: u8,
    /// Reverb level override (0-127).
    pub engine_rev: u8,
    /// Mixing frequency table index of the game's engine.
    pub engine_freq: u8,
    /// Reverb algorithm the game shipped with.
    pub rev_type: ReverbType,
    /// Maximum number of tracks a sequence may allocate.
    pub track_limit: u8,
}

impl EngineParams {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            pcm_vol: config.pcm_vol,
            engine_rev: config.engine_rev,
            engine_freq: config.engine_freq,
            rev_type: config.rev_type,
            track_limit: config.effective_track_limit(),
        }
    }
}

/// One-block-at-a-time synthesis driver.
///
/// The mixer thread is the only caller of [`process_and_get_audio`]
/// (musical time must advance exactly once per block); the remaining
/// accessors are cheap state reads. A generator is not expected to fail
/// during steady-state rendering — if it panics, the mixer thread treats
/// that as fatal and terminates.
///
/// [`process_and_get_audio`]: StreamGenerator::process_and_get_audio
pub trait StreamGenerator: Send {
    /// Output sample rate the generator renders at. Fixed per instance and
    /// used to open the host audio stream.
    fn render_sample_rate(&self) -> u32;

    /// Frames per emitted block. Constant across the generator's life.
    fn buffer_unit_count(&self) -> usize;

    /// Advance musical time by one block and return one stereo buffer per
    /// track, each [`buffer_unit_count`](Self::buffer_unit_count) frames long.
    fn process_and_get_audio(&mut self) -> Vec<StereoBuffer>;

    /// True once the sequence has played its configured loop count.
    fn has_stream_ended(&self) -> bool;

    /// Update internal time scaling. The mixer thread forwards the shared
    /// speed setting here once per block.
    fn set_speed_factor(&mut self, ratio: f32);

    /// The live view of the song for the UI.
    fn working_sequence(&self) -> &Sequence;

    fn working_sequence_mut(&mut self) -> &mut Sequence;

    /// Number of currently sounding voices.
    fn active_channel_count(&self) -> usize;
}

/// Builder for fresh generators.
///
/// `speed_ratio` is the time-scaling multiplier (1.0 = real time) in effect
/// at construction; later changes arrive through
/// [`StreamGenerator::set_speed_factor`].
pub trait GeneratorFactory: Send + Sync {
    fn create(
        &self,
        song_pos: usize,
        params: &EngineParams,
        max_loops: u8,
        speed_ratio: f32,
    ) -> Box<dyn StreamGenerator>;
}
