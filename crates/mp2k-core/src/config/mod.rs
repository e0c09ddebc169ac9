//! Per-game engine configuration
//!
//! Each game ships its MP2K engine with slightly different mixdown settings
//! (PCM master volume, reverb, mixing frequency). The values here are what
//! the ROM reader detects or the user overrides, stored as YAML under the
//! user config directory.

mod io;

pub use io::{load_or_default, save};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Upper bound on the per-song track count the engine supports.
pub const MAX_TRACKS: u8 = 16;

/// Reverb algorithm variant of a game's engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverbType {
    /// The stock engine reverb.
    #[default]
    Normal,
    /// First-revision GS reverb.
    Gs1,
    /// Second-revision GS reverb.
    Gs2,
    /// Reverb disabled.
    None,
}

/// Engine settings for one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Master PCM volume (0-15).
    pub pcm_vol: u8,
    /// Reverb level (0-127).
    pub engine_rev: u8,
    /// Mixing frequency table index.
    pub engine_freq: u8,
    /// Reverb algorithm.
    pub rev_type: ReverbType,
    /// Track limit for sequences of this game (clamped to [`MAX_TRACKS`]).
    pub track_limit: u8,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            pcm_vol: 15,
            engine_rev: 0,
            engine_freq: 4,
            rev_type: ReverbType::Normal,
            track_limit: MAX_TRACKS,
        }
    }
}

impl GameConfig {
    /// Track limit clamped to the engine's supported range.
    pub fn effective_track_limit(&self) -> u8 {
        self.track_limit.clamp(1, MAX_TRACKS)
    }
}

/// Default location of the player configuration file:
/// `<user config dir>/mp2k/config.yaml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mp2k")
        .join("config.yaml")
}
