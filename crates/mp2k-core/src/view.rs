//! Track view push interface
//!
//! The terminal UI lives outside this crate; the player facade pushes
//! display state into whatever implements [`TrackView`]. Called from the
//! control thread only.

use crate::sequence::Sequence;

pub trait TrackView {
    /// Receive a display update.
    ///
    /// `vols` holds `seq.track_count() * 2` entries, interleaved per track
    /// as [L, R]. `cursor` optionally selects a highlighted track row.
    fn set_state(
        &mut self,
        seq: &Sequence,
        vols: &[f32],
        active_channels: usize,
        cursor: Option<usize>,
    );
}
