//! Real-time playback core
//!
//! Three threads cooperate during playback:
//!
//! - the **control thread** drives the [`Player`] facade and never blocks on
//!   audio I/O;
//! - the **mixer thread** (one per play lifetime) advances musical time,
//!   mixes the tracks and blocks on the ring buffer, which paces it to the
//!   hardware clock;
//! - the **audio callback thread** belongs to the host library and only ever
//!   performs the ring buffer's non-blocking `take`.
//!
//! All shared state is atomics plus the ring buffer's own lock; transitions
//! follow the transport table implemented in [`Player`].

mod loudness;
mod player;
mod ring_buffer;
mod state;
mod worker;

pub use loudness::{
    LoudnessCalculator, MeterLevels, MASTER_VU_LOWPASS_HZ, TRACK_VU_LOWPASS_HZ,
};
pub use player::Player;
pub use ring_buffer::RingBuffer;
pub use state::{AtomicPlayerState, PlayerState, SpeedFactor, SPEED_FACTOR_UNITY};
