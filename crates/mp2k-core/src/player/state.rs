//! Transport state and speed factor
//!
//! Both values are shared between the control thread and the mixer thread as
//! plain atomics; there is no lock anywhere on the transport path.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

/// Transport state of the player.
///
/// The control thread requests transitions through the facade's transition
/// tables; the mixer thread drives `Restart -> Playing` and every entry into
/// `Terminated`. The discriminants are the wire format of
/// [`AtomicPlayerState`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No mixer thread exists. Initial state, and the state after a
    /// completed stop.
    ThreadDeleted = 0,
    Playing = 1,
    Paused = 2,
    /// The mixer thread will rebuild its generator and resume playing.
    Restart = 3,
    /// The mixer thread has been asked to exit.
    Shutdown = 4,
    /// The mixer thread has exited but has not been joined yet.
    Terminated = 5,
}

impl PlayerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlayerState::ThreadDeleted,
            1 => PlayerState::Playing,
            2 => PlayerState::Paused,
            3 => PlayerState::Restart,
            4 => PlayerState::Shutdown,
            5 => PlayerState::Terminated,
            // Only `store` below writes this cell.
            _ => unreachable!("corrupt player state: {value}"),
        }
    }
}

/// Lock-free cell holding a [`PlayerState`].
#[derive(Debug)]
pub struct AtomicPlayerState(AtomicU8);

impl AtomicPlayerState {
    pub fn new() -> Self {
        Self(AtomicU8::new(PlayerState::ThreadDeleted as u8))
    }

    pub fn load(&self) -> PlayerState {
        PlayerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: PlayerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for AtomicPlayerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Unity playback speed in fixed-point units.
pub const SPEED_FACTOR_UNITY: i32 = 64;
const SPEED_FACTOR_MIN: i32 = 1;
const SPEED_FACTOR_MAX: i32 = 1024;

/// Fixed-point playback speed control, 64 = real time.
///
/// Written by the control thread, read by the mixer thread once per block
/// and forwarded to the generator as a float ratio.
#[derive(Debug)]
pub struct SpeedFactor(AtomicI32);

impl SpeedFactor {
    pub fn new() -> Self {
        Self(AtomicI32::new(SPEED_FACTOR_UNITY))
    }

    /// Double the speed, saturating at 16x.
    pub fn double(&self) {
        let next = (self.0.load(Ordering::Acquire) << 1).min(SPEED_FACTOR_MAX);
        self.0.store(next, Ordering::Release);
    }

    /// Halve the speed, saturating at 1/64x.
    pub fn halve(&self) {
        let next = (self.0.load(Ordering::Acquire) >> 1).max(SPEED_FACTOR_MIN);
        self.0.store(next, Ordering::Release);
    }

    pub fn factor(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    /// The time-scaling multiplier handed to the generator.
    pub fn ratio(&self) -> f32 {
        self.factor() as f32 / SPEED_FACTOR_UNITY as f32
    }
}

impl Default for SpeedFactor {
    fn default() -> Self {
        Self::new()
    }
}
