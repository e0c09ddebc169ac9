//! mp2k-core — real-time playback core for MP2K sequenced music
//!
//! Given a song from a handheld-console ROM image and a synthesizer for the
//! MP2K engine's byte code, this crate plays it: it owns the transport state
//! machine, the mixer thread that advances musical time and renders blocks,
//! the ring buffer feeding the host audio callback, and the VU metering the
//! UI displays.
//!
//! The sequence decoder/synthesizer itself is a collaborator behind the
//! [`generator::StreamGenerator`] trait, and the UI behind
//! [`view::TrackView`]; ROM parsing lives in sibling crates of the suite.
//!
//! # Threads
//!
//! The [`player::Player`] facade runs on the control thread. Playback adds a
//! mixer thread (paced by the blocking ring-buffer producer) and the host
//! library's callback thread (which only performs non-blocking reads). See
//! the `player` module docs for the full discipline.

pub mod audio;
pub mod config;
pub mod generator;
pub mod player;
pub mod sequence;
pub mod types;
pub mod view;

pub use types::*;
