//! Host audio output
//!
//! Opens a stereo f32 output stream on the best available host API and
//! feeds it from the playback ring buffer. Host preference, device lookup
//! and stream construction live in the submodules; the rest of the crate
//! only sees [`open_output_stream`] and the [`OutputStream`] handle.

mod backend;
mod device;
mod error;

pub use backend::{open_output_stream, OutputStream};
pub use device::select_output_host;
pub use error::{AudioError, AudioResult};
