//! Mixer thread
//!
//! One worker lives per play lifetime. Each iteration reads the transport
//! state exactly once and dispatches on that copy — a concurrent transition
//! may change the next iteration, never the current one. While playing, the
//! worker pulls one block from the generator, meters and mixes the tracks,
//! and pushes the master block into the ring buffer; the blocking `put` is
//! what keeps it in lockstep with the audio device. While paused it pushes
//! silence so the device keeps pacing it.
//!
//! The worker holds no lock during synthesis; the only suspension point is
//! the ring buffer's not-full wait.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::generator::{EngineParams, GeneratorFactory, StreamGenerator};
use crate::sequence::Sequence;
use crate::types::{StereoBuffer, MAX_LOOPS, N_CHANNELS};

use super::loudness::{LoudnessCalculator, MeterLevels, MASTER_VU_LOWPASS_HZ, TRACK_VU_LOWPASS_HZ};
use super::ring_buffer::RingBuffer;
use super::state::{AtomicPlayerState, PlayerState, SpeedFactor};

/// Everything the mixer thread shares with the facade.
pub(crate) struct WorkerContext {
    pub state: Arc<AtomicPlayerState>,
    pub speed: Arc<SpeedFactor>,
    pub muted_tracks: Arc<Vec<AtomicBool>>,
    pub ring: Arc<RingBuffer>,
    pub master_meter: Arc<MeterLevels>,
    pub track_meters: Arc<Vec<MeterLevels>>,
    pub active_channels: Arc<AtomicUsize>,
    pub view: Arc<Mutex<Sequence>>,
    pub factory: Arc<dyn GeneratorFactory>,
    pub params: EngineParams,
    pub song_pos: usize,
}

#[derive(Debug, thiserror::Error)]
enum WorkerError {
    #[error("mixer thread dispatched on impossible state {0:?}")]
    ImpossibleState(PlayerState),
}

enum BlockOutcome {
    Continue,
    StreamEnded,
}

/// Thread entry point. Always leaves the shared state flushed and the
/// transport in `Terminated`, even if the loop dies.
pub(crate) fn run(ctx: WorkerContext, generator: Box<dyn StreamGenerator>) {
    log::debug!("mixer thread started");

    // A generator panic must not take the meters or transport down with it.
    match panic::catch_unwind(AssertUnwindSafe(|| worker_loop(&ctx, generator))) {
        Ok(Ok(())) => log::debug!("mixer thread finished"),
        Ok(Err(e)) => log::error!("fatal error on mixer thread: {e}"),
        Err(_) => log::error!("mixer thread panicked"),
    }

    ctx.master_meter.store(0.0, 0.0);
    for meter in ctx.track_meters.iter() {
        meter.store(0.0, 0.0);
    }
    ctx.active_channels.store(0, Ordering::Relaxed);
    ctx.ring.clear();
    ctx.state.store(PlayerState::Terminated);
}

fn worker_loop(
    ctx: &WorkerContext,
    mut generator: Box<dyn StreamGenerator>,
) -> Result<(), WorkerError> {
    let n_frames = generator.buffer_unit_count();
    let silence = vec![0.0f32; n_frames * N_CHANNELS];
    let mut master = StereoBuffer::silence(n_frames);
    let mut master_vu = LoudnessCalculator::new(MASTER_VU_LOWPASS_HZ);
    let mut track_vu: Vec<LoudnessCalculator> = (0..ctx.track_meters.len())
        .map(|_| LoudnessCalculator::new(TRACK_VU_LOWPASS_HZ))
        .collect();

    loop {
        // One load per iteration; every branch below works on this copy.
        let snapshot = ctx.state.load();
        match snapshot {
            PlayerState::Shutdown => break,
            PlayerState::Restart => {
                generator = ctx.factory.create(
                    ctx.song_pos,
                    &ctx.params,
                    MAX_LOOPS,
                    ctx.speed.ratio(),
                );
                ctx.state.store(PlayerState::Playing);
                // fall through into the block we just became responsible for
                if let BlockOutcome::StreamEnded =
                    render_block(ctx, &mut generator, &mut master, &mut master_vu, &mut track_vu)
                {
                    ctx.state.store(PlayerState::Shutdown);
                    break;
                }
            }
            PlayerState::Playing => {
                if let BlockOutcome::StreamEnded =
                    render_block(ctx, &mut generator, &mut master, &mut master_vu, &mut track_vu)
                {
                    ctx.state.store(PlayerState::Shutdown);
                    break;
                }
            }
            // Still pace against the device so the callback keeps finding
            // valid data and resume stays glitch-free.
            PlayerState::Paused => ctx.ring.put(&silence),
            PlayerState::ThreadDeleted | PlayerState::Terminated => {
                return Err(WorkerError::ImpossibleState(snapshot));
            }
        }
    }

    Ok(())
}

/// Render, meter and mix one block, then push it to the ring buffer.
fn render_block(
    ctx: &WorkerContext,
    generator: &mut Box<dyn StreamGenerator>,
    master: &mut StereoBuffer,
    master_vu: &mut LoudnessCalculator,
    track_vu: &mut [LoudnessCalculator],
) -> BlockOutcome {
    master.fill_silence();
    generator.set_speed_factor(ctx.speed.ratio());

    let tracks = generator.process_and_get_audio();
    let seq = generator.working_sequence_mut();
    for (i, track_buf) in tracks.iter().enumerate() {
        let muted = ctx
            .muted_tracks
            .get(i)
            .map(|m| m.load(Ordering::Relaxed))
            .unwrap_or(false);

        // The mute flag is mirrored onto the working sequence so the UI can
        // show it, and metering happens before muting so a muted track still
        // moves its meter.
        if let Some(track) = seq.tracks_mut().get_mut(i) {
            track.muted = muted;
        }
        if let Some(vu) = track_vu.get_mut(i) {
            vu.calc_loudness(track_buf.as_slice());
            if let Some(meter) = ctx.track_meters.get(i) {
                let (l, r) = vu.get_loudness();
                meter.store(l, r);
            }
        }
        if !muted {
            master.add_buffer(track_buf);
        }
    }

    // Blocks until the device has drained enough; this is the thread's clock.
    ctx.ring.put(master.as_interleaved());

    master_vu.calc_loudness(master.as_slice());
    let (l, r) = master_vu.get_loudness();
    ctx.master_meter.store(l, r);
    ctx.active_channels
        .store(generator.active_channel_count(), Ordering::Relaxed);
    if let Ok(mut view) = ctx.view.lock() {
        *view = generator.working_sequence().clone();
    }

    if generator.has_stream_ended() {
        BlockOutcome::StreamEnded
    } else {
        BlockOutcome::Continue
    }
}
