//! Player facade
//!
//! Public entry point of the playback core. Owns the ring buffer, the
//! transport state, the mixer thread handle, the generator slot and the
//! host audio stream; every public operation runs on the control thread.
//!
//! Transport requests are written into the shared state cell and picked up
//! by the mixer thread at its next block boundary. The only place the
//! control thread waits is `stop`: a bounded poll while the worker finishes
//! a restart handover, and the join of an exiting worker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::audio::{open_output_stream, OutputStream};
use crate::config::GameConfig;
use crate::generator::{EngineParams, GeneratorFactory, StreamGenerator};
use crate::sequence::Sequence;
use crate::types::{MAX_LOOPS, N_CHANNELS, STREAM_BUF_SIZE};
use crate::view::TrackView;

use super::loudness::MeterLevels;
use super::ring_buffer::RingBuffer;
use super::state::{AtomicPlayerState, PlayerState, SpeedFactor};
use super::worker::{self, WorkerContext};

/// Poll interval while waiting for the worker to leave the restart handover.
const RESTART_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The playback engine facade.
///
/// Construction opens the host audio stream, which starts pulling (and
/// zero-filling) immediately; audio setup failure is logged and leaves a
/// facade whose transport still works but whose output reaches nothing.
pub struct Player {
    state: Arc<AtomicPlayerState>,
    speed: Arc<SpeedFactor>,
    ring: Arc<RingBuffer>,
    muted_tracks: Arc<Vec<AtomicBool>>,
    master_meter: Arc<MeterLevels>,
    track_meters: Arc<Vec<MeterLevels>>,
    active_channels: Arc<AtomicUsize>,
    view: Arc<Mutex<Sequence>>,
    factory: Arc<dyn GeneratorFactory>,
    params: EngineParams,
    song_pos: usize,
    /// Present exactly while no mixer thread owns it.
    generator: Option<Box<dyn StreamGenerator>>,
    worker: Option<thread::JoinHandle<()>>,
    view_sink: Option<Box<dyn TrackView>>,
    _stream: Option<OutputStream>,
}

impl Player {
    /// Create a player for the song at `song_pos` and start the output
    /// stream.
    pub fn new(config: &GameConfig, factory: Arc<dyn GeneratorFactory>, song_pos: usize) -> Self {
        Self::build(config, factory, song_pos, true)
    }

    /// Test constructor: same engine, no host audio.
    #[cfg(test)]
    pub(crate) fn headless(
        config: &GameConfig,
        factory: Arc<dyn GeneratorFactory>,
        song_pos: usize,
    ) -> Self {
        Self::build(config, factory, song_pos, false)
    }

    fn build(
        config: &GameConfig,
        factory: Arc<dyn GeneratorFactory>,
        song_pos: usize,
        with_audio: bool,
    ) -> Self {
        let params = EngineParams::from_config(config);
        let generator = factory.create(song_pos, &params, MAX_LOOPS, 1.0);
        let sample_rate = generator.render_sample_rate();
        let track_count = generator.working_sequence().track_count();

        let ring = Arc::new(RingBuffer::new(N_CHANNELS * STREAM_BUF_SIZE));
        let muted_tracks = Arc::new(
            (0..params.track_limit as usize)
                .map(|_| AtomicBool::new(false))
                .collect::<Vec<_>>(),
        );
        let track_meters = Arc::new(
            (0..track_count)
                .map(|_| MeterLevels::new())
                .collect::<Vec<_>>(),
        );
        let view = Arc::new(Mutex::new(generator.working_sequence().clone()));

        let stream = if with_audio {
            match open_output_stream(sample_rate, Arc::clone(&ring)) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    log::error!("audio setup failed: {e}; playback will be inaudible");
                    None
                }
            }
        } else {
            None
        };

        Self {
            state: Arc::new(AtomicPlayerState::new()),
            speed: Arc::new(SpeedFactor::new()),
            ring,
            muted_tracks,
            master_meter: Arc::new(MeterLevels::new()),
            track_meters,
            active_channels: Arc::new(AtomicUsize::new(0)),
            view,
            factory,
            params,
            song_pos,
            generator: Some(generator),
            worker: None,
            view_sink: None,
            _stream: stream,
        }
    }

    /// Install the UI sink that [`update_view`](Self::update_view) and
    /// [`load_song`](Self::load_song) push display state into.
    pub fn set_view(&mut self, view: Box<dyn TrackView>) {
        self.view_sink = Some(view);
    }

    /// Switch to the song at `song_pos`, resuming playback if a song was
    /// playing.
    pub fn load_song(&mut self, song_pos: usize) {
        let was_playing = self.state.load() == PlayerState::Playing;
        self.stop();

        self.song_pos = song_pos;
        let generator = self.build_generator();
        let track_count = generator.working_sequence().track_count();
        self.track_meters = Arc::new(
            (0..track_count)
                .map(|_| MeterLevels::new())
                .collect::<Vec<_>>(),
        );
        self.master_meter.store(0.0, 0.0);
        self.active_channels.store(0, Ordering::Relaxed);
        if let Ok(mut view) = self.view.lock() {
            *view = generator.working_sequence().clone();
        }
        log::info!(
            "loaded song at position {} ({} tracks)",
            song_pos,
            track_count
        );

        // Show the new song before its first block renders.
        if let Some(sink) = self.view_sink.as_mut() {
            let seq = generator.working_sequence().clone();
            sink.set_state(&seq, &vec![0.0; track_count * N_CHANNELS], 0, None);
        }

        self.generator = Some(generator);
        if was_playing {
            self.play();
        }
    }

    /// Start, resume or restart playback.
    pub fn play(&mut self) {
        match self.state.load() {
            // the worker is already mid-transition and will end up playing
            PlayerState::Restart | PlayerState::Shutdown => {}
            // restart the running song
            PlayerState::Playing => self.state.store(PlayerState::Restart),
            PlayerState::Paused => self.state.store(PlayerState::Playing),
            // the dead worker must be reaped before a new one can start
            PlayerState::Terminated => {
                self.stop();
                self.play();
            }
            PlayerState::ThreadDeleted => {
                let generator = self
                    .generator
                    .take()
                    .unwrap_or_else(|| self.build_generator());
                let ctx = WorkerContext {
                    state: Arc::clone(&self.state),
                    speed: Arc::clone(&self.speed),
                    muted_tracks: Arc::clone(&self.muted_tracks),
                    ring: Arc::clone(&self.ring),
                    master_meter: Arc::clone(&self.master_meter),
                    track_meters: Arc::clone(&self.track_meters),
                    active_channels: Arc::clone(&self.active_channels),
                    view: Arc::clone(&self.view),
                    factory: Arc::clone(&self.factory),
                    params: self.params.clone(),
                    song_pos: self.song_pos,
                };

                self.state.store(PlayerState::Playing);
                let spawned = thread::Builder::new()
                    .name("mp2k-mixer".to_string())
                    .spawn(move || worker::run(ctx, generator));
                match spawned {
                    Ok(handle) => self.worker = Some(handle),
                    Err(e) => {
                        log::error!("could not spawn mixer thread: {e}");
                        self.state.store(PlayerState::ThreadDeleted);
                    }
                }
            }
        }
    }

    /// Toggle between playing and paused. Starts playback when no worker
    /// exists.
    pub fn pause(&mut self) {
        match self.state.load() {
            PlayerState::Restart | PlayerState::Shutdown => {}
            PlayerState::Playing => self.state.store(PlayerState::Paused),
            PlayerState::Paused => self.state.store(PlayerState::Playing),
            PlayerState::Terminated => {}
            PlayerState::ThreadDeleted => self.play(),
        }
    }

    /// Stop playback, reap the mixer thread and prepare a fresh generator
    /// for the next play.
    pub fn stop(&mut self) {
        match self.state.load() {
            PlayerState::Restart => {
                // Let the worker finish the restart handover, then stop for
                // real. Bounded: the handover is one generator rebuild.
                while self.state.load() == PlayerState::Restart {
                    thread::sleep(RESTART_POLL_INTERVAL);
                }
                self.stop();
            }
            PlayerState::Playing | PlayerState::Paused => {
                self.state.store(PlayerState::Shutdown);
                self.stop();
            }
            PlayerState::Shutdown | PlayerState::Terminated => {
                // Without a live consumer nothing else would release a
                // producer stuck in `put`, so flush before joining.
                self.ring.clear();
                if let Some(handle) = self.worker.take() {
                    if handle.join().is_err() {
                        log::error!("mixer thread terminated abnormally");
                    }
                }
                self.state.store(PlayerState::ThreadDeleted);
                self.generator = Some(self.build_generator());
            }
            PlayerState::ThreadDeleted => {}
        }
    }

    /// Double the playback speed, saturating at 16x.
    pub fn speed_double(&mut self) {
        self.speed.double();
        log::debug!("speed factor {}", self.speed.factor());
    }

    /// Halve the playback speed, saturating at 1/64x.
    pub fn speed_halve(&mut self) {
        self.speed.halve();
        log::debug!("speed factor {}", self.speed.factor());
    }

    /// True while a worker lifetime is underway (paused counts as playing).
    pub fn is_playing(&self) -> bool {
        !matches!(
            self.state.load(),
            PlayerState::ThreadDeleted | PlayerState::Terminated
        )
    }

    /// Push current display state into the installed view sink.
    ///
    /// Only pushes while a worker is live and not shutting down; reads the
    /// published meters and sequence snapshot, mutating neither.
    pub fn update_view(&mut self) {
        match self.state.load() {
            PlayerState::ThreadDeleted | PlayerState::Shutdown | PlayerState::Terminated => {
                return;
            }
            PlayerState::Playing | PlayerState::Paused | PlayerState::Restart => {}
        }
        let Some(sink) = self.view_sink.as_mut() else {
            return;
        };

        let seq = match self.view.lock() {
            Ok(view) => view.clone(),
            Err(_) => return,
        };
        let mut vols = Vec::with_capacity(self.track_meters.len() * N_CHANNELS);
        for meter in self.track_meters.iter() {
            let (l, r) = meter.load();
            vols.push(l);
            vols.push(r);
        }
        sink.set_state(
            &seq,
            &vols,
            self.active_channels.load(Ordering::Relaxed),
            None,
        );
    }

    /// Flip the mute flag of `track`. Out-of-range indices are ignored.
    pub fn toggle_mute(&mut self, track: usize) {
        match self.muted_tracks.get(track) {
            Some(flag) => {
                flag.fetch_xor(true, Ordering::Relaxed);
            }
            None => log::debug!("toggle_mute: track {track} out of range"),
        }
    }

    /// Set the mute flag of `track`. Out-of-range indices are ignored.
    pub fn set_mute(&mut self, track: usize, mute: bool) {
        match self.muted_tracks.get(track) {
            Some(flag) => flag.store(mute, Ordering::Relaxed),
            None => log::debug!("set_mute: track {track} out of range"),
        }
    }

    pub fn is_track_muted(&self, track: usize) -> bool {
        self.muted_tracks
            .get(track)
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Current master VU levels as (left, right) peak-equivalent amplitudes.
    pub fn master_vol_levels(&self) -> (f32, f32) {
        self.master_meter.load()
    }

    fn build_generator(&self) -> Box<dyn StreamGenerator> {
        self.factory
            .create(self.song_pos, &self.params, MAX_LOOPS, self.speed.ratio())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Reap the worker first; the stream handle then stops and closes in
        // its own drop, and the callback's Arc keeps the ring alive until
        // that point.
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StereoBuffer, StereoSample, STREAM_SAMPLE_RATE};
    use std::time::Instant;

    const STUB_FRAMES: usize = 64;
    const BLOCK_SAMPLES: usize = STUB_FRAMES * N_CHANNELS;

    /// Deterministic generator: each track emits a constant level on both
    /// channels, optionally ending after a programmed number of blocks.
    struct StubGenerator {
        levels: Vec<f32>,
        seq: Sequence,
        blocks_rendered: usize,
        end_after: Option<usize>,
        speeds: Arc<Mutex<Vec<f32>>>,
    }

    impl StreamGenerator for StubGenerator {
        fn render_sample_rate(&self) -> u32 {
            STREAM_SAMPLE_RATE
        }

        fn buffer_unit_count(&self) -> usize {
            STUB_FRAMES
        }

        fn process_and_get_audio(&mut self) -> Vec<StereoBuffer> {
            self.blocks_rendered += 1;
            self.levels
                .iter()
                .map(|&level| {
                    let mut buf = StereoBuffer::silence(STUB_FRAMES);
                    for i in 0..STUB_FRAMES {
                        buf[i] = StereoSample::new(level, level);
                    }
                    buf
                })
                .collect()
        }

        fn has_stream_ended(&self) -> bool {
            self.end_after
                .map(|n| self.blocks_rendered >= n)
                .unwrap_or(false)
        }

        fn set_speed_factor(&mut self, ratio: f32) {
            let mut speeds = self.speeds.lock().unwrap();
            if speeds.last() != Some(&ratio) {
                speeds.push(ratio);
            }
        }

        fn working_sequence(&self) -> &Sequence {
            &self.seq
        }

        fn working_sequence_mut(&mut self) -> &mut Sequence {
            &mut self.seq
        }

        fn active_channel_count(&self) -> usize {
            self.levels.len()
        }
    }

    struct StubFactory {
        levels: Vec<f32>,
        end_after: Option<usize>,
        instances: AtomicUsize,
        speeds: Arc<Mutex<Vec<f32>>>,
    }

    impl StubFactory {
        fn new(levels: Vec<f32>, end_after: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                levels,
                end_after,
                instances: AtomicUsize::new(0),
                speeds: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn instances(&self) -> usize {
            self.instances.load(Ordering::SeqCst)
        }
    }

    impl GeneratorFactory for StubFactory {
        fn create(
            &self,
            song_pos: usize,
            _params: &EngineParams,
            _max_loops: u8,
            _speed_ratio: f32,
        ) -> Box<dyn StreamGenerator> {
            self.instances.fetch_add(1, Ordering::SeqCst);
            Box::new(StubGenerator {
                seq: Sequence::new(song_pos, self.levels.len()),
                levels: self.levels.clone(),
                blocks_rendered: 0,
                end_after: self.end_after,
                speeds: Arc::clone(&self.speeds),
            })
        }
    }

    /// Recording view sink.
    #[derive(Default)]
    struct RecordingView {
        calls: Arc<Mutex<Vec<(Sequence, Vec<f32>, usize)>>>,
    }

    impl TrackView for RecordingView {
        fn set_state(
            &mut self,
            seq: &Sequence,
            vols: &[f32],
            active_channels: usize,
            _cursor: Option<usize>,
        ) {
            self.calls
                .lock()
                .unwrap()
                .push((seq.clone(), vols.to_vec(), active_channels));
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn headless_player(factory: Arc<StubFactory>) -> Player {
        let _ = env_logger::builder().is_test(true).try_init();
        Player::headless(&GameConfig::default(), factory, 0)
    }

    /// Consume exactly one full block once the worker has produced it.
    fn take_block(player: &Player) -> Vec<f32> {
        assert!(
            wait_until(|| player.ring.len() >= BLOCK_SAMPLES),
            "no block arrived in time"
        );
        let mut out = vec![0.0; BLOCK_SAMPLES];
        player.ring.take(&mut out);
        out
    }

    #[test]
    fn test_two_tracks_sum_into_master() {
        let factory = StubFactory::new(vec![0.1, 0.2], None);
        let mut player = headless_player(factory);

        player.play();
        let block = take_block(&player);
        for &s in &block {
            assert!((s - 0.3).abs() < 1e-6, "expected 0.3, got {s}");
        }
        player.stop();
    }

    #[test]
    fn test_muted_track_does_not_reach_master() {
        let factory = StubFactory::new(vec![0.1, 0.2], None);
        let mut player = headless_player(factory);

        player.set_mute(1, true);
        player.play();

        // sample-exact: master is the sum of the unmuted tracks only
        let block = take_block(&player);
        for &s in &block {
            assert_eq!(s, 0.1, "muted track leaked into master");
        }
        player.stop();
    }

    #[test]
    fn test_pause_produces_silence_blocks() {
        let factory = StubFactory::new(vec![0.25], None);
        let mut player = headless_player(factory);

        player.play();
        let first = take_block(&player);
        assert!(first.iter().all(|&s| s != 0.0));

        player.pause();

        // The worker runs ahead of the consumer by the ring depth, so drain
        // the in-flight audio blocks until the first silence block shows up.
        let mut saw_silence = false;
        for _ in 0..64 {
            let block = take_block(&player);
            if block.iter().all(|&s| s == 0.0) {
                saw_silence = true;
                break;
            }
        }
        assert!(saw_silence, "pause never produced silence");

        // everything after that is silence
        for _ in 0..2 {
            let block = take_block(&player);
            assert!(block.iter().all(|&s| s == 0.0));
        }
        player.stop();
    }

    #[test]
    fn test_stream_end_terminates_worker() {
        // 10 blocks fit in the ring without draining, so the stream ends on
        // its own
        let factory = StubFactory::new(vec![0.1], Some(10));
        let mut player = headless_player(factory);

        player.play();
        assert!(wait_until(|| player.state.load() == PlayerState::Terminated));
        assert!(!player.is_playing());
        assert!(player.ring.is_empty(), "ring not flushed after stream end");
        assert_eq!(player.master_vol_levels(), (0.0, 0.0));
    }

    #[test]
    fn test_play_after_stream_end_starts_again() {
        let factory = StubFactory::new(vec![0.1], Some(4));
        let mut player = headless_player(Arc::clone(&factory));

        player.play();
        assert!(wait_until(|| player.state.load() == PlayerState::Terminated));

        let before = factory.instances();
        player.play();
        assert!(factory.instances() > before, "no fresh generator was built");
        player.stop();
    }

    #[test]
    fn test_play_while_playing_restarts_with_fresh_generator() {
        let factory = StubFactory::new(vec![0.1], None);
        let mut player = headless_player(Arc::clone(&factory));

        player.play();
        let _ = take_block(&player);
        assert_eq!(factory.instances(), 1);

        player.play(); // restart request

        // keep draining so the worker reaches its next iteration
        let deadline = Instant::now() + Duration::from_secs(5);
        while factory.instances() < 2 && Instant::now() < deadline {
            let mut out = vec![0.0; BLOCK_SAMPLES];
            player.ring.take(&mut out);
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(factory.instances(), 2, "restart did not rebuild");
        assert!(wait_until(|| player.state.load() == PlayerState::Playing));
        player.stop();
    }

    #[test]
    fn test_speed_ratio_reaches_generator() {
        let factory = StubFactory::new(vec![0.1], None);
        let mut player = headless_player(Arc::clone(&factory));

        player.play();
        let _ = take_block(&player);
        assert!(factory.speeds.lock().unwrap().contains(&1.0));

        player.speed_halve();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !factory.speeds.lock().unwrap().contains(&0.5) && Instant::now() < deadline {
            let mut out = vec![0.0; BLOCK_SAMPLES];
            player.ring.take(&mut out);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(factory.speeds.lock().unwrap().contains(&0.5));
        player.stop();
    }

    #[test]
    fn test_transport_state_determinism() {
        let factory = StubFactory::new(vec![0.1], None);
        let mut player = headless_player(factory);

        assert!(!player.is_playing());

        player.play();
        assert_eq!(player.state.load(), PlayerState::Playing);
        assert!(player.is_playing());

        player.pause();
        assert_eq!(player.state.load(), PlayerState::Paused);
        assert!(player.is_playing(), "paused still counts as playing");

        player.pause();
        assert_eq!(player.state.load(), PlayerState::Playing);

        player.stop();
        assert_eq!(player.state.load(), PlayerState::ThreadDeleted);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_stop_releases_blocked_worker() {
        // No consumer: the worker fills the ring and blocks in `put`.
        let factory = StubFactory::new(vec![0.1], None);
        let mut player = headless_player(factory);

        player.play();
        assert!(wait_until(|| player.ring.len() == player.ring.capacity()));

        player.stop();
        assert_eq!(player.state.load(), PlayerState::ThreadDeleted);
    }

    #[test]
    fn test_pause_from_idle_starts_playback() {
        let factory = StubFactory::new(vec![0.1], None);
        let mut player = headless_player(factory);

        player.pause();
        assert_eq!(player.state.load(), PlayerState::Playing);
        player.stop();
    }

    #[test]
    fn test_mute_out_of_range_is_ignored() {
        let factory = StubFactory::new(vec![0.1], None);
        let mut player = headless_player(factory);

        player.set_mute(99, true);
        player.toggle_mute(99);
        assert!(!player.is_track_muted(99));
    }

    #[test]
    fn test_load_song_pushes_zero_volume_snapshot() {
        let factory = StubFactory::new(vec![0.1, 0.2, 0.3], None);
        let mut player = headless_player(factory);

        let view = RecordingView::default();
        let calls = Arc::clone(&view.calls);
        player.set_view(Box::new(view));

        player.load_song(42);

        let calls = calls.lock().unwrap();
        let (seq, vols, active) = calls.last().expect("no view push");
        assert_eq!(seq.song_pos(), 42);
        assert_eq!(vols.len(), 3 * N_CHANNELS);
        assert!(vols.iter().all(|&v| v == 0.0));
        assert_eq!(*active, 0);
    }

    #[test]
    fn test_load_song_resumes_when_playing() {
        let factory = StubFactory::new(vec![0.1], None);
        let mut player = headless_player(Arc::clone(&factory));

        player.play();
        let _ = take_block(&player);

        player.load_song(3);
        assert_eq!(player.state.load(), PlayerState::Playing);
        let _ = take_block(&player);
        player.stop();

        // stopped player stays stopped across a load
        player.load_song(4);
        assert_eq!(player.state.load(), PlayerState::ThreadDeleted);
    }

    #[test]
    fn test_update_view_only_pushes_while_live() {
        let factory = StubFactory::new(vec![0.5], None);
        let mut player = headless_player(factory);

        let view = RecordingView::default();
        let calls = Arc::clone(&view.calls);
        player.set_view(Box::new(view));

        player.update_view();
        assert!(calls.lock().unwrap().is_empty(), "pushed while stopped");

        player.play();
        let _ = take_block(&player);
        // the worker publishes display state after the block is committed
        assert!(wait_until(|| {
            player.active_channels.load(Ordering::Relaxed) == 1
        }));
        player.update_view();
        {
            let calls = calls.lock().unwrap();
            let (seq, vols, active) = calls.last().expect("no view push while playing");
            assert_eq!(seq.track_count(), 1);
            assert_eq!(vols.len(), N_CHANNELS);
            assert_eq!(*active, 1);
        }
        player.stop();
    }

    #[test]
    fn test_worker_mirrors_mute_flag_onto_sequence() {
        let factory = StubFactory::new(vec![0.1, 0.2], None);
        let mut player = headless_player(factory);

        player.set_mute(0, true);
        player.play();
        let _ = take_block(&player);

        assert!(wait_until(|| {
            let view = player.view.lock().unwrap();
            view.tracks()[0].muted && !view.tracks()[1].muted
        }));
        player.stop();
    }
}
