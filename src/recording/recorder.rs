use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use super::paths::OutputLocation;
use super::report::{save_report, FrequencyReport};
use super::store::FrameStore;
use crate::analysis::features::StereoMetrics;
use crate::analysis::spectrum::{num_bins_to_include, AnalysisSettings};
use crate::clock::Clock;
use crate::error::FxError;

struct RecordingState {
    is_recording: bool,
    start_time: f64,
    last_frame_time: f64,
    /// Bumped on every start/reset so a capture begun in one session can
    /// never land in the next
    session: u64,
    output_path: PathBuf,
    /// `output_path` was generated rather than set by the caller
    path_is_default: bool,
    store: FrameStore,
}

/// Permission to store one frame, issued by `Recorder::begin_capture`
#[derive(Clone, Copy, Debug)]
pub struct CaptureTicket {
    session: u64,
    time_seconds: f64,
}

impl CaptureTicket {
    pub fn time_seconds(&self) -> f64 {
        self.time_seconds
    }
}

#[derive(Debug)]
pub enum StopOutcome {
    NotRecording,
    NoFrames,
    Saved(PathBuf),
    Failed(FxError),
}

impl StopOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, StopOutcome::Saved(_))
    }
}

/// Frames and destination taken out of a finished session
pub(crate) struct FinishedSession {
    pub store: FrameStore,
    pub output_path: PathBuf,
}

/// `Idle` <-> `Recording`, driven from the control thread.
///
/// One mutex guards the frame store, the flags and the output path. The audio
/// thread only ever `try_lock`s it, so a busy control thread costs a skipped
/// frame rather than a blocked callback.
pub struct Recorder {
    state: Mutex<RecordingState>,
    recording: AtomicBool,
    sample_rate: AtomicU32,
    settings: AnalysisSettings,
    location: OutputLocation,
    clock: Arc<dyn Clock>,
}

impl Recorder {
    pub fn new(settings: AnalysisSettings, location: OutputLocation, clock: Arc<dyn Clock>) -> Self {
        let output_path = location.default_path();
        Self {
            state: Mutex::new(RecordingState {
                is_recording: false,
                start_time: 0.0,
                last_frame_time: f64::NEG_INFINITY,
                session: 0,
                output_path,
                path_is_default: true,
                store: FrameStore::empty(),
            }),
            recording: AtomicBool::new(false),
            sample_rate: AtomicU32::new(0),
            settings,
            location,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock(&self) -> Option<MutexGuard<'_, RecordingState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_output_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        log::info!("Output file path set to: {}", path.display());
        let mut state = self.lock();
        state.output_path = path;
        state.path_is_default = false;
    }

    pub fn output_path(&self) -> PathBuf {
        self.lock().output_path.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.lock().store.len()
    }

    /// Begin a session. Returns false, leaving everything untouched, when
    /// already recording, when the output path is empty, or before a sample
    /// rate is known.
    pub fn start(&self) -> bool {
        let sample_rate = self.sample_rate();
        if sample_rate == 0 {
            log::warn!("Cannot start recording: sample rate not set");
            return false;
        }
        if self.is_recording() {
            log::info!("Already recording frequency data");
            return false;
        }

        if let Err(e) = self.settings.validate() {
            log::warn!("Cannot start recording: {}", e);
            return false;
        }

        // Reserve storage before taking the lock
        let bins = num_bins_to_include(sample_rate, self.settings.fft_size, self.settings.max_frequency);
        let store = match FrameStore::with_capacity(bins, self.settings.frame_capacity()) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Cannot start recording: {}", e);
                return false;
            }
        };

        // A generated path whose file has since been written (a report saved
        // within the same second) is replaced rather than overwritten
        let stale_default = {
            let state = self.lock();
            state.path_is_default && state.output_path.exists()
        };
        let fresh_path = stale_default.then(|| self.location.default_path());

        let mut state = self.lock();
        if state.is_recording {
            log::info!("Already recording frequency data");
            return false;
        }
        if let Some(path) = fresh_path {
            if state.path_is_default {
                state.output_path = path;
            }
        }
        if state.output_path.as_os_str().is_empty() {
            log::warn!("Cannot start recording: no output file path set");
            return false;
        }

        state.store = store;
        state.start_time = self.clock.now_seconds();
        state.last_frame_time = f64::NEG_INFINITY;
        state.session = state.session.wrapping_add(1);
        state.is_recording = true;
        self.recording.store(true, Ordering::Release);

        log::info!(
            "Started recording frequency data to: {}",
            state.output_path.display()
        );
        true
    }

    /// End the session and write the report. State is reset whether or not
    /// the write succeeds.
    pub fn stop(&self) -> StopOutcome {
        let Some(finished) = self.finish_session() else {
            log::info!("Not currently recording frequency data");
            return StopOutcome::NotRecording;
        };

        if finished.store.is_empty() {
            log::info!("Stopped recording, but no frequency data was collected");
            return StopOutcome::NoFrames;
        }
        if finished.store.dropped() > 0 {
            log::warn!(
                "{} frames were dropped (store capacity {} frames)",
                finished.store.dropped(),
                finished.store.capacity()
            );
        }

        let report = FrequencyReport::build(&finished.store, self.sample_rate(), &self.settings);
        match save_report(&report, &finished.output_path) {
            Ok(path) => StopOutcome::Saved(path),
            Err(e) => {
                log::error!("Failed to save frequency data: {}", e);
                StopOutcome::Failed(e)
            }
        }
    }

    /// Recording -> Idle under the lock, handing back the collected frames.
    /// `None` if no session was running.
    pub(crate) fn finish_session(&self) -> Option<FinishedSession> {
        if !self.is_recording() {
            return None;
        }
        let next_path = self.location.default_path();

        let mut state = self.lock();
        if !state.is_recording {
            return None;
        }
        state.is_recording = false;
        self.recording.store(false, Ordering::Release);
        state.start_time = 0.0;
        state.last_frame_time = f64::NEG_INFINITY;

        let store = std::mem::take(&mut state.store);
        let output_path = std::mem::replace(&mut state.output_path, next_path);
        state.path_is_default = true;
        Some(FinishedSession { store, output_path })
    }

    /// Force `Idle` and discard any frames. Never writes a report.
    pub fn reset(&self) {
        let next_path = self.location.default_path();
        let mut state = self.lock();
        state.is_recording = false;
        self.recording.store(false, Ordering::Release);
        state.store = FrameStore::empty();
        state.start_time = 0.0;
        state.last_frame_time = f64::NEG_INFINITY;
        state.session = state.session.wrapping_add(1);
        state.output_path = next_path;
        state.path_is_default = true;
        log::info!("Recording state has been reset for next recording");
    }

    /// Audio thread: decide whether a frame is due. Never blocks.
    pub fn begin_capture(&self) -> Option<CaptureTicket> {
        if !self.is_recording() {
            return None;
        }
        let state = self.try_lock()?;
        if !state.is_recording {
            return None;
        }
        let time_seconds = self.clock.now_seconds() - state.start_time;
        if time_seconds - state.last_frame_time < self.settings.frame_duration {
            return None;
        }
        Some(CaptureTicket {
            session: state.session,
            time_seconds,
        })
    }

    /// Audio thread: store the analysed frame if its session is still
    /// recording. Never blocks, never allocates.
    pub fn commit_frame(&self, ticket: CaptureTicket, magnitudes: &[f32], stereo: StereoMetrics) -> bool {
        let Some(mut state) = self.try_lock() else {
            return false;
        };
        if !state.is_recording || state.session != ticket.session {
            return false;
        }
        if ticket.time_seconds <= state.last_frame_time {
            return false;
        }
        if state.store.push(ticket.time_seconds, magnitudes, stereo) {
            state.last_frame_time = ticket.time_seconds;
            true
        } else {
            false
        }
    }

    /// Write a report for an arbitrary set of frames, outside any session.
    pub fn save_frequency_data(&self, store: &FrameStore, path: &Path) -> Result<PathBuf, FxError> {
        if store.is_empty() {
            return Err(FxError::Config("No frequency data to save".to_string()));
        }
        let report = FrequencyReport::build(store, self.sample_rate(), &self.settings);
        save_report(&report, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct Fixture {
        _dir: tempfile::TempDir,
        clock: Arc<ManualClock>,
        recorder: Arc<Recorder>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let settings = AnalysisSettings {
            max_recording_seconds: 10.0,
            ..AnalysisSettings::default()
        };
        let recorder = Arc::new(Recorder::new(
            settings,
            OutputLocation::in_directory(dir.path()),
            clock.clone(),
        ));
        recorder.set_sample_rate(44_100);
        Fixture {
            _dir: dir,
            clock,
            recorder,
        }
    }

    fn frame() -> Vec<f32> {
        vec![-20.0; num_bins_to_include(44_100, 1024, 20_000.0)]
    }

    fn capture_at(f: &Fixture, t: f64) -> bool {
        f.clock.set(t);
        match f.recorder.begin_capture() {
            Some(ticket) => f.recorder.commit_frame(ticket, &frame(), StereoMetrics::MONO),
            None => false,
        }
    }

    #[test]
    fn empty_output_path_blocks_start() {
        let f = fixture();
        f.recorder.set_output_path("");
        assert!(!f.recorder.start());
        assert!(!f.recorder.is_recording());
    }

    #[test]
    fn start_requires_sample_rate() {
        let f = fixture();
        f.recorder.set_sample_rate(0);
        assert!(!f.recorder.start());
        assert!(!f.recorder.is_recording());
    }

    #[test]
    fn start_refuses_recording_length_it_cannot_store() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AnalysisSettings {
            max_recording_seconds: 1e30,
            ..AnalysisSettings::default()
        };
        let recorder = Recorder::new(
            settings,
            OutputLocation::in_directory(dir.path()),
            Arc::new(ManualClock::new()),
        );
        recorder.set_sample_rate(44_100);
        assert!(!recorder.start());
        assert!(!recorder.is_recording());
    }

    #[test]
    fn start_then_stop_cycles_state() {
        let f = fixture();
        assert!(f.recorder.start());
        assert!(f.recorder.is_recording());
        assert!(!f.recorder.start(), "second start is a no-op");

        assert!(capture_at(&f, 0.0));
        assert!(capture_at(&f, 0.02));
        assert_eq!(f.recorder.frame_count(), 2);

        let first_path = f.recorder.output_path();
        let outcome = f.recorder.stop();
        assert!(outcome.is_saved(), "{:?}", outcome);
        assert!(!f.recorder.is_recording());
        assert_eq!(f.recorder.frame_count(), 0);
        assert!(first_path.exists());
    }

    #[test]
    fn back_to_back_sessions_write_separate_reports() {
        let f = fixture();
        f.recorder.start();
        capture_at(&f, 0.0);
        let StopOutcome::Saved(first) = f.recorder.stop() else {
            panic!("first report not saved");
        };

        f.recorder.start();
        capture_at(&f, 1.0);
        let StopOutcome::Saved(second) = f.recorder.stop() else {
            panic!("second report not saved");
        };
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn stop_when_idle_does_nothing() {
        let f = fixture();
        assert!(matches!(f.recorder.stop(), StopOutcome::NotRecording));
    }

    #[test]
    fn stop_without_frames_writes_nothing() {
        let f = fixture();
        let path = f.recorder.output_path();
        f.recorder.start();
        assert!(matches!(f.recorder.stop(), StopOutcome::NoFrames));
        assert!(!path.exists());
    }

    #[test]
    fn frames_are_throttled_and_increasing() {
        let f = fixture();
        f.recorder.start();
        let mut stored = 0;
        for i in 0..200 {
            // 4 ms steps, so roughly every third block is due
            if capture_at(&f, i as f64 * 0.004) {
                stored += 1;
            }
        }
        let finished = f.recorder.finish_session().unwrap();
        assert_eq!(finished.store.len(), stored);
        assert!(stored > 50 && stored < 100, "stored {}", stored);

        let times: Vec<f64> = finished.store.iter().map(|fr| fr.time_seconds).collect();
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[1] - pair[0] >= 0.01 - 1e-12);
        }
    }

    #[test]
    fn timestamps_are_relative_to_start() {
        let f = fixture();
        f.clock.set(100.0);
        f.recorder.start();
        assert!(capture_at(&f, 100.5));
        let finished = f.recorder.finish_session().unwrap();
        assert!((finished.store.get(0).unwrap().time_seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn stale_ticket_is_rejected_after_restart() {
        let f = fixture();
        f.recorder.start();
        f.clock.set(0.0);
        let ticket = f.recorder.begin_capture().unwrap();
        f.recorder.reset();
        f.recorder.start();
        assert!(!f.recorder.commit_frame(ticket, &frame(), StereoMetrics::MONO));
        assert_eq!(f.recorder.frame_count(), 0);
    }

    #[test]
    fn no_capture_while_idle() {
        let f = fixture();
        assert!(f.recorder.begin_capture().is_none());
        assert!(!capture_at(&f, 1.0));
    }

    #[test]
    fn capture_skipped_while_control_thread_holds_lock() {
        let f = fixture();
        f.recorder.start();
        let _guard = f.recorder.lock();
        assert!(f.recorder.begin_capture().is_none());
    }

    #[test]
    fn reset_discards_frames_and_renews_path() {
        let f = fixture();
        f.recorder.set_output_path(f._dir.path().join("custom.json"));
        f.recorder.start();
        capture_at(&f, 0.0);
        f.recorder.reset();
        assert!(!f.recorder.is_recording());
        assert_eq!(f.recorder.frame_count(), 0);
        assert_ne!(f.recorder.output_path(), f._dir.path().join("custom.json"));
        assert!(!f._dir.path().join("custom.json").exists());
    }

    #[test]
    fn failed_save_still_resets() {
        let f = fixture();
        let blocker = f._dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        f.recorder.set_output_path(blocker.join("out.json"));

        f.recorder.start();
        capture_at(&f, 0.0);
        let outcome = f.recorder.stop();
        assert!(matches!(outcome, StopOutcome::Failed(FxError::Io { .. })));
        assert!(!f.recorder.is_recording());
        assert_eq!(f.recorder.frame_count(), 0);
        assert!(f.recorder.start(), "a new recording can begin");
    }

    #[test]
    fn saved_report_has_one_entry_per_frame() {
        let f = fixture();
        let target = f._dir.path().join("session.dat");
        f.recorder.set_output_path(&target);
        f.recorder.start();
        for i in 0..5 {
            capture_at(&f, i as f64 * 0.01);
        }
        let StopOutcome::Saved(path) = f.recorder.stop() else {
            panic!("report not saved");
        };
        assert_eq!(path, target.with_extension("json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["analysis"].as_array().unwrap().len(), 5);
        assert_eq!(json["sample_rate"], 44_100);
    }

    #[test]
    fn save_frequency_data_rejects_empty_store() {
        let f = fixture();
        let store = FrameStore::empty();
        assert!(f.recorder.save_frequency_data(&store, &f._dir.path().join("x.json")).is_err());
    }

    #[test]
    fn concurrent_append_and_stop_keep_store_consistent() {
        for _ in 0..20 {
            let f = fixture();
            f.recorder.start();

            let appended = Arc::new(AtomicUsize::new(0));
            let producer = {
                let recorder = f.recorder.clone();
                let clock = f.clock.clone();
                let appended = appended.clone();
                thread::spawn(move || {
                    let mags = frame();
                    for i in 0..2_000 {
                        clock.set(i as f64 * 0.02);
                        if let Some(ticket) = recorder.begin_capture() {
                            if recorder.commit_frame(ticket, &mags, StereoMetrics::MONO) {
                                appended.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                })
            };

            thread::yield_now();
            let finished = f.recorder.finish_session();
            producer.join().unwrap();

            let stored = finished.map_or(0, |s| {
                let times: Vec<f64> = s.store.iter().map(|fr| fr.time_seconds).collect();
                assert!(times.windows(2).all(|w| w[0] < w[1]));
                s.store.len()
            });
            // Appends after the transition must all have been refused
            assert_eq!(stored, appended.load(Ordering::SeqCst));
            assert!(!f.recorder.is_recording());
        }
    }
}
