use std::sync::Arc;

use crate::analysis::spectrum::SpectralAnalyzer;
use crate::audio::buffer::AudioBuffer;
use crate::dsp;
use crate::error::Result;
use crate::params::{ParamId, ParameterSet};
use crate::recording::{Recorder, StopOutcome};

/// `prepare` once per stream configuration, then `process_block` from the
/// audio callback. Parameters and the recorder are shared with the control
/// side.
pub struct FxProcessor {
    params: Arc<ParameterSet>,
    recorder: Arc<Recorder>,
    analyzer: Option<SpectralAnalyzer>,
    input_channels: usize,
}

impl FxProcessor {
    pub fn new(params: Arc<ParameterSet>, recorder: Arc<Recorder>) -> Self {
        Self {
            params,
            recorder,
            analyzer: None,
            input_channels: 0,
        }
    }

    pub fn params(&self) -> &Arc<ParameterSet> {
        &self.params
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// Allocate everything the audio path needs. Call from the control
    /// thread before the first block and whenever the format changes.
    ///
    /// Frames taken at different sample rates have different bin layouts, so
    /// a rate change during a recording closes the current report and carries
    /// on in a new session.
    pub fn prepare(&mut self, sample_rate: u32, input_channels: usize) -> Result<()> {
        let analyzer = SpectralAnalyzer::new(self.recorder.settings(), sample_rate)?;

        let previous_rate = self.recorder.sample_rate();
        let resume = self.recorder.is_recording() && previous_rate != sample_rate;
        if resume {
            log::warn!(
                "Sample rate changed from {}Hz to {}Hz while recording, closing the current report",
                previous_rate,
                sample_rate
            );
            if let StopOutcome::Saved(path) = self.recorder.stop() {
                log::info!("Saved {}Hz report to {}", previous_rate, path.display());
            }
        }

        self.recorder.set_sample_rate(sample_rate);
        self.analyzer = Some(analyzer);
        self.input_channels = input_channels;
        log::info!(
            "Prepared processor: {}Hz, {} input channel(s)",
            sample_rate,
            input_channels
        );

        if resume && !self.recorder.start() {
            log::warn!("Could not resume recording at {}Hz", sample_rate);
        }
        Ok(())
    }

    /// Audio callback. Channels past the input count are silenced, the effect
    /// runs in place, then the processed block feeds the recorder.
    pub fn process_block(&mut self, block: &mut AudioBuffer) {
        for ch in self.input_channels..block.num_channels() {
            block.clear_channel(ch);
        }

        let gain = self.params.get(ParamId::Gain);
        let distortion = self.params.get(ParamId::Distortion);
        dsp::process_block(block, self.input_channels, gain, distortion);

        if let Some(analyzer) = self.analyzer.as_mut() {
            analyzer.capture(block, self.input_channels, &self.recorder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::spectrum::AnalysisSettings;
    use crate::clock::StreamClock;
    use crate::recording::{OutputLocation, StopOutcome};

    fn setup(dir: &std::path::Path, clock: Arc<StreamClock>) -> FxProcessor {
        let recorder = Arc::new(Recorder::new(
            AnalysisSettings {
                max_recording_seconds: 5.0,
                ..AnalysisSettings::default()
            },
            OutputLocation::in_directory(dir),
            clock,
        ));
        FxProcessor::new(Arc::new(ParameterSet::new()), recorder)
    }

    #[test]
    fn unprepared_processor_outputs_silence() {
        let tmp = tempfile::tempdir().unwrap();
        let mut processor = setup(tmp.path(), Arc::new(StreamClock::new(44_100)));
        let mut block = AudioBuffer::from_channels(vec![vec![0.5; 16]]);
        processor.process_block(&mut block);
        // no input channels declared yet: output is cleared
        assert!(block.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn extra_output_channels_are_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let mut processor = setup(tmp.path(), Arc::new(StreamClock::new(44_100)));
        processor.prepare(44_100, 1).unwrap();
        processor.params().set(ParamId::Gain, 2.0);

        let mut block = AudioBuffer::from_channels(vec![vec![0.25; 16], vec![0.9; 16]]);
        processor.process_block(&mut block);
        assert!(block.channel(0).iter().all(|&s| s == 0.5));
        assert!(block.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn recording_captures_one_frame_per_block() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(StreamClock::new(44_100));
        let mut processor = setup(tmp.path(), clock.clone());
        processor.prepare(44_100, 2).unwrap();

        let block_size = 512;
        let mut block = AudioBuffer::new(2, block_size);
        for i in 0..block_size {
            let s = (i as f32 * 0.05).sin() * 0.5;
            block.channel_mut(0)[i] = s;
            block.channel_mut(1)[i] = s;
        }

        // blocks before start are not analysed
        processor.process_block(&mut block);
        clock.advance(block_size);
        assert_eq!(processor.recorder().frame_count(), 0);

        assert!(processor.recorder().start());
        for _ in 0..10 {
            processor.process_block(&mut block);
            clock.advance(block_size);
        }
        // 512 samples at 44.1 kHz is ~11.6 ms, above the 10 ms frame spacing
        assert_eq!(processor.recorder().frame_count(), 10);

        let StopOutcome::Saved(path) = processor.recorder().stop() else {
            panic!("expected a saved report");
        };
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let frames = json["analysis"].as_array().unwrap();
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[0]["time_sec"], 0.0);
        assert_eq!(frames[0]["phase_correlation"], 1.0);
        assert_eq!(frames[0]["stereo_width"], 0.0);
        for frame in frames {
            assert!(frame["rms_db"].as_f64().unwrap().is_finite());
        }
    }

    #[test]
    fn short_blocks_are_throttled() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(StreamClock::new(48_000));
        let mut processor = setup(tmp.path(), clock.clone());
        processor.prepare(48_000, 1).unwrap();
        processor.recorder().start();

        // 64-sample blocks: 1.33 ms each, so one frame per 8 blocks
        let mut block = AudioBuffer::new(1, 64);
        for _ in 0..80 {
            processor.process_block(&mut block);
            clock.advance(64);
        }
        assert_eq!(processor.recorder().frame_count(), 10);
    }

    #[test]
    fn sample_rate_change_while_recording_starts_a_new_report() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(StreamClock::new(44_100));
        let mut processor = setup(tmp.path(), clock.clone());
        processor.prepare(44_100, 1).unwrap();
        assert!(processor.recorder().start());

        let mut block = AudioBuffer::new(1, 1024);
        for _ in 0..3 {
            processor.process_block(&mut block);
            clock.advance(1024);
        }
        assert_eq!(processor.recorder().frame_count(), 3);

        processor.prepare(96_000, 1).unwrap();
        assert!(processor.recorder().is_recording());
        assert_eq!(processor.recorder().sample_rate(), 96_000);

        for _ in 0..10 {
            processor.process_block(&mut block);
            clock.advance(1024);
        }
        assert_eq!(processor.recorder().frame_count(), 10);

        // the 44.1 kHz session was written out on its own
        let reports: Vec<_> = std::fs::read_dir(tmp.path().join("fxscope"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect();
        assert_eq!(reports.len(), 1);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&reports[0]).unwrap()).unwrap();
        assert_eq!(json["sample_rate"], 44_100);
        assert_eq!(json["analysis"].as_array().unwrap().len(), 3);
        assert_eq!(json["dropped_frames"], 0);

        let StopOutcome::Saved(second) = processor.recorder().stop() else {
            panic!("expected the 96 kHz report");
        };
        assert_ne!(second, reports[0]);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&second).unwrap()).unwrap();
        assert_eq!(json["sample_rate"], 96_000);
        assert_eq!(json["analysis"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn reprepare_at_same_rate_keeps_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(StreamClock::new(48_000));
        let mut processor = setup(tmp.path(), clock.clone());
        processor.prepare(48_000, 1).unwrap();
        processor.recorder().start();

        let mut block = AudioBuffer::new(1, 1024);
        processor.process_block(&mut block);
        clock.advance(1024);
        processor.prepare(48_000, 2).unwrap();
        processor.process_block(&mut block);
        assert_eq!(processor.recorder().frame_count(), 2);
    }
}
