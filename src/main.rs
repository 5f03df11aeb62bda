mod cli;
mod host;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cli::Cli;
use fxscope::audio::decode::{decode_audio, AudioData};
use fxscope::audio::render::WavRenderer;
use fxscope::clock::{Clock, StreamClock, SystemClock};
use fxscope::config::{self, Config};
use fxscope::params::{ParamId, ParameterSet};
use fxscope::processor::FxProcessor;
use fxscope::recording::{Recorder, StopOutcome};
use host::{run_blocks, HostOptions};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect fxscope.toml / global config
    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.clone()) {
        match config::load_config(&path) {
            Ok(loaded) => {
                log::info!("Loaded config from {}", path.display());
                cfg = loaded;
            }
            Err(e) => log::warn!("Failed to load config from {}: {}", path.display(), e),
        }
    }
    merge_config(&mut cli, &mut cfg);

    if cli.block_size == 0 {
        anyhow::bail!("--block-size must be at least 1");
    }
    let settings = cfg.analysis.settings().context("Invalid analysis settings")?;
    let mut location = cfg.output.location();
    if cli.output_dir.is_some() {
        location.directory = cli.output_dir.clone();
    }

    log::info!("fxscope - gain/distortion with frequency recording");
    log::info!("Input: {}", cli.input.display());
    log::info!(
        "Block size: {}, FFT size: {}, mode: {}",
        cli.block_size,
        settings.fft_size,
        if cli.realtime { "real-time" } else { "offline" }
    );

    // 1. Decode audio
    log::info!("Decoding audio...");
    let audio = decode_audio(&cli.input)?;
    if audio.num_frames() == 0 {
        anyhow::bail!("Input file contains no audio: {}", cli.input.display());
    }

    // 2. Parameters
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Gain, cli.gain);
    params.set(ParamId::Distortion, cli.distortion);
    for id in ParamId::ALL {
        log::info!("Parameter {} = {:.3}", id, params.get(id));
    }

    // 3. Recorder and processor
    let stream_clock = Arc::new(StreamClock::new(audio.sample_rate));
    let clock: Arc<dyn Clock> = if cli.realtime {
        Arc::new(SystemClock::new())
    } else {
        stream_clock.clone()
    };
    let recorder = Arc::new(Recorder::new(settings, location, clock));
    if let Some(ref report) = cli.report {
        recorder.set_output_path(report);
    }

    let mut processor = FxProcessor::new(params, recorder.clone());
    processor.prepare(audio.sample_rate, audio.num_channels())?;

    let renderer = match cli.render {
        Some(ref path) => Some(WavRenderer::create(
            path,
            audio.num_channels() as u16,
            audio.sample_rate,
        )?),
        None => None,
    };

    // 4. Start recording
    if !cli.no_record && !recorder.start() {
        anyhow::bail!("Recording could not be started");
    }

    // 5. Process
    let options = HostOptions {
        block_size: cli.block_size,
        realtime: cli.realtime,
        bypass: cli.bypass,
    };
    let early = if cli.realtime {
        run_realtime(audio, processor, renderer, options, &recorder, cli.record_seconds)?
    } else {
        run_offline(
            &audio,
            &mut processor,
            &stream_clock,
            renderer,
            &options,
            &recorder,
            cli.record_seconds,
        )?
    };

    // 6. Stop and write the report
    let outcome = match early {
        Some(outcome) => outcome,
        None => recorder.stop(),
    };
    if cli.no_record {
        log::info!("Done (recording disabled)");
        return Ok(());
    }
    report_outcome(outcome)
}

/// Config values apply only where the CLI is still at its default
fn merge_config(cli: &mut Cli, cfg: &mut Config) {
    if cli.gain == 1.0 {
        cli.gain = cfg.params.gain;
    }
    if cli.distortion == 0.0 {
        cli.distortion = cfg.params.distortion;
    }
    if cli.block_size == 512 {
        cli.block_size = cfg.host.block_size;
    }
    if cli.fft_size == 1024 {
        cli.fft_size = cfg.analysis.fft_size;
    }
    cfg.analysis.fft_size = cli.fft_size;
    if cli.output_dir.is_none() {
        cli.output_dir = cfg.output.directory.clone();
    }
}

fn run_offline(
    audio: &AudioData,
    processor: &mut FxProcessor,
    clock: &StreamClock,
    mut renderer: Option<WavRenderer>,
    options: &HostOptions,
    recorder: &Recorder,
    record_seconds: Option<f64>,
) -> Result<Option<StopOutcome>> {
    let mut outcome = None;
    run_blocks(audio, processor, Some(clock), options, renderer.as_mut(), |position| {
        if let Some(limit) = record_seconds {
            if outcome.is_none() && position >= limit && recorder.is_recording() {
                log::info!("Record time limit reached ({:.2}s)", limit);
                outcome = Some(recorder.stop());
            }
        }
    })?;
    if let Some(r) = renderer {
        r.finish()?;
    }
    Ok(outcome)
}

/// Audio runs on its own thread at playback speed; this thread acts as the
/// control side and may stop the recording while audio keeps flowing.
fn run_realtime(
    audio: AudioData,
    mut processor: FxProcessor,
    mut renderer: Option<WavRenderer>,
    options: HostOptions,
    recorder: &Recorder,
    record_seconds: Option<f64>,
) -> Result<Option<StopOutcome>> {
    log::info!(
        "Playing {:.1}s of audio in real time...",
        audio.duration_seconds()
    );
    let audio_thread = thread::Builder::new()
        .name("audio".into())
        .spawn(move || -> Result<()> {
            run_blocks(&audio, &mut processor, None, &options, renderer.as_mut(), |_| {})?;
            if let Some(r) = renderer {
                r.finish()?;
            }
            Ok(())
        })
        .context("Failed to spawn audio thread")?;

    let mut outcome = None;
    if let Some(limit) = record_seconds {
        let started = Instant::now();
        while !audio_thread.is_finished() {
            if started.elapsed().as_secs_f64() >= limit {
                log::info!("Record time limit reached ({:.2}s)", limit);
                outcome = Some(recorder.stop());
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    audio_thread
        .join()
        .map_err(|_| anyhow::anyhow!("Audio thread panicked"))??;
    Ok(outcome)
}

fn report_outcome(outcome: StopOutcome) -> Result<()> {
    match outcome {
        StopOutcome::Saved(path) => {
            log::info!("Done! Report: {}", path.display());
            println!("{}", path.display());
            Ok(())
        }
        StopOutcome::NoFrames => {
            log::warn!("Stopped, but no frequency frames were captured");
            Ok(())
        }
        StopOutcome::NotRecording => {
            log::warn!("Recording was not active at stop");
            Ok(())
        }
        StopOutcome::Failed(e) => Err(e).context("Failed to write frequency report"),
    }
}
