use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

use fxscope::audio::decode::AudioData;
use fxscope::audio::render::WavRenderer;
use fxscope::audio::AudioBuffer;
use fxscope::clock::StreamClock;
use fxscope::processor::FxProcessor;

/// How `run_blocks` plays the part of an audio device callback
pub struct HostOptions {
    pub block_size: usize,
    /// Sleep between blocks so delivery matches playback speed
    pub realtime: bool,
    /// Hand blocks straight to the output: no effect, no analysis
    pub bypass: bool,
}

/// Feed `audio` through the processor one block at a time. `stream_clock`
/// is advanced after each block when given; `after_block` receives the
/// stream position in seconds.
pub fn run_blocks<F>(
    audio: &AudioData,
    processor: &mut FxProcessor,
    stream_clock: Option<&StreamClock>,
    options: &HostOptions,
    mut renderer: Option<&mut WavRenderer>,
    mut after_block: F,
) -> Result<()>
where
    F: FnMut(f64),
{
    let block_size = options.block_size.max(1);
    let total = audio.num_frames();
    let sample_rate = audio.sample_rate.max(1) as f64;
    let mut block = AudioBuffer::new(audio.num_channels(), block_size);

    let pb = if options.realtime {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} samples ({eta} remaining)")?
                .progress_chars("=>-"),
        );
        pb
    };

    let started = Instant::now();
    let mut pos = 0;
    while pos < total {
        let n = block_size.min(total - pos);
        block.set_num_samples(n);
        for (ch, source) in audio.channels.iter().enumerate() {
            block.channel_mut(ch).copy_from_slice(&source[pos..pos + n]);
        }

        if !options.bypass {
            processor.process_block(&mut block);
        }

        if let Some(r) = renderer.as_deref_mut() {
            r.write_block(&block)?;
        }

        pos += n;
        if let Some(clock) = stream_clock {
            clock.advance(n);
        }
        pb.set_position(pos as u64);
        after_block(pos as f64 / sample_rate);

        if options.realtime {
            let deadline = started + Duration::from_secs_f64(pos as f64 / sample_rate);
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
    }

    pb.finish_and_clear();
    Ok(())
}
