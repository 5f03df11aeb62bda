use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::buffer::AudioBuffer;

/// Writes processed blocks to a 32-bit float WAV file
pub struct WavRenderer {
    writer: WavWriter<BufWriter<File>>,
    channels: usize,
}

impl WavRenderer {
    pub fn create(path: &Path, channels: u16, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
        log::info!("Rendering processed audio to {}", path.display());
        Ok(Self {
            writer,
            channels: channels as usize,
        })
    }

    /// Interleave and append the active part of the block.
    pub fn write_block(&mut self, block: &AudioBuffer) -> Result<()> {
        let channels = self.channels.min(block.num_channels());
        for i in 0..block.num_samples() {
            for ch in 0..self.channels {
                let s = if ch < channels { block.sample(ch, i) } else { 0.0 };
                self.writer.write_sample(s).context("Failed to write sample")?;
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        self.writer.finalize().context("Failed to finalize WAV file")?;
        Ok(())
    }
}
