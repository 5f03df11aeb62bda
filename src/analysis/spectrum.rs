use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::features::{gain_to_decibels, StereoMetrics};
use crate::audio::buffer::AudioBuffer;
use crate::error::{FxError, Result};
use crate::recording::Recorder;

/// Largest FFT the analyzer will plan
pub const MAX_FFT_SIZE: usize = 1 << 16;

/// Upper bound on the magnitude storage reserved for one recording
pub const MAX_STORE_BYTES: f64 = 4.0 * 1024.0 * 1024.0 * 1024.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalysisSettings {
    /// FFT length, must be a power of two
    pub fft_size: usize,
    /// Highest frequency kept in a frame, Hz
    pub max_frequency: f32,
    /// Minimum spacing between captured frames, seconds
    pub frame_duration: f64,
    /// Recording length the frame store is preallocated for
    pub max_recording_seconds: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            max_frequency: 20_000.0,
            frame_duration: 0.01,
            max_recording_seconds: 600.0,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() || self.fft_size > MAX_FFT_SIZE {
            return Err(FxError::Config(format!(
                "fft_size must be a power of two in [2, {}], got {}",
                MAX_FFT_SIZE, self.fft_size
            )));
        }
        if !(self.max_frequency.is_finite() && self.max_frequency > 0.0) {
            return Err(FxError::Config(format!(
                "max_frequency must be positive, got {}",
                self.max_frequency
            )));
        }
        if !(self.frame_duration.is_finite() && self.frame_duration > 0.0) {
            return Err(FxError::Config(format!(
                "frame_duration must be positive, got {}",
                self.frame_duration
            )));
        }
        if !(self.max_recording_seconds.is_finite() && self.max_recording_seconds > 0.0) {
            return Err(FxError::Config(format!(
                "max_recording_seconds must be positive, got {}",
                self.max_recording_seconds
            )));
        }

        // Worst case: every frame keeps fft_size / 2 bins
        let frames = (self.max_recording_seconds / self.frame_duration).ceil() + 1.0;
        let bytes = frames * (self.fft_size / 2) as f64 * std::mem::size_of::<f32>() as f64;
        if bytes > MAX_STORE_BYTES {
            return Err(FxError::Config(format!(
                "max_recording_seconds {} at frame_duration {} needs {:.0} MiB of frame storage, limit is {:.0} MiB",
                self.max_recording_seconds,
                self.frame_duration,
                bytes / (1024.0 * 1024.0),
                MAX_STORE_BYTES / (1024.0 * 1024.0)
            )));
        }
        Ok(())
    }

    /// log2 of the FFT length
    pub fn fft_order(&self) -> u32 {
        self.fft_size.trailing_zeros()
    }

    /// Number of frames a full-length recording can hold
    pub fn frame_capacity(&self) -> usize {
        // float-to-int casts saturate; only the +1 can overflow
        ((self.max_recording_seconds / self.frame_duration).ceil() as usize).saturating_add(1)
    }
}

/// Width of one reported bin: `(sample_rate / 2) / fft_size`.
pub fn bin_width(sample_rate: u32, fft_size: usize) -> f32 {
    (sample_rate as f32 / 2.0) / fft_size as f32
}

/// `min(fft_size / 2, floor(max_frequency / bin_width))`
pub fn num_bins_to_include(sample_rate: u32, fft_size: usize, max_frequency: f32) -> usize {
    let half = fft_size / 2;
    let width = bin_width(sample_rate, fft_size);
    if width <= 0.0 {
        return half;
    }
    half.min((max_frequency / width).floor() as usize)
}

/// Hann coefficient for position `i` of an `n`-point window
#[inline]
pub fn hann(i: usize, n: usize) -> f32 {
    if n < 2 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos())
}

/// Phase correlation and width of a stereo pair
pub fn stereo_metrics(left: &[f32], right: &[f32]) -> StereoMetrics {
    const EPS: f64 = 1e-12;

    let mut lr = 0.0f64;
    let mut ll = 0.0f64;
    let mut rr = 0.0f64;
    let mut mid = 0.0f64;
    let mut side = 0.0f64;
    for (&l, &r) in left.iter().zip(right) {
        let (l, r) = (l as f64, r as f64);
        lr += l * r;
        ll += l * l;
        rr += r * r;
        let m = 0.5 * (l + r);
        let s = 0.5 * (l - r);
        mid += m * m;
        side += s * s;
    }

    let phase_correlation = match (ll > EPS, rr > EPS) {
        (true, true) => (lr / (ll * rr).sqrt()).clamp(-1.0, 1.0),
        (false, false) => 1.0,
        // one side silent: no phase relationship
        _ => 0.0,
    };

    let stereo_width = if mid + side <= EPS {
        0.0
    } else if mid <= EPS {
        1.0
    } else {
        (side / mid).sqrt().min(1.0)
    };

    StereoMetrics {
        phase_correlation: phase_correlation as f32,
        stereo_width: stereo_width as f32,
    }
}

pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    num_bins: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    window: Vec<f32>,
    window_len: usize,
    magnitudes: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(settings: &AnalysisSettings, sample_rate: u32) -> Result<Self> {
        settings.validate()?;

        let fft_size = settings.fft_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let num_bins = num_bins_to_include(sample_rate, fft_size, settings.max_frequency);

        log::debug!(
            "Spectral analyzer: fft_size={} (order {}), {} bins of {:.2} Hz",
            fft_size,
            settings.fft_order(),
            num_bins,
            bin_width(sample_rate, fft_size)
        );

        Ok(Self {
            fft,
            fft_size,
            num_bins,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            window: (0..fft_size).map(|i| hann(i, fft_size)).collect(),
            window_len: fft_size,
            magnitudes: vec![0.0; num_bins],
        })
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// dB magnitudes of the last analysed block
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    // Blocks shorter than the FFT get a window sized to the samples present.
    fn update_window(&mut self, n: usize) {
        if n == self.window_len {
            return;
        }
        for (i, w) in self.window[..n].iter_mut().enumerate() {
            *w = hann(i, n);
        }
        self.window_len = n;
    }

    /// Window, transform and convert the first `fft_size` samples of the
    /// block (channels averaged to mono). Results land in `magnitudes()`.
    pub fn analyze(&mut self, block: &AudioBuffer, channels: usize) -> StereoMetrics {
        let channels = channels.min(block.num_channels());
        let n = block.num_samples().min(self.fft_size);

        if channels == 0 || n == 0 {
            self.magnitudes.fill(gain_to_decibels(0.0));
            return StereoMetrics::MONO;
        }

        self.update_window(n);
        let inv_channels = 1.0 / channels as f32;
        for i in 0..n {
            let mut sum = 0.0f32;
            for ch in 0..channels {
                sum += block.sample(ch, i);
            }
            let mono = sum * inv_channels;
            let mono = if mono.is_finite() { mono } else { 0.0 };
            self.buffer[i] = Complex::new(mono * self.window[i], 0.0);
        }
        for c in self.buffer[n..].iter_mut() {
            *c = Complex::new(0.0, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        for (mag, bin) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = gain_to_decibels(bin.norm() * scale);
        }

        if channels >= 2 {
            stereo_metrics(&block.channel(0)[..n], &block.channel(1)[..n])
        } else {
            StereoMetrics::MONO
        }
    }

    /// Analyse the block and hand the frame to the recorder if a capture is
    /// due. Returns whether a frame was stored.
    pub fn capture(&mut self, block: &AudioBuffer, channels: usize, recorder: &Recorder) -> bool {
        if !recorder.is_recording() {
            return false;
        }
        let Some(ticket) = recorder.begin_capture() else {
            return false;
        };
        let stereo = self.analyze(block, channels);
        recorder.commit_frame(ticket, &self.magnitudes, stereo)
    }
}
