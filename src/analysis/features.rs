/// One captured spectral snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyFrame {
    /// Seconds since recording start
    pub time_seconds: f64,
    /// Per-bin magnitude in dB, floored at `SILENCE_FLOOR_DB`
    pub magnitudes: Vec<f32>,
    pub stereo: StereoMetrics,
}

/// Stereo image of the analysed block
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StereoMetrics {
    /// Normalized L/R correlation, -1.0 (out of phase) to 1.0 (mono)
    pub phase_correlation: f32,
    /// Side/mid RMS ratio, 0.0 (mono) to 1.0 (side only)
    pub stereo_width: f32,
}

impl StereoMetrics {
    pub const MONO: StereoMetrics = StereoMetrics {
        phase_correlation: 1.0,
        stereo_width: 0.0,
    };
}

impl Default for StereoMetrics {
    fn default() -> Self {
        Self::MONO
    }
}

/// Frequency range aggregated in the report, `[min_hz, max_hz)`
#[derive(Clone, Copy, Debug)]
pub struct FrequencyBand {
    pub name: &'static str,
    pub min_hz: f32,
    pub max_hz: f32,
}

pub const FREQUENCY_BANDS: [FrequencyBand; 7] = [
    FrequencyBand { name: "sub", min_hz: 20.0, max_hz: 60.0 },
    FrequencyBand { name: "low", min_hz: 60.0, max_hz: 250.0 },
    FrequencyBand { name: "low_mid", min_hz: 250.0, max_hz: 500.0 },
    FrequencyBand { name: "mid", min_hz: 500.0, max_hz: 2000.0 },
    FrequencyBand { name: "high_mid", min_hz: 2000.0, max_hz: 4000.0 },
    FrequencyBand { name: "high", min_hz: 4000.0, max_hz: 10000.0 },
    FrequencyBand { name: "air", min_hz: 10000.0, max_hz: 20000.0 },
];

/// Lowest level a magnitude can take; also the "no energy" sentinel
pub const SILENCE_FLOOR_DB: f32 = -100.0;

/// Amplitude ratio to dB, floored at `SILENCE_FLOOR_DB`. Zero, negative and
/// non-finite input all land on the floor.
#[inline]
pub fn gain_to_decibels(gain: f32) -> f32 {
    if gain.is_finite() && gain > 0.0 {
        (20.0 * gain.log10()).max(SILENCE_FLOOR_DB)
    } else {
        SILENCE_FLOOR_DB
    }
}

/// dB to power (`10^(db/10)`). Values at or below the floor carry no energy.
#[inline]
pub fn decibels_to_power(db: f32) -> f64 {
    if db.is_finite() && db > SILENCE_FLOOR_DB {
        10f64.powf(db as f64 / 10.0)
    } else {
        0.0
    }
}

/// Power back to dB, `SILENCE_FLOOR_DB` when there is no energy.
#[inline]
pub fn power_to_decibels(power: f64) -> f32 {
    if power > 0.0 && power.is_finite() {
        (10.0 * power.log10()) as f32
    } else {
        SILENCE_FLOOR_DB
    }
}
