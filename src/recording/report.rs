use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::paths::force_json_extension;
use super::store::{FrameRef, FrameStore};
use crate::analysis::features::{
    decibels_to_power, power_to_decibels, FrequencyBand, FREQUENCY_BANDS, SILENCE_FLOOR_DB,
};
use crate::analysis::spectrum::{bin_width, AnalysisSettings};
use crate::error::{FxError, Result};

pub const BIT_DEPTH: u32 = 32;

/// Reported RMS when a frame carries no energy
pub const RMS_FLOOR_DB: f32 = -60.0;

/// Offset from total spectral energy to the reported RMS level
const RMS_OFFSET_DB: f32 = 10.0;

/// Frames either side of the current one for the onset threshold
const ONSET_WINDOW: usize = 10;
/// Mean positive dB rise per bin needed on top of the local average
const ONSET_MIN_FLUX: f32 = 1.0;
const ONSET_MIN_GAP_SEC: f64 = 0.05;

#[derive(Debug, Serialize)]
pub struct FrequencyReport {
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub frame_duration_sec: f64,
    /// Frames analysed but not stored (store full, or a format change)
    pub dropped_frames: usize,
    pub analysis: Vec<FrameSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FrameSummary {
    pub time_sec: f64,
    pub rms_db: f32,
    pub true_peak_dbfs: f32,
    pub total_energy_db: f32,
    pub peak_frequency_hz: u32,
    pub band_energy: BandEnergies,
    pub phase_correlation: f32,
    pub stereo_width: f32,
    /// Mean positive dB change per bin against the previous frame
    pub spectral_flux: f32,
    pub onset_detected: bool,
}

/// Energy per `FREQUENCY_BANDS` entry, in dB. Serializes as an object keyed
/// by band name, in table order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandEnergies([f32; FREQUENCY_BANDS.len()]);

impl BandEnergies {
    pub fn get(&self, name: &str) -> Option<f32> {
        FREQUENCY_BANDS
            .iter()
            .position(|b| b.name == name)
            .map(|i| self.0[i])
    }
}

impl Serialize for BandEnergies {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (band, value) in FREQUENCY_BANDS.iter().zip(self.0.iter()) {
            map.serialize_entry(band.name, value)?;
        }
        map.end()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnergyStats {
    pub rms_db: f32,
    pub total_energy_db: f32,
    pub true_peak_dbfs: f32,
}

pub fn energy_stats(magnitudes: &[f32]) -> EnergyStats {
    let true_peak_dbfs = magnitudes
        .iter()
        .copied()
        .filter(|m| m.is_finite())
        .fold(None, |acc: Option<f32>, m| Some(acc.map_or(m, |a| a.max(m))))
        .unwrap_or(SILENCE_FLOOR_DB);

    let total: f64 = magnitudes.iter().map(|&m| decibels_to_power(m)).sum();
    if total > 0.0 {
        let total_energy_db = power_to_decibels(total);
        EnergyStats {
            rms_db: total_energy_db - RMS_OFFSET_DB,
            total_energy_db,
            true_peak_dbfs,
        }
    } else {
        EnergyStats {
            rms_db: RMS_FLOOR_DB,
            total_energy_db: SILENCE_FLOOR_DB,
            true_peak_dbfs,
        }
    }
}

/// Energy of bins `[floor(min/width), floor(max/width))`, clamped to the
/// frame, in dB.
pub fn band_energy_db(magnitudes: &[f32], band: &FrequencyBand, bin_width: f32) -> f32 {
    if bin_width <= 0.0 {
        return SILENCE_FLOOR_DB;
    }
    let len = magnitudes.len();
    let lo = ((band.min_hz / bin_width).floor() as usize).min(len);
    let hi = ((band.max_hz / bin_width).floor() as usize).min(len);
    if lo >= hi {
        return SILENCE_FLOOR_DB;
    }
    let power: f64 = magnitudes[lo..hi].iter().map(|&m| decibels_to_power(m)).sum();
    power_to_decibels(power)
}

/// Loudest bin times bin width, truncated to whole Hz. First bin wins ties.
pub fn peak_frequency_hz(magnitudes: &[f32], bin_width: f32) -> u32 {
    let mut peak_bin = 0;
    let mut peak = f32::NEG_INFINITY;
    for (i, &m) in magnitudes.iter().enumerate() {
        if m > peak {
            peak = m;
            peak_bin = i;
        }
    }
    (peak_bin as f32 * bin_width) as u32
}

pub fn spectral_flux(previous: &[f32], current: &[f32]) -> f32 {
    let n = previous.len().min(current.len());
    if n == 0 {
        return 0.0;
    }
    let rise: f32 = previous
        .iter()
        .zip(current)
        .map(|(p, c)| (c - p).max(0.0))
        .sum();
    rise / n as f32
}

/// Flux peaks that stand out from their neighbourhood
fn detect_onsets(flux: &[f32], times: &[f64]) -> Vec<bool> {
    let mut onsets = vec![false; flux.len()];
    let mut last_onset: Option<f64> = None;

    for i in 0..flux.len() {
        let start = i.saturating_sub(ONSET_WINDOW);
        let end = (i + ONSET_WINDOW + 1).min(flux.len());
        let local_mean = flux[start..end].iter().sum::<f32>() / (end - start) as f32;
        let threshold = local_mean * 1.5 + ONSET_MIN_FLUX;

        if flux[i] <= threshold {
            continue;
        }
        let is_peak = (i == 0 || flux[i] >= flux[i - 1])
            && (i + 1 == flux.len() || flux[i] >= flux[i + 1]);
        let far_enough = last_onset.map_or(true, |t| times[i] - t > ONSET_MIN_GAP_SEC);

        if is_peak && far_enough {
            onsets[i] = true;
            last_onset = Some(times[i]);
        }
    }
    onsets
}

fn round_to(value: f32, places: i32) -> f32 {
    let scale = 10f32.powi(places);
    (value * scale).round() / scale
}

fn summarize(frame: FrameRef<'_>, width: f32) -> FrameSummary {
    let stats = energy_stats(frame.magnitudes);
    let mut bands = [SILENCE_FLOOR_DB; FREQUENCY_BANDS.len()];
    for (slot, band) in bands.iter_mut().zip(FREQUENCY_BANDS.iter()) {
        *slot = round_to(band_energy_db(frame.magnitudes, band, width), 1);
    }

    FrameSummary {
        time_sec: (frame.time_seconds * 1000.0).round() / 1000.0,
        rms_db: round_to(stats.rms_db, 1),
        true_peak_dbfs: round_to(stats.true_peak_dbfs, 1),
        total_energy_db: round_to(stats.total_energy_db, 1),
        peak_frequency_hz: peak_frequency_hz(frame.magnitudes, width),
        band_energy: BandEnergies(bands),
        phase_correlation: round_to(frame.stereo.phase_correlation, 3),
        stereo_width: round_to(frame.stereo.stereo_width, 3),
        spectral_flux: 0.0,
        onset_detected: false,
    }
}

impl FrequencyReport {
    pub fn build(store: &FrameStore, sample_rate: u32, settings: &AnalysisSettings) -> Self {
        let width = bin_width(sample_rate, settings.fft_size);

        let mut analysis: Vec<FrameSummary> = (0..store.len())
            .into_par_iter()
            .filter_map(|i| store.get(i))
            .map(|frame| summarize(frame, width))
            .collect();

        let flux: Vec<f32> = (0..store.len())
            .map(|i| match (i.checked_sub(1).and_then(|p| store.get(p)), store.get(i)) {
                (Some(prev), Some(cur)) => spectral_flux(prev.magnitudes, cur.magnitudes),
                _ => 0.0,
            })
            .collect();
        let times: Vec<f64> = store.iter().map(|f| f.time_seconds).collect();
        let onsets = detect_onsets(&flux, &times);

        for ((summary, &f), &onset) in analysis.iter_mut().zip(&flux).zip(&onsets) {
            summary.spectral_flux = round_to(f, 2);
            summary.onset_detected = onset;
        }

        Self {
            sample_rate,
            bit_depth: BIT_DEPTH,
            frame_duration_sec: settings.frame_duration,
            dropped_frames: store.dropped(),
            analysis,
        }
    }
}

/// Write the report as pretty JSON. The extension is forced to `.json` and
/// missing parent directories are created. Data goes to a temporary sibling
/// first, so a failed save leaves no partial report behind.
pub fn save_report(report: &FrequencyReport, path: &Path) -> Result<PathBuf> {
    let path = force_json_extension(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FxError::io(parent, e))?;
    }

    let tmp = path.with_extension("json.tmp");
    let result = write_json(report, &tmp)
        .and_then(|_| std::fs::rename(&tmp, &path).map_err(|e| FxError::io(&path, e)));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result?;

    log::info!(
        "Saved {} frequency frames to {}",
        report.analysis.len(),
        path.display()
    );
    Ok(path)
}

fn write_json(report: &FrequencyReport, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| FxError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush().map_err(|e| FxError::io(path, e))?;
    Ok(())
}
