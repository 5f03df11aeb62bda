use crate::analysis::features::{FrequencyFrame, StereoMetrics};
use crate::error::{FxError, Result};

/// Insertion-ordered frame storage.
///
/// Magnitudes live in one flat buffer reserved up front, so `push` never
/// allocates. Frames arriving once the reservation is used up are counted in
/// `dropped()` instead of growing the buffer from the audio thread, as are
/// frames whose bin count does not match the store's.
#[derive(Debug, Default)]
pub struct FrameStore {
    bins_per_frame: usize,
    capacity: usize,
    times: Vec<f64>,
    stereo: Vec<StereoMetrics>,
    magnitudes: Vec<f32>,
    dropped: usize,
}

/// Borrowed view of one stored frame
#[derive(Clone, Copy, Debug)]
pub struct FrameRef<'a> {
    pub time_seconds: f64,
    pub magnitudes: &'a [f32],
    pub stereo: StereoMetrics,
}

impl FrameStore {
    /// Empty store with no reservation. Does not allocate.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reserve room for `capacity` frames of `bins_per_frame` bins. Fails
    /// instead of aborting when the reservation cannot be made.
    pub fn with_capacity(bins_per_frame: usize, capacity: usize) -> Result<Self> {
        let total = capacity.checked_mul(bins_per_frame).ok_or_else(|| {
            FxError::Config(format!(
                "frame store of {} x {} bins overflows",
                capacity, bins_per_frame
            ))
        })?;
        let reserve_failed = |e: std::collections::TryReserveError| {
            FxError::Config(format!("cannot reserve frame store for {} frames: {}", capacity, e))
        };

        let mut store = Self {
            bins_per_frame,
            capacity,
            ..Self::default()
        };
        store.times.try_reserve_exact(capacity).map_err(reserve_failed)?;
        store.stereo.try_reserve_exact(capacity).map_err(reserve_failed)?;
        store.magnitudes.try_reserve_exact(total).map_err(reserve_failed)?;
        Ok(store)
    }

    pub fn bins_per_frame(&self) -> usize {
        self.bins_per_frame
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Append a frame. Returns false and counts a drop when the store is
    /// full or the bin count does not match.
    pub fn push(&mut self, time_seconds: f64, magnitudes: &[f32], stereo: StereoMetrics) -> bool {
        if magnitudes.len() != self.bins_per_frame || self.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.times.push(time_seconds);
        self.stereo.push(stereo);
        self.magnitudes.extend_from_slice(magnitudes);
        true
    }

    /// Forget all frames, keeping the reservation.
    pub fn clear(&mut self) {
        self.times.clear();
        self.stereo.clear();
        self.magnitudes.clear();
        self.dropped = 0;
    }

    pub fn get(&self, index: usize) -> Option<FrameRef<'_>> {
        let time_seconds = *self.times.get(index)?;
        let start = index * self.bins_per_frame;
        Some(FrameRef {
            time_seconds,
            magnitudes: &self.magnitudes[start..start + self.bins_per_frame],
            stereo: self.stereo[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = FrameRef<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn to_frames(&self) -> Vec<FrequencyFrame> {
        self.iter()
            .map(|f| FrequencyFrame {
                time_seconds: f.time_seconds,
                magnitudes: f.magnitudes.to_vec(),
                stereo: f.stereo,
            })
            .collect()
    }
}
