/// Planar multi-channel sample block.
///
/// Storage is allocated once for `capacity` samples per channel; the host
/// changes the active length per block with `set_num_samples`, which never
/// reallocates.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    num_samples: usize,
}

impl AudioBuffer {
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            channels: vec![vec![0.0; capacity]; num_channels],
            num_samples: capacity,
        }
    }

    /// Build a buffer holding exactly the given channel data.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let num_samples = channels.iter().map(Vec::len).min().unwrap_or(0);
        Self {
            channels,
            num_samples,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn capacity(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Set the active block length, clamped to capacity.
    pub fn set_num_samples(&mut self, n: usize) {
        self.num_samples = n.min(self.capacity());
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch][..self.num_samples]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let n = self.num_samples;
        &mut self.channels[ch][..n]
    }

    pub fn sample(&self, ch: usize, i: usize) -> f32 {
        self.channels[ch][i]
    }

    pub fn clear_channel(&mut self, ch: usize) {
        self.channel_mut(ch).fill(0.0);
    }
}
