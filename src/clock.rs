use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Monotonic time in seconds. Only differences are meaningful.
    fn now_seconds(&self) -> f64;
}

/// Wall clock, for hosts that deliver audio in real time
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Stream position clock: time advances with the number of sample frames the
/// host has delivered, so offline rendering produces the same timestamps as
/// real-time playback would.
pub struct StreamClock {
    sample_rate: u32,
    frames: AtomicU64,
}

impl StreamClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, frames: usize) {
        self.frames.fetch_add(frames as u64, Ordering::AcqRel);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl Clock for StreamClock {
    fn now_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Manually driven clock for tests
#[cfg(test)]
pub struct ManualClock {
    bits: AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_seconds(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
