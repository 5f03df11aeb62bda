use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::FxError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    Gain,
    Distortion,
}

impl ParamId {
    pub const ALL: [ParamId; 2] = [ParamId::Gain, ParamId::Distortion];

    pub fn id(self) -> &'static str {
        match self {
            ParamId::Gain => "gain",
            ParamId::Distortion => "distortion",
        }
    }

    /// Inclusive value range.
    pub fn range(self) -> (f32, f32) {
        match self {
            ParamId::Gain => (0.0, 3.0),
            ParamId::Distortion => (0.0, 1.0),
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            ParamId::Gain => 1.0,
            ParamId::Distortion => 0.0,
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ParamId {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamId::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| FxError::Config(format!("Unknown parameter '{}'", s)))
    }
}

/// A single `f32` stored as bits for lock-free access
#[derive(Debug)]
pub struct ParamCell {
    bits: AtomicU32,
}

impl ParamCell {
    fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct ParameterSet {
    gain: ParamCell,
    distortion: ParamCell,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self {
            gain: ParamCell::new(ParamId::Gain.default_value()),
            distortion: ParamCell::new(ParamId::Distortion.default_value()),
        }
    }

    pub fn cell(&self, id: ParamId) -> &ParamCell {
        match id {
            ParamId::Gain => &self.gain,
            ParamId::Distortion => &self.distortion,
        }
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        self.cell(id).load()
    }

    /// Store a new value, clamped to the parameter's range.
    /// Non-finite values are rejected and the previous value is kept.
    pub fn set(&self, id: ParamId, value: f32) {
        if !value.is_finite() {
            log::warn!("Ignoring non-finite value {} for parameter '{}'", value, id);
            return;
        }
        let (min, max) = id.range();
        self.cell(id).store(value.clamp(min, max));
    }

    /// Current value by textual id, or `0.0` if the id is unknown.
    pub fn value_by_name(&self, id: &str) -> f32 {
        match id.parse::<ParamId>() {
            Ok(param) => self.get(param),
            Err(_) => {
                log::warn!("Parameter not found: {}", id);
                0.0
            }
        }
    }

    /// Live cell by textual id, or `None` if the id is unknown.
    pub fn cell_by_name(&self, id: &str) -> Option<&ParamCell> {
        match id.parse::<ParamId>() {
            Ok(param) => Some(self.cell(param)),
            Err(_) => {
                log::warn!("Parameter not found: {}", id);
                None
            }
        }
    }
}
