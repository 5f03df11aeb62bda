pub mod analysis;
pub mod audio;
pub mod clock;
pub mod config;
pub mod dsp;
pub mod error;
pub mod params;
pub mod processor;
pub mod recording;

pub use error::{FxError, Result};
