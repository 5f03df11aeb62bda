pub mod features;
pub mod spectrum;

pub use self::features::{FrequencyBand, FrequencyFrame, StereoMetrics, FREQUENCY_BANDS};
pub use self::spectrum::{AnalysisSettings, SpectralAnalyzer};
