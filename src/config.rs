use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::spectrum::AnalysisSettings;
use crate::error::{FxError, Result};
use crate::recording::paths::{OutputLocation, DEFAULT_APP_DIR};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub params: ParamsConfig,
    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_max_frequency")]
    pub max_frequency: f32,
    #[serde(default = "default_frame_duration")]
    pub frame_duration: f64,
    #[serde(default = "default_max_recording_seconds")]
    pub max_recording_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_app_dir_name")]
    pub app_dir_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ParamsConfig {
    #[serde(default = "default_gain")]
    pub gain: f32,
    #[serde(default = "default_distortion")]
    pub distortion: f32,
}

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            max_frequency: default_max_frequency(),
            frame_duration: default_frame_duration(),
            max_recording_seconds: default_max_recording_seconds(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            app_dir_name: default_app_dir_name(),
        }
    }
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            gain: default_gain(),
            distortion: default_distortion(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
        }
    }
}

fn default_fft_size() -> usize { 1024 }
fn default_max_frequency() -> f32 { 20_000.0 }
fn default_frame_duration() -> f64 { 0.01 }
fn default_max_recording_seconds() -> f64 { 600.0 }
fn default_app_dir_name() -> String { DEFAULT_APP_DIR.into() }
fn default_gain() -> f32 { 1.0 }
fn default_distortion() -> f32 { 0.0 }
fn default_block_size() -> usize { 512 }

impl AnalysisConfig {
    /// Validated analysis settings
    pub fn settings(&self) -> Result<AnalysisSettings> {
        let settings = AnalysisSettings {
            fft_size: self.fft_size,
            max_frequency: self.max_frequency,
            frame_duration: self.frame_duration,
            max_recording_seconds: self.max_recording_seconds,
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl OutputConfig {
    pub fn location(&self) -> OutputLocation {
        OutputLocation {
            directory: self.directory.clone(),
            app_dir_name: self.app_dir_name.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| FxError::io(path, e))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| FxError::Config(e.to_string()))
}

/// Explicit path, else `fxscope.toml` in the working directory, else the
/// user's config directory.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("fxscope.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("fxscope").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("fxscope").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_config("").unwrap();
        let settings = cfg.analysis.settings().unwrap();
        assert_eq!(settings, AnalysisSettings::default());
        assert_eq!(cfg.host.block_size, 512);
        assert_eq!(cfg.params.gain, 1.0);
        assert_eq!(cfg.output.app_dir_name, DEFAULT_APP_DIR);
        assert!(cfg.output.directory.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            r#"
            [analysis]
            fft_size = 2048

            [params]
            distortion = 0.3

            [output]
            directory = "/tmp/reports"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.analysis.fft_size, 2048);
        assert_eq!(cfg.analysis.frame_duration, 0.01);
        assert_eq!(cfg.params.distortion, 0.3);
        assert_eq!(cfg.params.gain, 1.0);
        assert_eq!(
            cfg.output.location().report_dir(),
            PathBuf::from("/tmp/reports").join(DEFAULT_APP_DIR)
        );
    }

    #[test]
    fn invalid_fft_size_is_rejected() {
        let cfg = parse_config("[analysis]\nfft_size = 1000\n").unwrap();
        assert!(matches!(cfg.analysis.settings(), Err(FxError::Config(_))));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(parse_config("[analysis"), Err(FxError::Config(_))));
    }

    #[test]
    fn explicit_path_wins() {
        let p = PathBuf::from("/somewhere/custom.toml");
        assert_eq!(find_config(Some(p.clone())), Some(p));
    }
}
