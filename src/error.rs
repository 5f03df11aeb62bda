use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FxError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FxError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FxError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FxError>;
