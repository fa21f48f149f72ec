use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("attention matrix must be formatted before rendering")]
    Unformatted,

    #[error("read failed for {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed for {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse render config: {0}")]
    Config(String),

    #[error("invalid render config: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("payload error: {0}")]
    Payload(String),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Attention(#[from] attention::AttentionError),
}

impl RenderError {
    pub fn read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for RenderError {
    fn from(value: toml::de::Error) -> Self {
        RenderError::Config(value.to_string())
    }
}
