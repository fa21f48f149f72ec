use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a model backend behind [`CompletionSource`](crate::CompletionSource).
pub type GenerationFailure = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
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

    #[error("failed to encode experiment record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode experiment record: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported experiment record version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("{prompts} prompt(s) but {paths} save path(s)")]
    MismatchedInputs { prompts: usize, paths: usize },

    #[error("generation failed: {0}")]
    Generation(#[source] GenerationFailure),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Attention(#[from] attention::AttentionError),

    #[error(transparent)]
    Render(#[from] render::RenderError),

    #[error(transparent)]
    Reprocess(#[from] reprocess::ReprocessError),
}

impl Error {
    pub fn generation<E>(err: E) -> Self
    where
        E: Into<GenerationFailure>,
    {
        Error::Generation(err.into())
    }

    pub(crate) fn read_failed(path: &Path, source: std::io::Error) -> Self {
        Error::ReadFailed {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn write_failed(path: &Path, source: std::io::Error) -> Self {
        Error::WriteFailed {
            path: path.to_path_buf(),
            source,
        }
    }
}
