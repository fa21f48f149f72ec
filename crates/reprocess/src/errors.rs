use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReprocessError>;

#[derive(Error, Debug)]
pub enum ReprocessError {
    #[error("document carries no attention payload")]
    MissingPayload,

    #[error("invalid reprocess options: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

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

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Attention(#[from] attention::AttentionError),

    #[error(transparent)]
    Render(#[from] render::RenderError),
}
