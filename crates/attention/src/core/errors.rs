//! Error types emitted while inspecting, formatting, or decoding attention.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttentionError {
    /// The raw tensors do not match the documented per-step layout.
    #[error("malformed attention tensor: {context}")]
    MalformedTensor { context: String },

    /// A normalized buffer violates its shape invariants.
    #[error("invalid attention layout: {0}")]
    InvalidLayout(String),

    #[error("unknown aggregation method '{0}'")]
    UnknownAggregationMethod(String),

    #[error("tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AttentionError {
    pub fn malformed(context: impl Into<String>) -> Self {
        Self::MalformedTensor {
            context: context.into(),
        }
    }

    pub fn layout(message: impl Into<String>) -> Self {
        Self::InvalidLayout(message.into())
    }
}
