//! Reshaping of causal self-attention weights for visualization.
//!
//! A causal language model that decodes `n` response tokens emits one
//! attention step per token. Each step holds one tensor per layer with layout
//! `[1, n_heads, a, b]`: the first step carries the full lower-triangular
//! prompt matrix (`a = b = prompt_len`), later steps carry a single row
//! (`a = 1`, `b = prompt_len + step`).
//!
//! [`AttentionMatrix`] wraps that ragged input and, once formatted, holds a
//! [`NormalizedAttention`]: a flat buffer laid out `[layer][head][step][position]`
//! where the sequence for response token `i` has `prompt_len + i` entries.
//! Formatting optionally zeroes the attention sunk into prompt position 0 and
//! optionally collapses the head axis (see [`AggregationMethod`]).
//!
//! Reductions run in `f32` on whatever device the input tensors live on. The
//! crate never touches the file system; [`AttentionMatrix`] implements serde's
//! traits so callers can persist it however they like.

pub mod aggregation;
pub mod core;
pub mod masks;
pub mod matrix;
pub mod normalized;
pub mod raw;

mod transform;

pub use aggregation::AggregationMethod;
pub use core::{AttentionError, FormatConfig};
pub use matrix::{AttentionMatrix, FormatOutcome};
pub use normalized::NormalizedAttention;
pub use raw::{RawAttentionMatrix, RawAttentionStep};
