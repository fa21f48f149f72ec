//! Masks applied to attention rows before aggregation.
//!
//! Masks here are multiplicative `f32` tensors shaped `[1, k_len]`: `1.0`
//! keeps a position and `0.0` forces it to zero. They broadcast over the head
//! axis of a `[heads, k_len]` slice.

pub mod first_position;

use candle_core::DType;

/// Dtype shared by all multiplicative masks.
pub const MASK_DTYPE: DType = DType::F32;

pub use first_position::{build_first_position_mask, zero_first_position};

#[cfg(test)]
mod tests;
