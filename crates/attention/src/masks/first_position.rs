//! Masking of the attention directed at prompt position 0.
//!
//! Shallow causal models attending over short prompts dump a large share of
//! their probability mass onto the first (usually BOS) token. Zeroing that
//! column keeps the remaining structure visible.

use candle_core::{Device, Result, Tensor};

use super::MASK_DTYPE;

/// Construct a `[1, k_len]` mask that zeroes position 0 and keeps the rest.
pub fn build_first_position_mask(device: &Device, k_len: usize) -> Result<Tensor> {
    let mut data = vec![1f32; k_len];
    if let Some(first) = data.first_mut() {
        *first = 0.0;
    }
    Tensor::from_vec(data, (1, k_len), device)?.to_dtype(MASK_DTYPE)
}

/// Zero column 0 of a `[heads, k_len]` slice for every head.
///
/// Weights are expected to be finite; the result at position 0 is exactly
/// `0.0` for any non-negative input.
pub fn zero_first_position(rows: &Tensor) -> Result<Tensor> {
    let (_, k_len) = rows.dims2()?;
    let mask = build_first_position_mask(rows.device(), k_len)?;
    rows.broadcast_mul(&mask)
}
