//! Raw, per-step attention as emitted by a decoding loop.
//!
//! Step `i` holds one tensor per layer, each shaped `[1, n_heads, a, b]`:
//!
//! * `i == 0`: `a = b = prompt_len`, a lower-triangular prompt-to-prompt matrix.
//! * `i > 0`: `a = 1`, `b = prompt_len + i`, the single query row of the new token.

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::core::AttentionError;

/// Attention for one generated response token: one tensor per layer.
pub type RawAttentionStep = Vec<Tensor>;

/// Attention for a whole completion, one [`RawAttentionStep`] per response token.
pub type RawAttentionMatrix = Vec<RawAttentionStep>;

/// Dimensions of a single `[1, heads, rows, cols]` layer tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerShape {
    pub heads: usize,
    pub rows: usize,
    pub cols: usize,
}

impl LayerShape {
    pub fn of(tensor: &Tensor, step: usize, layer: usize) -> Result<Self, AttentionError> {
        match tensor.dims() {
            &[1, heads, rows, cols] if heads > 0 && rows > 0 && cols > 0 => {
                Ok(Self { heads, rows, cols })
            }
            dims => Err(AttentionError::malformed(format!(
                "step {step} layer {layer}: expected [1, heads, rows, cols] with non-zero extents, got {dims:?}"
            ))),
        }
    }
}

/// Derive `(num_layers, num_heads)` from the first response step.
///
/// Later steps are only checked when the matrix is formatted.
pub fn leading_dims(raw: &[RawAttentionStep]) -> Result<(usize, usize), AttentionError> {
    let first = raw
        .first()
        .ok_or_else(|| AttentionError::malformed("no response steps"))?;
    let tensor = first
        .first()
        .ok_or_else(|| AttentionError::malformed("step 0 has no layers"))?;
    let shape = LayerShape::of(tensor, 0, 0)?;
    Ok((first.len(), shape.heads))
}

/// Validate every layer of a step and return its sequence length.
///
/// `expected_cols` is `None` for step 0, which fixes the prompt length.
pub(crate) fn inspect_step(
    step: &[Tensor],
    index: usize,
    num_layers: usize,
    num_heads: usize,
    expected_cols: Option<usize>,
) -> Result<usize, AttentionError> {
    if step.len() != num_layers {
        return Err(AttentionError::malformed(format!(
            "step {index} has {} layers, expected {num_layers}",
            step.len()
        )));
    }

    let mut cols = expected_cols;
    for (layer, tensor) in step.iter().enumerate() {
        let shape = LayerShape::of(tensor, index, layer)?;
        if shape.heads != num_heads {
            return Err(AttentionError::malformed(format!(
                "step {index} layer {layer} has {} heads, expected {num_heads}",
                shape.heads
            )));
        }
        if index == 0 && shape.rows != shape.cols {
            return Err(AttentionError::malformed(format!(
                "step 0 layer {layer} is {}x{}, expected a square prompt matrix",
                shape.rows, shape.cols
            )));
        }
        if index > 0 && shape.rows != 1 {
            return Err(AttentionError::malformed(format!(
                "step {index} layer {layer} has {} query rows, expected 1",
                shape.rows
            )));
        }
        match cols {
            Some(expected) if expected != shape.cols => {
                return Err(AttentionError::malformed(format!(
                    "step {index} layer {layer} attends over {} positions, expected {expected}",
                    shape.cols
                )));
            }
            Some(_) => {}
            None => cols = Some(shape.cols),
        }
    }

    cols.ok_or_else(|| AttentionError::malformed(format!("step {index} has no layers")))
}

/// Serializable snapshot of one raw tensor, values in row-major `f32`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl TensorRecord {
    pub fn from_tensor(tensor: &Tensor) -> Result<Self, AttentionError> {
        let values = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        Ok(Self {
            shape: tensor.dims().to_vec(),
            values,
        })
    }

    /// Rebuild the tensor on `device`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor, AttentionError> {
        let expected: usize = self.shape.iter().product();
        if expected != self.values.len() {
            return Err(AttentionError::malformed(format!(
                "tensor record of shape {:?} carries {} values",
                self.shape,
                self.values.len()
            )));
        }
        Ok(Tensor::from_vec(
            self.values.clone(),
            self.shape.as_slice(),
            device,
        )?)
    }
}
