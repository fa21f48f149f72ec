//! Reshape raw per-step attention into a [`NormalizedAttention`] buffer.
//!
//! The input is token-major (`steps × layers × [1, heads, a, b]`), the output
//! is layer-major (`layers × heads' × steps × positions`). Shapes are checked
//! for every step up front so the output buffer can be allocated once and each
//! aggregated row written straight into its final slot.

use candle_core::{DType, Tensor};

use crate::core::{AttentionError, FormatConfig};
use crate::masks::zero_first_position;
use crate::normalized::NormalizedAttention;
use crate::raw::{inspect_step, RawAttentionStep};

pub(crate) fn normalize(
    raw: &[RawAttentionStep],
    num_layers: usize,
    num_heads: usize,
    config: &FormatConfig,
) -> Result<NormalizedAttention, AttentionError> {
    let step_lengths = step_lengths(raw, num_layers, num_heads)?;
    let out_heads = config.method.output_heads(num_heads);
    let mut normalized = NormalizedAttention::zeros(num_layers, out_heads, &step_lengths)?;

    for (index, step) in raw.iter().enumerate() {
        for (layer, tensor) in step.iter().enumerate() {
            let rows = query_rows(tensor, index)?;
            let rows = if config.zero_first_attention {
                zero_first_position(&rows)?
            } else {
                rows
            };
            let rows = config.method.aggregate(&rows)?.to_vec2::<f32>()?;
            for (head, row) in rows.iter().enumerate() {
                normalized.sequence_mut(layer, head, index).copy_from_slice(row);
            }
        }
    }

    Ok(normalized)
}

fn step_lengths(
    raw: &[RawAttentionStep],
    num_layers: usize,
    num_heads: usize,
) -> Result<Vec<usize>, AttentionError> {
    if raw.is_empty() {
        return Err(AttentionError::malformed("no response steps"));
    }
    let mut lengths = Vec::with_capacity(raw.len());
    let mut prompt_len = None;
    for (index, step) in raw.iter().enumerate() {
        let expected = prompt_len.map(|len| len + index);
        let len = inspect_step(step, index, num_layers, num_heads, expected)?;
        if prompt_len.is_none() {
            prompt_len = Some(len);
        }
        lengths.push(len);
    }
    Ok(lengths)
}

/// Reduce a `[1, heads, a, b]` layer tensor to the `[heads, b]` rows of the
/// newest query.
///
/// Step 0 carries the whole prompt-to-prompt matrix; only its last row, the
/// attention from the final prompt token, belongs to the first response token.
/// Dimensions are squeezed by index so a single-head model keeps its head axis.
fn query_rows(tensor: &Tensor, step: usize) -> Result<Tensor, AttentionError> {
    let heads = tensor.to_dtype(DType::F32)?.squeeze(0)?;
    let rows = heads.dim(1)?;
    let last = if step == 0 {
        heads.narrow(1, rows - 1, 1)?
    } else {
        heads
    };
    Ok(last.squeeze(1)?)
}
