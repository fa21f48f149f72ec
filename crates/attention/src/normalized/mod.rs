//! Flat, layer-major storage for formatted attention.
//!
//! Values are stored in a single buffer with layout
//! `[layer][head][step][position]`. The last dimension is jagged: response
//! token `step` attends over `prompt_len + step` positions. Every
//! `(layer, head)` block has the same size, so a block starts at
//! `(layer * num_heads + head) * block_len` and a sequence starts at the
//! block start plus the prefix sum of the preceding step lengths.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::AttentionError;

/// Nested `[layer][head][token][position]` form used on the wire.
pub type NestedAttention = Vec<Vec<Vec<Vec<f32>>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NormalizedRecord", into = "NormalizedRecord")]
pub struct NormalizedAttention {
    num_layers: usize,
    num_heads: usize,
    /// Prefix sums of the step lengths; `steps + 1` entries starting at 0.
    step_offsets: Vec<usize>,
    values: Vec<f32>,
}

impl NormalizedAttention {
    /// Allocate a zero-filled buffer for the given step lengths.
    pub fn zeros(
        num_layers: usize,
        num_heads: usize,
        step_lengths: &[usize],
    ) -> Result<Self, AttentionError> {
        let step_offsets = validate_layout(num_layers, num_heads, step_lengths)?;
        let len = buffer_len(num_layers, num_heads, &step_offsets)?;
        Ok(Self {
            num_layers,
            num_heads,
            step_offsets,
            values: vec![0.0; len],
        })
    }

    /// Wrap an existing buffer laid out as documented at module level.
    pub fn from_parts(
        num_layers: usize,
        num_heads: usize,
        step_lengths: &[usize],
        values: Vec<f32>,
    ) -> Result<Self, AttentionError> {
        let step_offsets = validate_layout(num_layers, num_heads, step_lengths)?;
        let expected = buffer_len(num_layers, num_heads, &step_offsets)?;
        if values.len() != expected {
            return Err(AttentionError::layout(format!(
                "buffer holds {} values, layout requires {expected}",
                values.len()
            )));
        }
        Ok(Self {
            num_layers,
            num_heads,
            step_offsets,
            values,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Number of response tokens.
    pub fn num_steps(&self) -> usize {
        self.step_offsets.len() - 1
    }

    pub fn step_len(&self, step: usize) -> usize {
        self.step_offsets[step + 1] - self.step_offsets[step]
    }

    pub fn step_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.step_offsets.windows(2).map(|pair| pair[1] - pair[0])
    }

    /// Length of the prompt, i.e. the sequence length of the first response token.
    pub fn prompt_length(&self) -> usize {
        self.step_len(0)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    fn block_len(&self) -> usize {
        self.step_offsets[self.num_steps()]
    }

    fn span(&self, layer: usize, head: usize, step: usize) -> Range<usize> {
        assert!(
            layer < self.num_layers && head < self.num_heads && step < self.num_steps(),
            "attention index ({layer}, {head}, {step}) out of bounds for ({}, {}, {})",
            self.num_layers,
            self.num_heads,
            self.num_steps()
        );
        let base = (layer * self.num_heads + head) * self.block_len();
        base + self.step_offsets[step]..base + self.step_offsets[step + 1]
    }

    /// Attention of response token `step` over every prior position.
    ///
    /// # Panics
    ///
    /// Panics when an index is out of bounds, like slice indexing.
    pub fn sequence(&self, layer: usize, head: usize, step: usize) -> &[f32] {
        let span = self.span(layer, head, step);
        &self.values[span]
    }

    pub fn sequence_mut(&mut self, layer: usize, head: usize, step: usize) -> &mut [f32] {
        let span = self.span(layer, head, step);
        &mut self.values[span]
    }

    pub fn get(&self, layer: usize, head: usize, step: usize, position: usize) -> Option<f32> {
        if layer >= self.num_layers || head >= self.num_heads || step >= self.num_steps() {
            return None;
        }
        self.sequence(layer, head, step).get(position).copied()
    }

    /// Every token sequence of one `(layer, head)` pair, in step order.
    pub fn head_sequences(&self, layer: usize, head: usize) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.num_steps()).map(move |step| self.sequence(layer, head, step))
    }

    /// Copy a single layer restricted to a contiguous head range.
    ///
    /// The result has one layer and `heads.len()` heads.
    pub fn select_heads(&self, layer: usize, heads: Range<usize>) -> Result<Self, AttentionError> {
        if layer >= self.num_layers {
            return Err(AttentionError::layout(format!(
                "layer {layer} out of range for {} layer(s)",
                self.num_layers
            )));
        }
        if heads.is_empty() || heads.end > self.num_heads {
            return Err(AttentionError::layout(format!(
                "head range {heads:?} invalid for {} head(s)",
                self.num_heads
            )));
        }

        let block_len = self.block_len();
        let start = (layer * self.num_heads + heads.start) * block_len;
        let end = (layer * self.num_heads + heads.end) * block_len;
        Ok(Self {
            num_layers: 1,
            num_heads: heads.len(),
            step_offsets: self.step_offsets.clone(),
            values: self.values[start..end].to_vec(),
        })
    }

    pub fn to_nested(&self) -> NestedAttention {
        (0..self.num_layers)
            .map(|layer| {
                (0..self.num_heads)
                    .map(|head| self.head_sequences(layer, head).map(<[f32]>::to_vec).collect())
                    .collect()
            })
            .collect()
    }

    /// Build from the nested wire form, checking that every `(layer, head)`
    /// pair carries the same jagged step lengths.
    pub fn from_nested(nested: &[Vec<Vec<Vec<f32>>>]) -> Result<Self, AttentionError> {
        let num_layers = nested.len();
        let num_heads = nested.first().map(Vec::len).unwrap_or(0);
        let step_lengths: Vec<usize> = nested
            .first()
            .and_then(|heads| heads.first())
            .map(|steps| steps.iter().map(Vec::len).collect())
            .unwrap_or_default();

        let mut attention = Self::zeros(num_layers, num_heads, &step_lengths)?;
        for (layer, heads) in nested.iter().enumerate() {
            if heads.len() != num_heads {
                return Err(AttentionError::layout(format!(
                    "layer {layer} has {} heads, expected {num_heads}",
                    heads.len()
                )));
            }
            for (head, steps) in heads.iter().enumerate() {
                if steps.len() != step_lengths.len() {
                    return Err(AttentionError::layout(format!(
                        "layer {layer} head {head} has {} tokens, expected {}",
                        steps.len(),
                        step_lengths.len()
                    )));
                }
                for (step, sequence) in steps.iter().enumerate() {
                    let target = attention.sequence_mut(layer, head, step);
                    if target.len() != sequence.len() {
                        return Err(AttentionError::layout(format!(
                            "layer {layer} head {head} token {step} has {} positions, expected {}",
                            sequence.len(),
                            target.len()
                        )));
                    }
                    target.copy_from_slice(sequence);
                }
            }
        }
        Ok(attention)
    }
}

/// Check the layout invariants and return the step offsets.
fn validate_layout(
    num_layers: usize,
    num_heads: usize,
    step_lengths: &[usize],
) -> Result<Vec<usize>, AttentionError> {
    if num_layers == 0 {
        return Err(AttentionError::layout("at least one layer is required"));
    }
    if num_heads == 0 {
        return Err(AttentionError::layout("at least one head is required"));
    }
    let Some(&first) = step_lengths.first() else {
        return Err(AttentionError::layout("at least one response token is required"));
    };
    if first == 0 {
        return Err(AttentionError::layout("the first token must attend over the prompt"));
    }

    let mut offsets = Vec::with_capacity(step_lengths.len() + 1);
    offsets.push(0);
    let mut total = 0usize;
    for (step, &len) in step_lengths.iter().enumerate() {
        let expected = first
            .checked_add(step)
            .ok_or_else(|| AttentionError::layout(format!("token {step} length overflows")))?;
        if len != expected {
            return Err(AttentionError::layout(format!(
                "token {step} attends over {len} positions, expected {expected}"
            )));
        }
        total = total
            .checked_add(len)
            .ok_or_else(|| AttentionError::layout("total sequence length overflows"))?;
        offsets.push(total);
    }
    Ok(offsets)
}

/// Number of values a validated layout holds.
fn buffer_len(
    num_layers: usize,
    num_heads: usize,
    step_offsets: &[usize],
) -> Result<usize, AttentionError> {
    let block_len = step_offsets.last().copied().unwrap_or(0);
    num_layers
        .checked_mul(num_heads)
        .and_then(|blocks| blocks.checked_mul(block_len))
        .ok_or_else(|| {
            AttentionError::layout(format!(
                "{num_layers} layers x {num_heads} heads x {block_len} positions overflows"
            ))
        })
}

#[derive(Serialize, Deserialize)]
struct NormalizedRecord {
    num_layers: usize,
    num_heads: usize,
    step_lengths: Vec<usize>,
    values: Vec<f32>,
}

impl TryFrom<NormalizedRecord> for NormalizedAttention {
    type Error = AttentionError;

    fn try_from(record: NormalizedRecord) -> Result<Self, Self::Error> {
        Self::from_parts(
            record.num_layers,
            record.num_heads,
            &record.step_lengths,
            record.values,
        )
    }
}

impl From<NormalizedAttention> for NormalizedRecord {
    fn from(attention: NormalizedAttention) -> Self {
        let step_lengths = attention.step_lengths().collect();
        Self {
            num_layers: attention.num_layers,
            num_heads: attention.num_heads,
            step_lengths,
            values: attention.values,
        }
    }
}
