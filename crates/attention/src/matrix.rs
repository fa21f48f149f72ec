//! The one-shot formatting wrapper around a completion's attention.

use std::fmt;

use candle_core::Device;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

use crate::aggregation::AggregationMethod;
use crate::core::{AttentionError, FormatConfig};
use crate::normalized::NormalizedAttention;
use crate::raw::{leading_dims, RawAttentionMatrix, RawAttentionStep, TensorRecord};
use crate::transform::normalize;

#[derive(Debug, Clone)]
enum MatrixState {
    Raw(RawAttentionMatrix),
    Formatted(NormalizedAttention),
}

/// Self-attention of a completion, either raw or formatted for rendering.
///
/// `num_layers` and `num_heads` are derived from the first response step at
/// construction and from the normalized buffer after formatting. Formatting
/// replaces the raw tensors; the raw form is not retained.
///
/// Equality only compares `num_heads`, `num_layers`, the formatted flag and
/// the number of response tokens. Use [`AttentionMatrix::normalized`] to
/// compare formatted content.
#[derive(Debug, Clone)]
pub struct AttentionMatrix {
    state: MatrixState,
    num_layers: usize,
    num_heads: usize,
}

/// Result of a [`AttentionMatrix::format`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOutcome {
    Formatted,
    /// The matrix had already been formatted; nothing changed.
    AlreadyFormatted,
}

impl AttentionMatrix {
    /// Wrap the raw attention of a completion.
    ///
    /// The input must hold at least one step whose first layer is shaped
    /// `[1, heads, a, b]` with non-zero extents; anything else is rejected as
    /// a malformed tensor. The remaining steps are validated by
    /// [`format`](Self::format).
    pub fn new(raw: RawAttentionMatrix) -> Result<Self, AttentionError> {
        let (num_layers, num_heads) = leading_dims(&raw)?;
        log::debug!(
            "attention matrix wrapped: steps={} layers={} heads={}",
            raw.len(),
            num_layers,
            num_heads
        );
        Ok(Self {
            state: MatrixState::Raw(raw),
            num_layers,
            num_heads,
        })
    }

    /// Wrap attention that has already been normalized.
    pub fn from_normalized(normalized: NormalizedAttention) -> Self {
        Self {
            num_layers: normalized.num_layers(),
            num_heads: normalized.num_heads(),
            state: MatrixState::Formatted(normalized),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn is_formatted(&self) -> bool {
        matches!(self.state, MatrixState::Formatted(_))
    }

    pub fn num_response_tokens(&self) -> usize {
        match &self.state {
            MatrixState::Raw(raw) => raw.len(),
            MatrixState::Formatted(normalized) => normalized.num_steps(),
        }
    }

    /// Raw per-step tensors, available until the matrix is formatted.
    pub fn raw(&self) -> Option<&[RawAttentionStep]> {
        match &self.state {
            MatrixState::Raw(raw) => Some(raw),
            MatrixState::Formatted(_) => None,
        }
    }

    /// Normalized `[layer][head][token][position]` attention, once formatted.
    pub fn normalized(&self) -> Option<&NormalizedAttention> {
        match &self.state {
            MatrixState::Formatted(normalized) => Some(normalized),
            MatrixState::Raw(_) => None,
        }
    }

    pub fn into_normalized(self) -> Option<NormalizedAttention> {
        match self.state {
            MatrixState::Formatted(normalized) => Some(normalized),
            MatrixState::Raw(_) => None,
        }
    }

    /// Format the wrapped attention for rendering.
    ///
    /// Only the first call does any work. Later calls leave the matrix
    /// untouched, log a warning, and report [`FormatOutcome::AlreadyFormatted`].
    /// On error the matrix keeps its raw state.
    pub fn format(
        &mut self,
        method: AggregationMethod,
        zero_first_attention: bool,
    ) -> Result<FormatOutcome, AttentionError> {
        self.format_with(&FormatConfig::new(method, zero_first_attention))
    }

    pub fn format_with(&mut self, config: &FormatConfig) -> Result<FormatOutcome, AttentionError> {
        let raw = match &self.state {
            MatrixState::Raw(raw) => raw,
            MatrixState::Formatted(_) => {
                log::warn!(
                    "attention matrix already formatted; ignoring format request (method={}, zero_first_attention={})",
                    config.method,
                    config.zero_first_attention
                );
                return Ok(FormatOutcome::AlreadyFormatted);
            }
        };

        let normalized = normalize(raw, self.num_layers, self.num_heads, config)?;
        log::info!(
            "attention formatted: layers={} heads={} tokens={} prompt_len={} method={} zero_first_attention={}",
            normalized.num_layers(),
            normalized.num_heads(),
            normalized.num_steps(),
            normalized.prompt_length(),
            config.method,
            config.zero_first_attention
        );

        self.num_layers = normalized.num_layers();
        self.num_heads = normalized.num_heads();
        self.state = MatrixState::Formatted(normalized);
        Ok(FormatOutcome::Formatted)
    }

    /// Encode into the JSON record used for persistence.
    pub fn to_json(&self) -> Result<Vec<u8>, AttentionError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, AttentionError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl PartialEq for AttentionMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.num_heads == other.num_heads
            && self.num_layers == other.num_layers
            && self.is_formatted() == other.is_formatted()
            && self.num_response_tokens() == other.num_response_tokens()
    }
}

impl fmt::Display for AttentionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AttentionMatrix ({} head(s), {} layer(s))",
            self.num_heads, self.num_layers
        )
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum MatrixRecord {
    Raw { steps: Vec<Vec<TensorRecord>> },
    Formatted { attention: NormalizedAttention },
}

impl MatrixRecord {
    fn capture(matrix: &AttentionMatrix) -> Result<Self, AttentionError> {
        match &matrix.state {
            MatrixState::Raw(raw) => {
                let steps = raw
                    .iter()
                    .map(|step| step.iter().map(TensorRecord::from_tensor).collect())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(MatrixRecord::Raw { steps })
            }
            MatrixState::Formatted(normalized) => Ok(MatrixRecord::Formatted {
                attention: normalized.clone(),
            }),
        }
    }

    fn restore(self) -> Result<AttentionMatrix, AttentionError> {
        match self {
            MatrixRecord::Raw { steps } => {
                let device = Device::Cpu;
                let raw = steps
                    .iter()
                    .map(|step| step.iter().map(|record| record.to_tensor(&device)).collect())
                    .collect::<Result<Vec<_>, _>>()?;
                AttentionMatrix::new(raw)
            }
            MatrixRecord::Formatted { attention } => Ok(AttentionMatrix::from_normalized(attention)),
        }
    }
}

impl Serialize for AttentionMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MatrixRecord::capture(self)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttentionMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        MatrixRecord::deserialize(deserializer)?
            .restore()
            .map_err(de::Error::custom)
    }
}
