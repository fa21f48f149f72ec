use attention::NormalizedAttention;
use serde::{Deserialize, Serialize};

use crate::errors::{ReprocessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprocessConfig {
    /// Number of standard deviations above the mean a weight must exceed.
    pub cutoff: f64,
    /// Exponent applied to surviving weights; lower is stronger.
    pub corr_factor: f64,
    /// Leading positions forced to zero and left out of the statistics.
    pub first_ignored: usize,
}

impl Default for ReprocessConfig {
    fn default() -> Self {
        Self {
            cutoff: 0.5,
            corr_factor: 1.0 / 3.0,
            first_ignored: 1,
        }
    }
}

impl ReprocessConfig {
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReprocessError::Validation(errors))
        }
    }

    /// Every violated constraint, prefixed with the field name.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.corr_factor > 0.0 && self.corr_factor.is_finite()) {
            errors.push("corr_factor must be a finite value greater than 0".to_string());
        }
        if !self.cutoff.is_finite() {
            errors.push("cutoff must be finite".to_string());
        }
        errors
    }
}

/// Mean and population standard deviation.
fn mean_std(values: &[f32]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some((mean, variance.sqrt()))
}

/// Rescore one token's attention sequence in place.
///
/// Statistics cover `[first_ignored, window_end)`. An empty window keeps
/// nothing.
pub fn rescore_sequence(sequence: &mut [f32], window_end: usize, config: &ReprocessConfig) {
    let ignored = config.first_ignored.min(sequence.len());
    sequence[..ignored].fill(0.0);

    let window_end = window_end.min(sequence.len());
    let threshold = if ignored < window_end {
        mean_std(&sequence[ignored..window_end]).map(|(mean, std)| mean + config.cutoff * std)
    } else {
        None
    };

    for value in sequence.iter_mut() {
        let weight = f64::from(*value);
        *value = match threshold {
            Some(threshold) if weight > threshold => weight.powf(config.corr_factor) as f32,
            _ => 0.0,
        };
    }
}

/// Rescore every sequence. The statistics window of a `(layer, head)` group
/// ends at its shortest sequence, i.e. the prompt-only prefix.
pub fn rescore(attention: &mut NormalizedAttention, config: &ReprocessConfig) {
    let window_end = (0..attention.num_steps())
        .map(|step| attention.step_len(step))
        .min()
        .unwrap_or(0);

    for layer in 0..attention.num_layers() {
        for head in 0..attention.num_heads() {
            for step in 0..attention.num_steps() {
                rescore_sequence(attention.sequence_mut(layer, head, step), window_end, config);
            }
        }
    }
}
