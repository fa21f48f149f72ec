//! Reduction applied to the head axis of each per-layer attention slice.

use std::{fmt, str::FromStr};

use candle_core::{Result, Tensor};
use serde::{Deserialize, Serialize};

use crate::core::AttentionError;

/// Supported head aggregation policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Keep every head; layers and heads are both preserved.
    #[default]
    None,
    /// Collapse the head axis with an arithmetic mean.
    HeadwiseAveraging,
}

impl AggregationMethod {
    pub const ALL: [AggregationMethod; 2] =
        [AggregationMethod::None, AggregationMethod::HeadwiseAveraging];

    /// Number of heads left after aggregating `heads` heads.
    pub fn output_heads(self, heads: usize) -> usize {
        match self {
            AggregationMethod::None => heads,
            AggregationMethod::HeadwiseAveraging => 1,
        }
    }

    pub fn collapses_heads(self) -> bool {
        matches!(self, AggregationMethod::HeadwiseAveraging)
    }

    /// Reduce a `[heads, positions]` slice to `[output_heads, positions]`.
    pub fn aggregate(self, rows: &Tensor) -> Result<Tensor> {
        match self {
            AggregationMethod::None => Ok(rows.clone()),
            AggregationMethod::HeadwiseAveraging => rows.mean_keepdim(0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggregationMethod::None => "none",
            AggregationMethod::HeadwiseAveraging => "headwise_averaging",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = AttentionError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "none" => Ok(AggregationMethod::None),
            "headwise_averaging" | "headwise-averaging" | "headwise" => {
                Ok(AggregationMethod::HeadwiseAveraging)
            }
            other => Err(AttentionError::UnknownAggregationMethod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn none_keeps_every_head() -> Result<()> {
        let rows = Tensor::from_vec(vec![0.1f32, 0.9, 0.5, 0.5], (2, 2), &Device::Cpu)?;
        let out = AggregationMethod::None.aggregate(&rows)?;
        assert_eq!(out.dims(), &[2, 2]);
        assert_eq!(out.to_vec2::<f32>()?, rows.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn headwise_averaging_collapses_heads() -> Result<()> {
        let rows = Tensor::from_vec(vec![0.2f32, 0.8, 0.6, 0.4], (2, 2), &Device::Cpu)?;
        let out = AggregationMethod::HeadwiseAveraging.aggregate(&rows)?;
        assert_eq!(out.dims(), &[1, 2]);
        let values = out.to_vec2::<f32>()?;
        assert!((values[0][0] - 0.4).abs() < 1e-6);
        assert!((values[0][1] - 0.6).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn parses_known_names_and_rejects_others() {
        assert_eq!(
            "headwise-averaging".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::HeadwiseAveraging
        );
        assert_eq!(
            " NONE ".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::None
        );
        let err = "median".parse::<AggregationMethod>().unwrap_err();
        assert!(err.to_string().contains("median"));
    }

    #[test]
    fn output_heads_follow_method() {
        assert_eq!(AggregationMethod::None.output_heads(16), 16);
        assert_eq!(AggregationMethod::HeadwiseAveraging.output_heads(16), 1);
        for method in AggregationMethod::ALL {
            assert_eq!(method.to_string().parse::<AggregationMethod>().unwrap(), method);
        }
    }
}
