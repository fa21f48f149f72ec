//! Options controlling how a raw attention matrix is formatted.

use serde::{Deserialize, Serialize};

use crate::aggregation::AggregationMethod;

/// Formatting knobs applied by [`AttentionMatrix::format_with`](crate::AttentionMatrix::format_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// How the head axis is reduced.
    pub method: AggregationMethod,
    /// Force attention towards prompt position 0 to zero before aggregation.
    ///
    /// Short prompts tend to sink most of their attention into the first
    /// token, which drowns out everything else in the rendering.
    pub zero_first_attention: bool,
}

impl FormatConfig {
    pub fn new(method: AggregationMethod, zero_first_attention: bool) -> Self {
        Self {
            method,
            zero_first_attention,
        }
    }
}
