//! The JSON payload embedded in rendered documents and its markers.
//!
//! The payload occupies exactly one line of the document:
//!
//! ```text
//! const params = {"attention":{...},"root_div_id":"..."}; // att-viz:payload
//! ```
//!
//! [`PAYLOAD_PREFIX`] only ever appears once per document and the JSON is
//! always serialized on a single line with `</` escaped, so [`locate`] can find
//! the payload with plain string search.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::{RenderError, Result};
use crate::layout::TokenBox;

/// Assignment that opens the payload line.
pub const PAYLOAD_PREFIX: &str = "const params = ";
/// Terminator that closes the payload line.
pub const PAYLOAD_SUFFIX: &str = "; // att-viz:payload";
/// Placeholder in the client script replaced by the serialized payload.
pub const PAYLOAD_PLACEHOLDER: &str = "ATT_VIZ_PARAMS";

/// Everything the client script needs to draw one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionPayload {
    pub name: String,
    pub tokens: Vec<String>,
    pub prompt_length: usize,
    pub pos: Vec<TokenBox>,
    pub dy_total: f64,
    /// Index of the first head in this document within the full model.
    pub head_start_idx: usize,
    /// `[layer][head][token][position]` attention weights.
    pub attn: Vec<Vec<Vec<Vec<f32>>>>,
    pub num_heads: usize,
    pub num_layers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationParams {
    pub attention: AttentionPayload,
    pub root_div_id: String,
}

/// Serialize a payload to single-line JSON that is safe inside `<script>`.
pub fn to_script_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

/// Substitute the payload into a script template holding [`PAYLOAD_PLACEHOLDER`].
pub fn embed(template: &str, json: &str) -> Result<String> {
    let marker = format!("{PAYLOAD_PREFIX}{PAYLOAD_PLACEHOLDER}{PAYLOAD_SUFFIX}");
    if template.matches(marker.as_str()).count() != 1 {
        return Err(RenderError::Payload(
            "script template must contain exactly one payload marker".to_string(),
        ));
    }
    Ok(template.replacen(
        marker.as_str(),
        &format!("{PAYLOAD_PREFIX}{json}{PAYLOAD_SUFFIX}"),
        1,
    ))
}

/// Byte range of the payload JSON within `document`, if present.
pub fn locate(document: &str) -> Option<Range<usize>> {
    let prefix = document.find(PAYLOAD_PREFIX)?;
    let start = prefix + PAYLOAD_PREFIX.len();
    let line_end = document[start..]
        .find('\n')
        .map_or(document.len(), |offset| start + offset);
    let end = start + document[start..line_end].rfind(PAYLOAD_SUFFIX)?;
    Some(start..end)
}

/// Replace the located payload with `json`, leaving the rest untouched.
pub fn replace(document: &str, json: &str) -> Result<String> {
    let range = locate(document)
        .ok_or_else(|| RenderError::Payload("document carries no payload marker".to_string()))?;
    let mut out = String::with_capacity(document.len() - range.len() + json.len());
    out.push_str(&document[..range.start]);
    out.push_str(json);
    out.push_str(&document[range.end..]);
    Ok(out)
}
