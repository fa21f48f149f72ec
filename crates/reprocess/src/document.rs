//! Rewriting the payload of a rendered document.

use std::{
    fs,
    path::{Path, PathBuf},
};

use attention::NormalizedAttention;
use render::payload::{locate, replace, to_script_json};
use serde_json::Value;

use crate::errors::{ReprocessError, Result};
use crate::filter::{rescore, ReprocessConfig};

/// Rescore the attention embedded in `document` and return the rewritten text.
///
/// Everything outside the payload, and every payload field other than
/// `attention.attn`, is preserved.
pub fn reprocess_document(document: &str, config: &ReprocessConfig) -> Result<String> {
    config.validate()?;
    let range = locate(document).ok_or(ReprocessError::MissingPayload)?;
    log::info!("reprocess: payload spans {} characters", range.len());

    let mut params: Value = serde_json::from_str(&document[range])?;
    let attn = params
        .get_mut("attention")
        .and_then(|attention| attention.get_mut("attn"))
        .ok_or_else(|| ReprocessError::MalformedPayload("missing attention.attn".to_string()))?;

    let nested: Vec<Vec<Vec<Vec<f32>>>> = serde_json::from_value(attn.take())?;
    let mut attention = NormalizedAttention::from_nested(&nested)?;
    rescore(&mut attention, config);
    *attn = serde_json::to_value(attention.to_nested())?;

    Ok(replace(document, &to_script_json(&params)?)?)
}

/// `{stem}_reprocessed{.ext}` beside `input`.
pub fn reprocessed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}_reprocessed.{}", ext.to_string_lossy()),
        None => format!("{stem}_reprocessed"),
    };
    input.with_file_name(name)
}

/// Reprocess a document on disk and return the path of the new document.
pub fn reprocess_file(input: &Path, config: &ReprocessConfig) -> Result<PathBuf> {
    let document = fs::read_to_string(input).map_err(|source| ReprocessError::ReadFailed {
        path: input.to_path_buf(),
        source,
    })?;
    let rewritten = reprocess_document(&document, config)?;

    let output = reprocessed_path(input);
    fs::write(&output, rewritten).map_err(|source| ReprocessError::WriteFailed {
        path: output.clone(),
        source,
    })?;
    Ok(output)
}
