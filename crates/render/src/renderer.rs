//! Turning a formatted [`AttentionMatrix`] into HTML documents.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use attention::{AggregationMethod, AttentionMatrix, NormalizedAttention};
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::errors::{RenderError, Result};
use crate::html::populate_document;
use crate::layout::TokenLayout;
use crate::payload::{AttentionPayload, VisualizationParams};
use crate::tokens::prettify_tokens;

const PAYLOAD_NAME: &str = "Response -> Prompt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Replace tokenizer markers such as `Ġ` before laying tokens out.
    pub prettify_tokens: bool,
    /// Split into one document per layer and head chunk. Ignored when the
    /// renderer aggregates heads.
    pub render_in_chunks: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            prettify_tokens: true,
            render_in_chunks: true,
        }
    }
}

/// A rendered document and the name its file is written under.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub name: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Renderer {
    config: RenderConfig,
    aggregation: AggregationMethod,
}

impl Renderer {
    pub fn new(config: RenderConfig, aggregation: AggregationMethod) -> Self {
        Self {
            config,
            aggregation,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn aggregation(&self) -> AggregationMethod {
        self.aggregation
    }

    pub fn create_token_info<S: AsRef<str>>(&self, tokens: &[S]) -> TokenLayout {
        self.config.layout_tokens(tokens)
    }

    /// Build the documents for a formatted matrix without touching the disk.
    ///
    /// Chunking only applies when heads are kept; with headwise averaging a
    /// single document covers every layer.
    pub fn make_documents<S: AsRef<str>>(
        &self,
        tokens: &[S],
        prompt_length: usize,
        matrix: &AttentionMatrix,
        render_in_chunks: bool,
    ) -> Result<Vec<RenderedDocument>> {
        let normalized = matrix.normalized().ok_or(RenderError::Unformatted)?;
        let tokens: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();

        let expected_tokens = prompt_length + normalized.num_steps();
        if tokens.len() < expected_tokens {
            log::warn!(
                "render: {} token(s) supplied, attention covers {}",
                tokens.len(),
                expected_tokens
            );
        }

        let layout = self.create_token_info(&tokens);
        let id_base = format!("AttViz-{}", Uuid::new_v4().simple());
        let payload = |attn: &NormalizedAttention, head_start_idx: usize| AttentionPayload {
            name: PAYLOAD_NAME.to_string(),
            tokens: tokens.clone(),
            prompt_length,
            pos: layout.boxes.clone(),
            dy_total: layout.height,
            head_start_idx,
            attn: attn.to_nested(),
            num_heads: attn.num_heads(),
            num_layers: attn.num_layers(),
        };

        let mut documents = Vec::new();
        if render_in_chunks && self.aggregation == AggregationMethod::None {
            let chunk_size = self.config.heads_per_chunk.max(1);
            for layer in 0..normalized.num_layers() {
                let chunks = normalized.num_heads().div_ceil(chunk_size);
                for chunk_idx in 0..chunks {
                    let start = chunk_idx * chunk_size;
                    let end = normalized.num_heads().min(start + chunk_size);
                    let chunk = normalized.select_heads(layer, start..end)?;

                    let name = format!("Layer-{layer}__Chunk-{chunk_idx}");
                    let params = VisualizationParams {
                        attention: payload(&chunk, start),
                        root_div_id: format!("{id_base}__{name}"),
                    };
                    documents.push(RenderedDocument {
                        html: populate_document(&params)?,
                        name,
                    });
                }
            }
        } else {
            let params = VisualizationParams {
                attention: payload(normalized, 0),
                root_div_id: id_base.clone(),
            };
            documents.push(RenderedDocument {
                html: populate_document(&params)?,
                name: id_base,
            });
        }

        Ok(documents)
    }

    /// Render and write every document as `{name}.html` under `out_dir`.
    pub fn render<S: AsRef<str>>(
        &self,
        tokens: &[S],
        prompt_length: usize,
        matrix: &AttentionMatrix,
        options: RenderOptions,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let tokens: Vec<String> = if options.prettify_tokens {
            prettify_tokens(tokens)
        } else {
            tokens.iter().map(|t| t.as_ref().to_string()).collect()
        };
        let documents =
            self.make_documents(&tokens, prompt_length, matrix, options.render_in_chunks)?;

        fs::create_dir_all(out_dir).map_err(|err| RenderError::write_failed(out_dir, err))?;
        let mut written = Vec::with_capacity(documents.len());
        for document in documents {
            let path = out_dir.join(format!("{}.html", document.name));
            fs::write(&path, document.html.as_bytes())
                .map_err(|err| RenderError::write_failed(&path, err))?;
            written.push(path);
        }

        log::info!(
            "render: wrote {} document(s) to {} (aggregation={})",
            written.len(),
            out_dir.display(),
            self.aggregation
        );
        Ok(written)
    }
}

impl fmt::Display for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Renderer\nAggregation Method:\n{}", self.aggregation)
    }
}
