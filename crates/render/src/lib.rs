//! Static HTML rendering of formatted self-attention.
//!
//! A [`Renderer`] lays tokens out with greedy line wrapping, embeds the
//! normalized `[layer][head][token][position]` attention together with the
//! layout as a single-line JSON payload, and writes one self-contained HTML
//! document per layer and head chunk (or one document when heads have been
//! aggregated). The payload line is located by the markers in [`payload`] so
//! later tools can rewrite it without parsing the rest of the document.

pub mod config;
pub mod errors;
pub mod html;
pub mod layout;
pub mod payload;
pub mod renderer;
pub mod tokens;

pub use config::RenderConfig;
pub use errors::{RenderError, Result};
pub use layout::{TokenBox, TokenLayout};
pub use payload::{AttentionPayload, VisualizationParams};
pub use renderer::{RenderOptions, RenderedDocument, Renderer};
pub use tokens::prettify_tokens;
