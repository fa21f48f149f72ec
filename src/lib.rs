//! Self-attention visualization for causal language model completions.
//!
//! The member crates do the work: [`attention`] reshapes raw per-step
//! attention tensors into a normalized buffer, [`render`] turns that buffer
//! into HTML documents and [`reprocess`] sharpens documents already written.
//! This crate ties them together with an on-disk experiment record and the
//! drivers that generate, save, load and render completions.

pub use attention;
pub use render;
pub use reprocess;

pub mod config;
pub mod errors;
pub mod experiment;
pub mod persist;

pub use config::{GenerationSettings, VisualizationConfig};
pub use errors::{Error, Result};
pub use experiment::{
    process_saved_completions, save_completions, Completion, CompletionSource, Experiment,
    ProcessOptions,
};
pub use persist::{ExperimentRecord, RECORD_VERSION};
