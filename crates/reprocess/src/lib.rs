//! Sharpening filter for rendered attention documents.
//!
//! The filter rewrites only the embedded payload of a document produced by
//! the `render` crate. For every `(layer, head)` pair it zeroes the first few
//! positions, measures the mean and standard deviation of the remaining prompt
//! positions, drops everything at or below `mean + cutoff * std` and raises
//! the survivors to a power below one so weak-but-significant weights stay
//! visible.

pub mod document;
pub mod errors;
pub mod filter;

pub use document::{reprocess_document, reprocess_file, reprocessed_path};
pub use errors::{ReprocessError, Result};
pub use filter::{rescore, rescore_sequence, ReprocessConfig};
