//! Error and configuration types shared across the crate.

pub mod config;
pub mod errors;

pub use config::FormatConfig;
pub use errors::AttentionError;
