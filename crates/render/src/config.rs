//! Geometry of the rendered visualization.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::errors::{RenderError, Result};

/// Layout parameters shared with the client-side script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Vertical offset of the first line of tokens.
    pub y_margin: f64,
    /// Maximum width of a line of tokens before wrapping.
    pub line_length: f64,
    /// Number of characters that fill a `token_width`-wide block.
    pub num_chars_block: f64,
    /// Width of a token block holding `num_chars_block` characters.
    pub token_width: f64,
    pub min_token_width: f64,
    pub token_height: f64,
    pub x_margin: f64,
    /// Space between the two attention rendition modes.
    pub matrix_width: f64,
    /// Maximum number of heads per chunked document.
    pub heads_per_chunk: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            y_margin: 30.0,
            line_length: 770.0,
            num_chars_block: 11.0,
            token_width: 110.0,
            min_token_width: 20.0,
            token_height: 22.5,
            x_margin: 20.0,
            matrix_width: 115.0,
            heads_per_chunk: 8,
        }
    }
}

impl RenderConfig {
    /// Load from a TOML or JSON file, chosen by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|err| RenderError::read_failed(path, err))?;
        let config: RenderConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                serde_json::from_str(&contents).map_err(|err| RenderError::Config(err.to_string()))?
            }
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(RenderError::Config(format!(
                    "unsupported configuration extension '{other}'"
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RenderError::Validation(errors))
        }
    }

    /// Every violated constraint, prefixed with the field name.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let positive = [
            ("line_length", self.line_length),
            ("num_chars_block", self.num_chars_block),
            ("token_width", self.token_width),
            ("min_token_width", self.min_token_width),
            ("token_height", self.token_height),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                errors.push(format!("{name} must be greater than 0"));
            }
        }

        for (name, value) in [
            ("x_margin", self.x_margin),
            ("y_margin", self.y_margin),
            ("matrix_width", self.matrix_width),
        ] {
            if !(value >= 0.0) {
                errors.push(format!("{name} must be >= 0"));
            }
        }

        if self.min_token_width > self.token_width {
            errors.push("min_token_width cannot exceed token_width".to_string());
        }

        if self.heads_per_chunk == 0 {
            errors.push("heads_per_chunk must be greater than 0".to_string());
        }

        errors
    }
}
