//! Greedy line-wrapping layout of token boxes.

use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;

/// Position and width of a single token, serialized as `[x, y, width, space]`
/// for the client script.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64, f64, u8)", into = "(f64, f64, f64, u8)")]
pub struct TokenBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub leading_space: bool,
}

impl From<TokenBox> for (f64, f64, f64, u8) {
    fn from(token: TokenBox) -> Self {
        (token.x, token.y, token.width, u8::from(token.leading_space))
    }
}

impl From<(f64, f64, f64, u8)> for TokenBox {
    fn from((x, y, width, space): (f64, f64, f64, u8)) -> Self {
        Self {
            x,
            y,
            width,
            leading_space: space != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenLayout {
    pub boxes: Vec<TokenBox>,
    /// Total vertical extent added by line breaks.
    pub height: f64,
}

impl RenderConfig {
    /// Width of a token box, scaled by character count and clamped to
    /// `[min_token_width, token_width]`.
    pub fn token_box_width(&self, token: &str) -> f64 {
        let chars = token.chars().count() as f64;
        let scaled = chars / self.num_chars_block * self.token_width;
        scaled.max(self.min_token_width).min(self.token_width)
    }

    /// Lay tokens out left to right, wrapping after a line overflows or after
    /// an explicit newline token.
    pub fn layout_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> TokenLayout {
        let mut boxes = Vec::with_capacity(tokens.len());
        let mut dx = 0.0;
        let mut dy = 0.0;

        for token in tokens {
            let token = token.as_ref();
            let width = self.token_box_width(token);
            boxes.push(TokenBox {
                x: self.x_margin + dx,
                y: self.y_margin + dy,
                width,
                leading_space: token.starts_with(' '),
            });

            dx += width;
            if dx > self.line_length || token == "\n" {
                dx = 0.0;
                dy += self.token_height;
            }
        }

        TokenLayout { boxes, height: dy }
    }
}
