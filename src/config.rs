//! Top-level configuration file.

use std::{fs, path::Path};

use attention::FormatConfig;
use render::RenderConfig;
use reprocess::ReprocessConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

const PROMPT_PLACEHOLDER: &str = "{p}";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    pub format: FormatConfig,
    pub render: RenderConfig,
    pub generation: GenerationSettings,
    pub reprocess: ReprocessConfig,
}

/// Options handed to a [`CompletionSource`](crate::CompletionSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub max_new_tokens: usize,
    /// Chat template wrapped around every prompt; `{p}` marks the prompt.
    pub prompt_template: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            prompt_template: Some("user\n{p}<|endoftext|>\nassistant\n".to_string()),
        }
    }
}

impl GenerationSettings {
    pub fn apply_template(&self, prompt: &str) -> String {
        match &self.prompt_template {
            Some(template) => template.replace(PROMPT_PLACEHOLDER, prompt),
            None => prompt.to_string(),
        }
    }
}

impl VisualizationConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| Error::read_failed(path, err))?;
        let config: VisualizationConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                serde_json::from_str(&contents).map_err(|err| Error::Config(err.to_string()))?
            }
            Some("toml") | Some("tml") | None => {
                toml::from_str(&contents).map_err(|err| Error::Config(err.to_string()))?
            }
            Some(other) => {
                return Err(Error::Config(format!(
                    "unsupported configuration extension '{other}'"
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = self
            .render
            .validation_errors()
            .into_iter()
            .map(|err| format!("render.{err}"))
            .collect();

        if self.generation.max_new_tokens == 0 {
            errors.push("generation.max_new_tokens must be greater than 0".to_string());
        }
        if let Some(template) = &self.generation.prompt_template {
            if !template.contains(PROMPT_PLACEHOLDER) {
                errors.push(format!(
                    "generation.prompt_template must contain '{PROMPT_PLACEHOLDER}'"
                ));
            }
        }
        errors.extend(
            self.reprocess
                .validation_errors()
                .into_iter()
                .map(|err| format!("reprocess.{err}")),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attention::AggregationMethod;
    use tempfile::tempdir;

    #[test]
    fn template_wraps_prompt() {
        let settings = GenerationSettings::default();
        assert_eq!(
            settings.apply_template("hi"),
            "user\nhi<|endoftext|>\nassistant\n"
        );
        let raw = GenerationSettings {
            prompt_template: None,
            ..GenerationSettings::default()
        };
        assert_eq!(raw.apply_template("hi"), "hi");
    }

    #[test]
    fn loads_toml_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("viz.toml");
        fs::write(
            &path,
            "[format]\nmethod = \"headwise_averaging\"\nzero_first_attention = true\n\n[render]\nheads_per_chunk = 4\n",
        )
        .unwrap();

        let config = VisualizationConfig::from_path(&path).unwrap();
        assert_eq!(config.format.method, AggregationMethod::HeadwiseAveraging);
        assert!(config.format.zero_first_attention);
        assert_eq!(config.render.heads_per_chunk, 4);
        assert_eq!(config.render.line_length, 770.0);
        assert_eq!(config.generation, GenerationSettings::default());
    }

    #[test]
    fn loads_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("viz.json");
        fs::write(&path, r#"{"generation":{"max_new_tokens":16}}"#).unwrap();

        let config = VisualizationConfig::from_path(&path).unwrap();
        assert_eq!(config.generation.max_new_tokens, 16);
        assert_eq!(config.format, FormatConfig::default());
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("viz.yaml");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            VisualizationConfig::from_path(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = VisualizationConfig::default();
        config.render.heads_per_chunk = 0;
        config.generation.max_new_tokens = 0;
        config.generation.prompt_template = Some("no placeholder".to_string());

        match config.validate() {
            Err(Error::Validation(errors)) => {
                assert_eq!(errors.len(), 3, "{errors:?}");
                assert!(errors[0].starts_with("render."));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
