//! Drivers tying a model backend, persistence and rendering together.

use std::path::{Path, PathBuf};

use attention::{AggregationMethod, AttentionMatrix};
use render::{RenderOptions, Renderer};

use crate::config::GenerationSettings;
use crate::errors::{Error, Result};
use crate::persist::ExperimentRecord;

/// A generated completion with the raw attention of every decoding step.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Prompt tokens followed by response tokens.
    pub tokens: Vec<String>,
    pub prompt_length: usize,
    pub attention: AttentionMatrix,
}

/// A causal language model able to report its self-attention.
///
/// Implementations receive the prompt with the chat template already
/// applied. Backend failures should be wrapped with [`Error::generation`].
pub trait CompletionSource {
    fn generate(&mut self, prompt: &str, settings: &GenerationSettings) -> Result<Completion>;
}

impl<S: CompletionSource + ?Sized> CompletionSource for &mut S {
    fn generate(&mut self, prompt: &str, settings: &GenerationSettings) -> Result<Completion> {
        (**self).generate(prompt, settings)
    }
}

/// Generate a completion per prompt and save each as an [`ExperimentRecord`].
pub fn save_completions<S, P, Q>(
    source: &mut S,
    prompts: &[P],
    save_paths: &[Q],
    settings: &GenerationSettings,
) -> Result<()>
where
    S: CompletionSource + ?Sized,
    P: AsRef<str>,
    Q: AsRef<Path>,
{
    if prompts.len() != save_paths.len() {
        return Err(Error::MismatchedInputs {
            prompts: prompts.len(),
            paths: save_paths.len(),
        });
    }

    for (prompt, path) in prompts.iter().zip(save_paths) {
        let completion = source.generate(&settings.apply_template(prompt.as_ref()), settings)?;
        log::info!(
            "generated {} token(s) ({} prompt) -> {}",
            completion.tokens.len(),
            completion.prompt_length,
            path.as_ref().display()
        );
        ExperimentRecord::from(completion).save(path)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    pub prettify_tokens: bool,
    pub zero_first_attention: bool,
    /// Split documents per layer and head chunk when heads are kept.
    pub render_in_chunks: bool,
    /// Documents of a record named `{stem}.json` go to `out_dir/{stem}/`.
    pub out_dir: PathBuf,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            prettify_tokens: true,
            zero_first_attention: true,
            render_in_chunks: true,
            out_dir: PathBuf::from("."),
        }
    }
}

/// Load, format and render previously saved records.
///
/// Records are formatted with the renderer's aggregation method. Returns every
/// document written.
pub fn process_saved_completions<Q: AsRef<Path>>(
    renderer: &Renderer,
    paths: &[Q],
    options: &ProcessOptions,
) -> Result<Vec<PathBuf>> {
    let render_options = RenderOptions {
        prettify_tokens: options.prettify_tokens,
        render_in_chunks: options.render_in_chunks,
    };

    let mut written = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let mut record = ExperimentRecord::load(path)?;
        record
            .attention
            .format(renderer.aggregation(), options.zero_first_attention)?;

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "record".to_string());
        let out_dir = options.out_dir.join(stem);
        written.extend(renderer.render(
            &record.completion_tokens,
            record.prompt_length,
            &record.attention,
            render_options,
            &out_dir,
        )?);
    }
    Ok(written)
}

/// One-shot generate and render session.
pub struct Experiment<S> {
    pub source: S,
    pub renderer: Renderer,
    pub out_dir: PathBuf,
}

impl<S: CompletionSource> Experiment<S> {
    pub fn new(source: S, renderer: Renderer, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            renderer,
            out_dir: out_dir.into(),
        }
    }

    /// Generate a completion for `prompt`, optionally save the raw record and
    /// render it. First-position attention is kept as is.
    pub fn basic_experiment(
        &mut self,
        prompt: &str,
        settings: &GenerationSettings,
        save_path: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let completion = self
            .source
            .generate(&settings.apply_template(prompt), settings)?;

        let mut record = ExperimentRecord::from(completion);
        if let Some(path) = save_path {
            record.save(path)?;
        }

        record.attention.format(self.renderer.aggregation(), false)?;
        let options = RenderOptions {
            prettify_tokens: true,
            render_in_chunks: self.renderer.aggregation() == AggregationMethod::None,
        };
        Ok(self.renderer.render(
            &record.completion_tokens,
            record.prompt_length,
            &record.attention,
            options,
            &self.out_dir,
        )?)
    }
}
