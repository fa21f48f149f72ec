use std::path::PathBuf;

use anyhow::{Context, Result};
use att_viz::{
    attention::AggregationMethod,
    process_saved_completions,
    render::Renderer,
    reprocess::{reprocess_file, ReprocessConfig},
    ExperimentRecord, ProcessOptions, VisualizationConfig,
};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(author, version, about = "Self-attention visualization for LLM completions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Format saved experiment records and write their HTML documents.
    Render(RenderArgs),
    /// Print a short summary of saved experiment records.
    Inspect {
        #[arg(value_name = "RECORD", required = true)]
        records: Vec<PathBuf>,
    },
    /// Sharpen the attention embedded in a rendered document.
    Reprocess(ReprocessArgs),
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    #[arg(short, long, value_name = "PATH", help = "TOML or JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "METHOD", help = "none or headwise_averaging")]
    aggregation: Option<AggregationMethod>,

    #[arg(long, value_name = "BOOL", action = ArgAction::Set,
        help = "Zero attention towards the first prompt token [default: true]")]
    zero_first_attention: Option<bool>,

    #[arg(long, help = "Keep raw tokenizer markers in the rendered tokens")]
    no_prettify: bool,

    #[arg(long, help = "Write one document per record instead of per layer and head chunk")]
    no_chunks: bool,

    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,

    #[arg(value_name = "RECORD", required = true)]
    records: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ReprocessArgs {
    #[arg(long, help = "Standard deviations above the mean a weight must exceed [default: 0.5]")]
    cutoff: Option<f64>,

    #[arg(long = "corrfactor", help = "Exponent applied to kept weights [default: 1/3]")]
    corr_factor: Option<f64>,

    #[arg(long = "firstignored", help = "Leading positions forced to zero [default: 1]")]
    first_ignored: Option<usize>,

    #[arg(short, long, value_name = "PATH", help = "TOML or JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(value_name = "FILE")]
    file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Render(args) => render(args),
        Command::Inspect { records } => inspect(&records),
        Command::Reprocess(args) => reprocess(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Option<VisualizationConfig>> {
    path.map(|path| {
        VisualizationConfig::from_path(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    })
    .transpose()
}

fn render(args: RenderArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let zero_first_attention = args.zero_first_attention.unwrap_or_else(|| {
        config
            .as_ref()
            .map_or(true, |config| config.format.zero_first_attention)
    });
    let config = config.unwrap_or_default();
    let aggregation = args.aggregation.unwrap_or(config.format.method);

    let renderer = Renderer::new(config.render, aggregation);
    log::info!("{renderer}");

    let options = ProcessOptions {
        prettify_tokens: !args.no_prettify,
        zero_first_attention,
        render_in_chunks: !args.no_chunks,
        out_dir: args.out_dir,
    };

    let progress = ProgressBar::new(args.records.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("invalid progress template")?,
    );

    let mut written = 0usize;
    for record in &args.records {
        progress.set_message(record.display().to_string());
        let documents = process_saved_completions(&renderer, &[record], &options)
            .with_context(|| format!("failed to render {}", record.display()))?;
        written += documents.len();
        progress.inc(1);
    }
    progress.finish_with_message(format!("{written} document(s) written"));
    Ok(())
}

fn inspect(records: &[PathBuf]) -> Result<()> {
    for path in records {
        let record = ExperimentRecord::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        println!("{}\n{}\n", path.display(), record.summary());
    }
    Ok(())
}

fn reprocess(args: ReprocessArgs) -> Result<()> {
    let base = load_config(args.config.as_ref())?
        .map(|config| config.reprocess)
        .unwrap_or_default();
    let config = ReprocessConfig {
        cutoff: args.cutoff.unwrap_or(base.cutoff),
        corr_factor: args.corr_factor.unwrap_or(base.corr_factor),
        first_ignored: args.first_ignored.unwrap_or(base.first_ignored),
    };

    config.validate().context("invalid reprocess options")?;

    let output = reprocess_file(&args.file, &config)
        .with_context(|| format!("failed to reprocess {}", args.file.display()))?;
    println!("{}", output.display());
    Ok(())
}
