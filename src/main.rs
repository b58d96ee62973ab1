use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use ballad_sync::config::BalladConfig;
use ballad_sync::logger::init_logger;
use ballad_sync::notification::{FileProgressObserver, ProgressBarObserver};
use ballad_sync::BalladSync;

/// Озвучка текста с музыкальной подложкой
#[derive(Debug, Parser)]
#[command(name = "ballad-sync", version, about = "Narrate text over a synchronized, ducked music bed")]
struct Cli {
    /// Text file to narrate
    text_file: PathBuf,

    /// Output WAV file
    #[arg(short, long, default_value = "ballad.wav")]
    output: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum line length used for alignment
    #[arg(long)]
    max_line_length: Option<usize>,

    /// Music fade in/out duration in milliseconds
    #[arg(long)]
    fade_ms: Option<u32>,

    /// Music gain under the narration, in dB
    #[arg(long, allow_hyphen_values = true)]
    duck_db: Option<f32>,

    /// Write a JSON report next to the output
    #[arg(long)]
    report: bool,

    /// Disable the music cache
    #[arg(long)]
    no_cache: bool,

    /// Append progress updates to this file
    #[arg(long)]
    progress_log: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(cli: &Cli) -> Result<BalladConfig> {
    let mut config = match &cli.config {
        Some(path) => BalladConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BalladConfig::default(),
    }
    .apply_env();

    if let Some(max_line_length) = cli.max_line_length {
        config.max_line_length = max_line_length;
    }
    if let Some(fade_ms) = cli.fade_ms {
        config.fade_duration_ms = fade_ms;
    }
    if let Some(duck_db) = cli.duck_db {
        config.duck_db = duck_db;
    }
    if cli.report {
        config.write_report = true;
    }
    if cli.no_cache {
        config.use_caching = false;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let text = tokio::fs::read_to_string(&cli.text_file)
        .await
        .with_context(|| format!("failed to read {}", cli.text_file.display()))?;

    let config = build_config(&cli)?;
    let mut ballad = BalladSync::new(config).context("invalid configuration")?;

    ballad.add_observer(Box::new(ProgressBarObserver::default()));
    if let Some(path) = &cli.progress_log {
        ballad.add_observer(Box::new(FileProgressObserver::new(path.clone())));
    }

    let output = ballad
        .process_to_file(&text, &cli.output)
        .await
        .context("ballad job failed")?;

    println!(
        "Saved {} ({:.1}s, {} lines, {} music segments)",
        cli.output.display(),
        output.duration_secs(),
        output.lines.len(),
        output.timeline.len()
    );
    Ok(())
}
