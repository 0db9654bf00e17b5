mod category;
mod change;
mod cli;
mod config;
mod error;
mod output;
mod parser;
mod pipeline;
mod stats;
mod walker;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, KindArg, OutputFormat, Overrides};
use config::RadarConfig;
use output::StdoutConsumer;
use parser::StructuralParser;
use pipeline::diff::{DiffProvider, GitDiffProvider};
use pipeline::enrich::Enricher;
use pipeline::{Evaluation, Ingestor, Pipeline};
use stats::PipelineStats;
use watcher::event::RawChange;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Watch { verbose: true, .. });
    init_tracing(verbose);

    match cli.command {
        Commands::Watch {
            path,
            format,
            overrides,
            ..
        } => watch(&path, format, &overrides).await,
        Commands::Score {
            path,
            file,
            kind,
            format,
            overrides,
        } => score(&path, file, kind, format, &overrides).await,
        Commands::Config { path, overrides } => {
            let (_, config) = load_config(&path, &overrides)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Logs go to stderr; stdout carries change output only.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the project root and load its configuration with CLI overrides applied.
fn load_config(path: &Path, overrides: &Overrides) -> Result<(PathBuf, RadarConfig)> {
    let root = path
        .canonicalize()
        .with_context(|| format!("cannot open project root {}", path.display()))?;
    let mut config = RadarConfig::load(&root);
    overrides.apply(&mut config);
    config.validate()?;
    Ok((root, config))
}

async fn watch(path: &Path, format: OutputFormat, overrides: &Overrides) -> Result<()> {
    let (root, config) = load_config(path, overrides)?;

    let pipeline = Pipeline::new(
        &root,
        config.clone(),
        Arc::new(GitDiffProvider::new(&root)),
        Arc::new(StructuralParser),
    )?;
    let (mut handle, mut errors) = pipeline.start(Arc::new(StdoutConsumer::new(format)));
    let watcher = watcher::start_watcher(&root, &config.filter, handle.sender())?;

    let mut stopped = None;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
            Some(err) = errors.recv() => {
                tracing::warn!("{err:#}");
            }
            (stage, result) = handle.stopped_stage() => {
                match result {
                    Err(err) => tracing::error!("pipeline {stage} task failed: {err}"),
                    Ok(()) => tracing::error!("pipeline {stage} task stopped"),
                }
                stopped = Some(stage);
                break;
            }
        }
    }

    tracing::info!("shutting down");
    drop(watcher);
    let stats = handle.shutdown().await;
    while let Ok(err) = errors.try_recv() {
        tracing::warn!("{err:#}");
    }
    output::print_stats(&stats, format);
    match stopped {
        Some(stage) => anyhow::bail!("pipeline {stage} stage stopped unexpectedly"),
        None => Ok(()),
    }
}

async fn score(
    path: &Path,
    file: PathBuf,
    kind: KindArg,
    format: OutputFormat,
    overrides: &Overrides,
) -> Result<()> {
    let (root, config) = load_config(path, overrides)?;
    let diff: Arc<dyn DiffProvider> = Arc::new(GitDiffProvider::new(&root));

    let mut ingestor = Ingestor::new(
        &root,
        &config,
        Arc::clone(&diff),
        Arc::new(PipelineStats::default()),
    )?;
    let file = if file.is_absolute() {
        file.canonicalize().unwrap_or(file)
    } else {
        file
    };

    match ingestor.evaluate(RawChange::now(file, kind.into())).await? {
        Evaluation::Ignored(event, reason) => output::print_ignored(&event, reason, format),
        Evaluation::Scored(scored) => {
            let enricher = Enricher::new(&root, diff, Arc::new(StructuralParser));
            let change = enricher.enrich(scored).await;
            output::print_evaluation(&change, format)
        }
    }
}
