use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::change::ChangeKind;
use crate::config::RadarConfig;

/// Watches a project and reports the file changes worth paying attention to.
///
/// change-radar drops noise (build output, lockfiles, whitespace-only edits),
/// scores what is left for significance, batches bursts of activity, and
/// prints each meaningful change once the project goes quiet.
#[derive(Parser, Debug)]
#[command(
    name = "change-radar",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for reported changes.
#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per change: kind, score, path and a short summary (default).
    #[default]
    Compact,
    /// One JSON object per change, one per line.
    Json,
}

/// Change kind for one-shot scoring.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum KindArg {
    Added,
    #[default]
    Modified,
    Deleted,
}

impl From<KindArg> for ChangeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Added => ChangeKind::Added,
            KindArg::Modified => ChangeKind::Modified,
            KindArg::Deleted => ChangeKind::Deleted,
        }
    }
}

/// Command-line overrides for values in `change-radar.toml`.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Quiet period in milliseconds before a pending batch is flushed.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Maximum number of changes delivered per flush.
    #[arg(long)]
    pub max_batch: Option<usize>,

    /// Minimum score (0.0-1.0) for a change to count as significant.
    #[arg(long)]
    pub threshold: Option<f64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut RadarConfig) {
        if let Some(delay_ms) = self.delay_ms {
            config.debounce.delay_ms = delay_ms;
        }
        if let Some(max_batch) = self.max_batch {
            config.debounce.max_batch_size = max_batch;
        }
        if let Some(threshold) = self.threshold {
            config.scoring.threshold = threshold;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a project directory and print meaningful changes until Ctrl-C.
    ///
    /// A run summary is written to stderr on exit.
    Watch {
        /// Path to the project root to watch.
        path: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,

        #[command(flatten)]
        overrides: Overrides,

        /// Log every filtered and scored event.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Evaluate a single file once: filter, score and enrich it.
    Score {
        /// Path to the project root.
        path: PathBuf,

        /// File to evaluate, relative to the project root.
        file: PathBuf,

        /// Kind of change to evaluate the file as.
        #[arg(long, value_enum, default_value_t = KindArg::Modified)]
        kind: KindArg,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
        format: OutputFormat,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration for a project as TOML.
    Config {
        /// Path to the project root.
        path: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
}
