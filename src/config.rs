use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Name of the optional configuration file at the project root.
pub const CONFIG_FILE: &str = "change-radar.toml";

/// Directory the tool owns inside a watched project. Always ignored.
pub const STATE_DIR: &str = ".change-radar";

/// Configuration loaded from `change-radar.toml` at the project root.
///
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RadarConfig {
    pub filter: FilterConfig,
    pub debounce: DebounceConfig,
    pub scoring: ScoringConfig,
}

/// Noise filter rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Honor the project's `.gitignore` in the raw watch source.
    pub respect_gitignore: bool,
    /// Directory names ignored anywhere in a path (build output, dependencies, VCS).
    pub ignore_dirs: Vec<String>,
    /// Extensions (without the dot) that are never interesting.
    pub ignore_extensions: Vec<String>,
    /// Regular expressions matched against the `/`-separated relative path.
    pub ignore_patterns: Vec<String>,
    /// Glob patterns for auto-generated files, matched against the file name
    /// and the relative path.
    pub generated_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            ignore_dirs: strings(&[
                "node_modules",
                ".git",
                "target",
                "dist",
                "build",
                ".next",
                "__pycache__",
                ".venv",
                "venv",
                "coverage",
                ".cache",
                ".idea",
                STATE_DIR,
            ]),
            ignore_extensions: strings(&[
                "log", "lock", "cache", "tmp", "temp", "swp", "swo", "bak", "pid", "pyc",
            ]),
            ignore_patterns: strings(&[r"(^|/)\.DS_Store$", r"~$", r"(^|/)\.#"]),
            generated_patterns: strings(&[
                "package-lock.json",
                "yarn.lock",
                "pnpm-lock.yaml",
                "Cargo.lock",
                "poetry.lock",
                "*.min.js",
                "*.min.css",
                "*.map",
                "*.generated.*",
                "*.notification",
                ".change-radar/*",
            ]),
        }
    }
}

/// Debounce buffer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period after the last event before the pending batch is flushed.
    pub delay_ms: u64,
    /// Upper bound on entries handed downstream per flush.
    pub max_batch_size: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            max_batch_size: 50,
        }
    }
}

impl DebounceConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Significance scoring settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum weighted score for a change to count as significant.
    pub threshold: f64,
    /// Trailing window for the per-path frequency score.
    pub frequency_window_secs: u64,
    /// Glob patterns (file name or relative path) scored as critical.
    pub critical_patterns: Vec<String>,
    pub knowledge_extensions: Vec<String>,
    pub configuration_extensions: Vec<String>,
    pub code_extensions: Vec<String>,
    pub documentation_extensions: Vec<String>,
    pub low_value_extensions: Vec<String>,
    pub weights: Weights,
    /// Top-level directories worth more than the default location score.
    pub priority_dirs: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let priority_dirs = [
            ("src", 0.9),
            ("lib", 0.8),
            ("docs", 0.8),
            ("app", 0.8),
            ("config", 0.7),
            ("tests", 0.6),
            ("scripts", 0.5),
        ]
        .into_iter()
        .map(|(dir, score)| (dir.to_string(), score))
        .collect();

        Self {
            threshold: 0.3,
            frequency_window_secs: 300,
            critical_patterns: strings(&[
                "CLAUDE.md",
                "AGENTS.md",
                "README.md",
                "ARCHITECTURE.md",
                "*.spec.md",
                ".env.example",
            ]),
            knowledge_extensions: strings(&["md", "mdx", "org"]),
            configuration_extensions: strings(&["json", "toml", "yaml", "yml", "ini", "cfg", "env"]),
            code_extensions: strings(&[
                "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "kt", "swift", "c", "h",
                "cpp", "hpp", "rb", "sh", "sql",
            ]),
            documentation_extensions: strings(&["txt", "rst", "adoc", "html"]),
            low_value_extensions: strings(&["csv", "svg", "png", "jpg", "jpeg", "gif", "ico"]),
            weights: Weights::default(),
            priority_dirs,
        }
    }
}

impl ScoringConfig {
    pub fn frequency_window(&self) -> Duration {
        Duration::from_secs(self.frequency_window_secs)
    }
}

/// Per-dimension weights of the final score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Weights {
    pub file_type: f64,
    pub content_delta: f64,
    pub frequency: f64,
    pub location: f64,
    pub timing: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            file_type: 0.25,
            content_delta: 0.30,
            frequency: 0.15,
            location: 0.20,
            timing: 0.10,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.file_type + self.content_delta + self.frequency + self.location + self.timing
    }

    fn as_array(&self) -> [(&'static str, f64); 5] {
        [
            ("file_type", self.file_type),
            ("content_delta", self.content_delta),
            ("frequency", self.frequency),
            ("location", self.location),
            ("timing", self.timing),
        ]
    }
}

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Longest accepted frequency window: one week.
pub const MAX_FREQUENCY_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

impl RadarConfig {
    /// Load configuration from `change-radar.toml` in the given root directory.
    ///
    /// Returns the default configuration if the file does not exist, cannot be
    /// parsed, or fails validation.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        let contents = match std::fs::read_to_string(&config_path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                return Self::default();
            }
        };

        match Self::parse(&contents) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("{CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> Result<Self, PipelineError> {
        let config = toml::from_str::<Self>(contents)
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let weights = &self.scoring.weights;
        for (name, value) in weights.as_array() {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "weight `{name}` must be within [0, 1], got {value}"
                )));
            }
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(PipelineError::Config(format!(
                "scoring weights must sum to 1.0, got {sum}"
            )));
        }

        let threshold = self.scoring.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::Config(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }

        let window = self.scoring.frequency_window_secs;
        if window > MAX_FREQUENCY_WINDOW_SECS {
            return Err(PipelineError::Config(format!(
                "frequency_window_secs must be at most {MAX_FREQUENCY_WINDOW_SECS}, got {window}"
            )));
        }

        for (dir, value) in &self.scoring.priority_dirs {
            if !(0.0..=1.0).contains(value) {
                return Err(PipelineError::Config(format!(
                    "priority dir `{dir}` must score within [0, 1], got {value}"
                )));
            }
        }

        if self.debounce.max_batch_size == 0 {
            return Err(PipelineError::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.debounce.delay_ms == 0 {
            return Err(PipelineError::Config(
                "delay_ms must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
