use std::collections::HashSet;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use regex::RegexSet;

use crate::change::ChangeEvent;
use crate::config::FilterConfig;
use crate::error::PipelineError;

use super::diff::is_whitespace_only;

/// Why an event was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    IgnoredDirectory,
    PathPattern,
    Extension,
    WhitespaceOnly,
    Generated,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::IgnoredDirectory => "ignored directory",
            IgnoreReason::PathPattern => "path pattern",
            IgnoreReason::Extension => "extension",
            IgnoreReason::WhitespaceOnly => "whitespace-only diff",
            IgnoreReason::Generated => "generated file",
        }
    }
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Rejects noise before any scoring work is done.
///
/// Pure: holds only compiled rules, never state about events it has seen.
#[derive(Debug)]
pub struct NoiseFilter {
    ignore_dirs: HashSet<String>,
    ignore_extensions: HashSet<String>,
    ignore_patterns: RegexSet,
    generated: Vec<Pattern>,
}

impl NoiseFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, PipelineError> {
        let ignore_patterns = RegexSet::new(&config.ignore_patterns)
            .map_err(|err| PipelineError::Config(format!("ignore_patterns: {err}")))?;

        let generated = config
            .generated_patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|err| PipelineError::Config(format!("generated pattern `{p}`: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            ignore_dirs: config.ignore_dirs.iter().cloned().collect(),
            ignore_extensions: config
                .ignore_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            ignore_patterns,
            generated,
        })
    }

    /// Why `event` should be ignored, or `None` to let it through. The first
    /// matching rule, checked in order: directories and path patterns,
    /// extension, whitespace-only diff, generated file names.
    ///
    /// The whitespace check only runs when `diff` is available.
    pub fn ignore_reason(&self, event: &ChangeEvent, diff: Option<&str>) -> Option<IgnoreReason> {
        let path = event.path.as_path();
        let path_str = event.path_str();

        if self.in_ignored_dir(path) {
            return Some(IgnoreReason::IgnoredDirectory);
        }
        if self.ignore_patterns.is_match(&path_str) {
            return Some(IgnoreReason::PathPattern);
        }

        if self.has_ignored_extension(path) {
            return Some(IgnoreReason::Extension);
        }

        if let Some(diff) = diff
            && is_whitespace_only(diff)
        {
            return Some(IgnoreReason::WhitespaceOnly);
        }

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if self.generated.iter().any(|p| {
            p.matches_with(file_name, GLOB_OPTIONS) || p.matches_with(&path_str, GLOB_OPTIONS)
        }) {
            return Some(IgnoreReason::Generated);
        }

        None
    }

    /// True if any directory component of `path` is on the ignore list.
    pub fn in_ignored_dir(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        parent
            .components()
            .any(|c| c.as_os_str().to_str().is_some_and(|s| self.ignore_dirs.contains(s)))
    }

    pub fn has_ignored_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.ignore_extensions.contains(&ext.to_lowercase()))
    }
}
