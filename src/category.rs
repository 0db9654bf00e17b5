use std::collections::HashMap;
use std::path::Path;

use glob::Pattern;

use crate::change::normalized_path;
use crate::config::{FilterConfig, ScoringConfig};
use crate::error::PipelineError;

/// Importance tier of a file, decided from its name and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    Critical,
    Knowledge,
    Configuration,
    Code,
    Documentation,
    LowValue,
    Ignored,
    Unknown,
}

impl FileCategory {
    /// File-type sub-score for this tier.
    pub fn importance(&self) -> f64 {
        match self {
            FileCategory::Critical => 1.0,
            FileCategory::Knowledge => 0.9,
            FileCategory::Configuration => 0.8,
            FileCategory::Code => 0.7,
            FileCategory::Documentation => 0.5,
            FileCategory::LowValue => 0.2,
            FileCategory::Ignored => 0.0,
            FileCategory::Unknown => 0.3,
        }
    }
}

/// Maps paths to a [`FileCategory`] using the configured patterns and buckets.
#[derive(Debug)]
pub struct FileClassifier {
    critical: Vec<Pattern>,
    by_extension: HashMap<String, FileCategory>,
}

impl FileClassifier {
    pub fn new(scoring: &ScoringConfig, filter: &FilterConfig) -> Result<Self, PipelineError> {
        let critical = scoring
            .critical_patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|err| PipelineError::Config(format!("critical pattern `{p}`: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Later buckets win on overlap, so the denylist goes last.
        let buckets = [
            (&scoring.low_value_extensions, FileCategory::LowValue),
            (&scoring.documentation_extensions, FileCategory::Documentation),
            (&scoring.code_extensions, FileCategory::Code),
            (&scoring.configuration_extensions, FileCategory::Configuration),
            (&scoring.knowledge_extensions, FileCategory::Knowledge),
            (&filter.ignore_extensions, FileCategory::Ignored),
        ];
        let mut by_extension = HashMap::new();
        for (extensions, category) in buckets {
            for ext in extensions {
                by_extension.insert(ext.trim_start_matches('.').to_lowercase(), category);
            }
        }

        Ok(Self {
            critical,
            by_extension,
        })
    }

    /// Classify a relative path. Returns `None` when the path has no file name.
    pub fn classify(&self, path: &Path) -> Option<FileCategory> {
        let file_name = path.file_name()?.to_str()?;
        let path_str = normalized_path(path);

        if self
            .critical
            .iter()
            .any(|p| p.matches(file_name) || p.matches(&path_str))
        {
            return Some(FileCategory::Critical);
        }

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return Some(FileCategory::Unknown),
        };
        Some(
            self.by_extension
                .get(&ext)
                .copied()
                .unwrap_or(FileCategory::Unknown),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> FileClassifier {
        FileClassifier::new(&ScoringConfig::default(), &FilterConfig::default()).unwrap()
    }

    #[test]
    fn test_critical_patterns() {
        let c = classifier();
        assert_eq!(c.classify(Path::new("CLAUDE.md")), Some(FileCategory::Critical));
        assert_eq!(c.classify(Path::new("docs/AGENTS.md")), Some(FileCategory::Critical));
        assert_eq!(c.classify(Path::new("specs/auth.spec.md")), Some(FileCategory::Critical));
    }

    #[test]
    fn test_extension_tiers() {
        let c = classifier();
        assert_eq!(c.classify(Path::new("notes/ideas.md")), Some(FileCategory::Knowledge));
        assert_eq!(c.classify(Path::new("Cargo.toml")), Some(FileCategory::Configuration));
        assert_eq!(c.classify(Path::new("src/app.ts")), Some(FileCategory::Code));
        assert_eq!(c.classify(Path::new("docs/intro.TXT")), Some(FileCategory::Documentation));
        assert_eq!(c.classify(Path::new("assets/logo.svg")), Some(FileCategory::LowValue));
        assert_eq!(c.classify(Path::new("server.log")), Some(FileCategory::Ignored));
        assert_eq!(c.classify(Path::new("Makefile")), Some(FileCategory::Unknown));
    }

    #[test]
    fn test_tier_scores_descend() {
        let tiers = [
            FileCategory::Critical,
            FileCategory::Knowledge,
            FileCategory::Configuration,
            FileCategory::Code,
            FileCategory::Documentation,
            FileCategory::LowValue,
            FileCategory::Ignored,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].importance() > pair[1].importance(), "{:?}", pair);
        }
    }

    #[test]
    fn test_no_file_name() {
        assert_eq!(classifier().classify(Path::new("..")), None);
    }
}
