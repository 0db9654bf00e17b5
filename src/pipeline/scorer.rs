use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local, TimeDelta, Timelike};

use crate::category::{FileCategory, FileClassifier};
use crate::change::{ChangeEvent, ChangeKind, Dimension, ScoredChange};
use crate::config::{RadarConfig, Weights};
use crate::error::PipelineError;

use super::diff::DiffStats;

/// Substitute for a sub-score that could not be computed.
pub const NEUTRAL_SCORE: f64 = 0.3;

/// Computes the weighted significance of a change.
///
/// Owns the per-path rolling history behind the frequency score. The history
/// lives as long as the scorer and is dropped with it.
#[derive(Debug)]
pub struct SignificanceScorer {
    classifier: FileClassifier,
    ignore_dirs: HashSet<String>,
    priority_dirs: HashMap<String, f64>,
    weights: Weights,
    threshold: f64,
    window: TimeDelta,
    /// Path -> (event id, observed at), oldest first.
    history: HashMap<PathBuf, VecDeque<(u64, DateTime<Local>)>>,
}

impl SignificanceScorer {
    pub fn new(config: &RadarConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let window = TimeDelta::from_std(config.scoring.frequency_window())
            .map_err(|err| PipelineError::Config(format!("frequency_window_secs: {err}")))?;

        Ok(Self {
            classifier: FileClassifier::new(&config.scoring, &config.filter)?,
            ignore_dirs: config.filter.ignore_dirs.iter().cloned().collect(),
            priority_dirs: config
                .scoring
                .priority_dirs
                .iter()
                .map(|(dir, score)| (dir.clone(), *score))
                .collect(),
            weights: config.scoring.weights,
            threshold: config.scoring.threshold,
            window,
            history: HashMap::new(),
        })
    }

    /// Score an event. `diff` feeds the content-delta dimension for modifications.
    ///
    /// Records the event in the frequency history; an event id already recorded
    /// is not counted twice.
    pub fn score(&mut self, event: &ChangeEvent, diff: Option<&str>) -> ScoredChange {
        let category = self.file_category(event);

        let mut breakdown = BTreeMap::new();
        breakdown.insert(
            Dimension::FileType,
            category.map(|c| c.importance()).unwrap_or(NEUTRAL_SCORE),
        );
        breakdown.insert(Dimension::ContentDelta, content_delta_score(event.kind, diff));
        breakdown.insert(Dimension::Frequency, self.frequency_score(event));
        breakdown.insert(
            Dimension::Location,
            self.location_score(&event.path).unwrap_or_else(|err| {
                tracing::debug!("{err}; using neutral score");
                NEUTRAL_SCORE
            }),
        );
        breakdown.insert(Dimension::Timing, timing_score(event.observed_at.hour()));

        let score = self.weighted(&breakdown);

        ScoredChange {
            event: event.clone(),
            score,
            is_significant: score >= self.threshold,
            is_critical: category == Some(FileCategory::Critical),
            breakdown,
        }
    }

    /// Changes recorded for `path` in the current history, pruned or not.
    #[cfg(test)]
    pub fn recorded_changes(&self, path: &Path) -> usize {
        self.history.get(path).map_or(0, VecDeque::len)
    }

    fn weighted(&self, breakdown: &BTreeMap<Dimension, f64>) -> f64 {
        let w = &self.weights;
        let total: f64 = breakdown
            .iter()
            .map(|(dimension, value)| {
                let weight = match dimension {
                    Dimension::FileType => w.file_type,
                    Dimension::ContentDelta => w.content_delta,
                    Dimension::Frequency => w.frequency,
                    Dimension::Location => w.location,
                    Dimension::Timing => w.timing,
                };
                weight * value
            })
            .sum();
        total.clamp(0.0, 1.0)
    }

    fn file_category(&self, event: &ChangeEvent) -> Option<FileCategory> {
        match self.classifier.classify(&event.path) {
            Some(category) => Some(category),
            None => {
                let err = PipelineError::Scoring {
                    path: event.path.clone(),
                    dimension: Dimension::FileType.as_str(),
                    reason: "path has no file name".to_string(),
                };
                tracing::debug!("{err}; using neutral score");
                None
            }
        }
    }

    fn frequency_score(&mut self, event: &ChangeEvent) -> f64 {
        let history = self.history.entry(event.path.clone()).or_default();
        // A window reaching past the representable range prunes nothing.
        if let Some(window_start) = event.observed_at.checked_sub_signed(self.window) {
            history.retain(|(_, at)| *at > window_start);
        }

        let prior = history
            .iter()
            .filter(|(id, at)| *id != event.id && *at <= event.observed_at)
            .count();

        if !history.iter().any(|(id, _)| *id == event.id) {
            history.push_back((event.id, event.observed_at));
        }

        match prior {
            0 => 1.0,
            1..=2 => 0.7,
            3..=9 => 0.3,
            _ => 0.1,
        }
    }

    fn location_score(&self, path: &Path) -> Result<f64, PipelineError> {
        let scoring_error = |reason: &str| PipelineError::Scoring {
            path: path.to_path_buf(),
            dimension: Dimension::Location.as_str(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(
                    part.to_str()
                        .ok_or_else(|| scoring_error("path is not valid UTF-8"))?,
                ),
                Component::CurDir => {}
                _ => return Err(scoring_error("path is not relative to the project root")),
            }
        }

        let Some((_file, dirs)) = parts.split_last() else {
            return Err(scoring_error("empty path"));
        };

        if dirs.iter().any(|d| self.ignore_dirs.contains(*d)) {
            return Ok(0.0);
        }
        let Some(top) = dirs.first() else {
            return Ok(0.7);
        };
        Ok(self
            .priority_dirs
            .get(*top)
            .map(|score| score.min(0.9))
            .unwrap_or(0.4))
    }
}

fn content_delta_score(kind: ChangeKind, diff: Option<&str>) -> f64 {
    match kind {
        ChangeKind::Deleted => 1.0,
        ChangeKind::Added => 0.8,
        ChangeKind::Modified => {
            let Some(diff) = diff else {
                return NEUTRAL_SCORE;
            };
            match DiffStats::from_diff(diff).changed() {
                n if n > 50 => 1.0,
                n if n > 20 => 0.8,
                n if n > 5 => 0.5,
                _ => 0.2,
            }
        }
    }
}

/// Coarse hour-of-day proxy for a deliberate human edit.
fn timing_score(hour: u32) -> f64 {
    match hour {
        9..=17 => 1.0,
        7..=8 | 18..=21 => 0.7,
        22..=23 => 0.4,
        _ => 0.2,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn scorer() -> SignificanceScorer {
        SignificanceScorer::new(&RadarConfig::default()).unwrap()
    }

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 3, 10, hour, minute, second)
            .single()
            .expect("unambiguous local time")
    }

    fn event(id: u64, path: &str, kind: ChangeKind, observed_at: DateTime<Local>) -> ChangeEvent {
        ChangeEvent {
            id,
            path: PathBuf::from(path),
            kind,
            observed_at,
        }
    }

    fn diff_with_changes(n: usize) -> String {
        let mut diff = format!("--- a/f\n+++ b/f\n@@ -0,0 +1,{n} @@\n");
        for i in 0..n {
            diff.push_str(&format!("+line {i}\n"));
        }
        diff
    }

    #[test]
    fn test_claude_md_large_edit_is_significant() {
        let mut s = scorer();
        let ev = event(1, "CLAUDE.md", ChangeKind::Modified, at(10, 0, 0));
        let scored = s.score(&ev, Some(&diff_with_changes(60)));

        assert_eq!(scored.breakdown[&Dimension::FileType], 1.0);
        assert_eq!(scored.breakdown[&Dimension::ContentDelta], 1.0);
        assert_eq!(scored.breakdown[&Dimension::Frequency], 1.0);
        assert!(scored.score >= 0.3);
        assert!(scored.is_significant);
        assert!(scored.is_critical);
    }

    #[test]
    fn test_content_delta_thresholds() {
        let cases = [(51, 1.0), (50, 0.8), (21, 0.8), (20, 0.5), (6, 0.5), (5, 0.2), (0, 0.2)];
        for (lines, expected) in cases {
            let diff = diff_with_changes(lines);
            assert_eq!(
                content_delta_score(ChangeKind::Modified, Some(&diff)),
                expected,
                "{lines} lines"
            );
        }
        assert_eq!(content_delta_score(ChangeKind::Modified, None), 0.3);
        assert_eq!(content_delta_score(ChangeKind::Deleted, None), 1.0);
        assert_eq!(content_delta_score(ChangeKind::Added, None), 0.8);
    }

    #[test]
    fn test_frequency_decays_with_repeats() {
        let mut s = scorer();
        let expected = [1.0, 0.7, 0.7, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.1, 0.1];
        for (i, want) in expected.iter().enumerate() {
            let ev = event(i as u64, "src/app.ts", ChangeKind::Modified, at(10, 0, i as u32));
            let scored = s.score(&ev, None);
            assert_eq!(scored.breakdown[&Dimension::Frequency], *want, "change #{i}");
        }
    }

    #[test]
    fn test_frequency_window_prunes_old_changes() {
        let mut s = scorer();
        for i in 0..5 {
            s.score(&event(i, "src/app.ts", ChangeKind::Modified, at(10, 0, i as u32)), None);
        }
        let later = event(99, "src/app.ts", ChangeKind::Modified, at(10, 6, 0));
        let scored = s.score(&later, None);
        assert_eq!(scored.breakdown[&Dimension::Frequency], 1.0);
        assert_eq!(s.recorded_changes(Path::new("src/app.ts")), 1);
    }

    #[test]
    fn test_window_past_time_range_keeps_history() {
        let mut s = scorer();
        s.window = TimeDelta::MAX;
        let first = s.score(&event(1, "src/app.ts", ChangeKind::Modified, at(10, 0, 0)), None);
        let second = s.score(&event(2, "src/app.ts", ChangeKind::Modified, at(10, 0, 1)), None);
        assert_eq!(first.breakdown[&Dimension::Frequency], 1.0);
        assert!(second.breakdown[&Dimension::Frequency] < 1.0);
        assert_eq!(s.recorded_changes(Path::new("src/app.ts")), 2);
    }

    #[test]
    fn test_frequency_is_per_path() {
        let mut s = scorer();
        s.score(&event(1, "src/a.ts", ChangeKind::Modified, at(10, 0, 0)), None);
        let other = s.score(&event(2, "src/b.ts", ChangeKind::Modified, at(10, 0, 1)), None);
        assert_eq!(other.breakdown[&Dimension::Frequency], 1.0);
    }

    #[test]
    fn test_rescoring_same_event_does_not_double_count() {
        let mut s = scorer();
        let ev = event(7, "src/app.ts", ChangeKind::Modified, at(11, 0, 0));
        let first = s.score(&ev, None);
        let second = s.score(&ev, None);
        assert_eq!(first, second);
        assert_eq!(s.recorded_changes(Path::new("src/app.ts")), 1);
    }

    #[test]
    fn test_scoring_is_deterministic_for_equal_history() {
        let mut a = scorer();
        let mut b = scorer();
        let warmup = event(1, "docs/guide.md", ChangeKind::Modified, at(14, 0, 0));
        a.score(&warmup, None);
        b.score(&warmup, None);

        let ev = event(2, "docs/guide.md", ChangeKind::Modified, at(14, 1, 0));
        let diff = diff_with_changes(12);
        assert_eq!(a.score(&ev, Some(&diff)), b.score(&ev, Some(&diff)));
    }

    #[test]
    fn test_location_scores() {
        let s = scorer();
        assert_eq!(s.location_score(Path::new("README.md")).unwrap(), 0.7);
        assert_eq!(s.location_score(Path::new("src/app.ts")).unwrap(), 0.9);
        assert_eq!(s.location_score(Path::new("docs/a/b/c.md")).unwrap(), 0.8);
        assert_eq!(s.location_score(Path::new("misc/notes.txt")).unwrap(), 0.4);
        assert_eq!(s.location_score(Path::new("web/node_modules/x.js")).unwrap(), 0.0);
        assert!(s.location_score(Path::new("../outside.rs")).is_err());
        assert!(s.location_score(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_priority_dir_capped() {
        let mut config = RadarConfig::default();
        config.scoring.priority_dirs.insert("core".to_string(), 1.0);
        let s = SignificanceScorer::new(&config).unwrap();
        assert_eq!(s.location_score(Path::new("core/mod.rs")).unwrap(), 0.9);
    }

    #[test]
    fn test_timing_buckets() {
        assert_eq!(timing_score(10), 1.0);
        assert_eq!(timing_score(17), 1.0);
        assert_eq!(timing_score(8), 0.7);
        assert_eq!(timing_score(20), 0.7);
        assert_eq!(timing_score(23), 0.4);
        assert_eq!(timing_score(3), 0.2);
        assert!(timing_score(3) < timing_score(23));
    }

    #[test]
    fn test_unscorable_dimensions_fall_back_to_neutral() {
        let mut s = scorer();
        let ev = event(1, "..", ChangeKind::Deleted, at(10, 0, 0));
        let scored = s.score(&ev, None);
        assert_eq!(scored.breakdown[&Dimension::FileType], NEUTRAL_SCORE);
        assert_eq!(scored.breakdown[&Dimension::Location], NEUTRAL_SCORE);
        assert!(!scored.is_critical);
    }

    #[test]
    fn test_score_stays_within_unit_interval() {
        let mut s = scorer();
        let paths = ["CLAUDE.md", "src/app.ts", "server.log", "node_modules/a.js", "x", ".."];
        let kinds = [ChangeKind::Added, ChangeKind::Modified, ChangeKind::Deleted];
        let diffs = [None, Some(diff_with_changes(3)), Some(diff_with_changes(80))];
        let mut id = 0;
        for hour in [0, 8, 12, 22] {
            for path in paths {
                for kind in kinds {
                    for diff in &diffs {
                        id += 1;
                        let scored = s.score(&event(id, path, kind, at(hour, 0, 0)), diff.as_deref());
                        assert!((0.0..=1.0).contains(&scored.score), "{scored:?}");
                        for value in scored.breakdown.values() {
                            assert!((0.0..=1.0).contains(value));
                        }
                        assert_eq!(scored.breakdown.len(), Dimension::ALL.len());
                    }
                }
            }
        }
    }

    #[test]
    fn test_threshold_decides_significance() {
        let mut config = RadarConfig::default();
        config.scoring.threshold = 0.99;
        let mut strict = SignificanceScorer::new(&config).unwrap();
        let ev = event(1, "misc/data.csv", ChangeKind::Modified, at(3, 0, 0));
        let scored = strict.score(&ev, None);
        assert!(!scored.is_significant);
        assert!(scored.score < 0.99);
    }
}
