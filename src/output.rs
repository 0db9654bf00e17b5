use std::io::Write;

use async_trait::async_trait;
use serde_json::json;

use crate::change::{ChangeEvent, Dimension, EnrichedChange};
use crate::cli::OutputFormat;
use crate::parser::ParsedMetadata;
use crate::pipeline::ChangeConsumer;
use crate::pipeline::diff::DiffStats;
use crate::pipeline::filter::IgnoreReason;
use crate::stats::StatsSnapshot;

/// Compact one-line rendering of a delivered change.
///
/// `modified 0.73 CLAUDE.md critical +12 -3 (4 headings)`
pub fn format_change_line(change: &EnrichedChange) -> String {
    let scored = &change.scored;
    let mut line = format!(
        "{:<8} {:.2} {}",
        scored.kind().as_str(),
        scored.score,
        scored.event.path_str()
    );
    if scored.is_critical {
        line.push_str(" critical");
    }
    if let Some(diff) = &change.diff_text {
        let stats = DiffStats::from_diff(diff);
        line.push_str(&format!(" +{} -{}", stats.added, stats.removed));
    }
    if let Some(summary) = change.parsed_metadata.as_ref().and_then(metadata_summary) {
        line.push_str(&format!(" ({summary})"));
    }
    line
}

fn metadata_summary(meta: &ParsedMetadata) -> Option<String> {
    let plural = |n: usize, word: &str| format!("{n} {word}{}", if n == 1 { "" } else { "s" });
    if !meta.headings.is_empty() {
        Some(plural(meta.headings.len(), "heading"))
    } else if !meta.keys.is_empty() {
        Some(plural(meta.keys.len(), "key"))
    } else if meta.definitions > 0 {
        Some(plural(meta.definitions, "definition"))
    } else {
        None
    }
}

/// Render one change in the selected format, without a trailing newline.
pub fn render_change(change: &EnrichedChange, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Compact => format_change_line(change),
        OutputFormat::Json => serde_json::to_string(change)?,
    })
}

/// Consumer that prints each delivered change to stdout.
#[derive(Debug, Clone, Copy)]
pub struct StdoutConsumer {
    format: OutputFormat,
}

impl StdoutConsumer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl ChangeConsumer for StdoutConsumer {
    async fn deliver(&self, changes: Vec<EnrichedChange>) -> anyhow::Result<()> {
        let mut text = String::new();
        for change in &changes {
            text.push_str(&render_change(change, self.format)?);
            text.push('\n');
        }
        let mut out = std::io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Print the result of a one-shot `score` run that was scored and enriched.
///
/// Compact output is the change line, then one line per score dimension, then
/// the two verdicts.
pub fn print_evaluation(change: &EnrichedChange, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Compact => {
            println!("{}", format_change_line(change));
            for dim in Dimension::ALL {
                if let Some(value) = change.scored.breakdown.get(&dim) {
                    println!("  {:<14}{value:.2}", dim.as_str());
                }
            }
            println!(
                "significant: {}  meaningful: {}",
                yes_no(change.scored.is_significant),
                yes_no(change.is_meaningful)
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(change)?),
    }
    Ok(())
}

/// Print the result of a one-shot `score` run that the noise filter dropped.
pub fn print_ignored(
    event: &ChangeEvent,
    reason: IgnoreReason,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Compact => println!("ignored {} ({})", event.path_str(), reason.as_str()),
        OutputFormat::Json => {
            let value = json!({
                "path": event.path_str(),
                "kind": event.kind,
                "ignored": reason.as_str(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

/// Print a run summary to stderr, keeping stdout clean for change output.
pub fn print_stats(stats: &StatsSnapshot, format: OutputFormat) {
    if format == OutputFormat::Json {
        match serde_json::to_string(stats) {
            Ok(s) => eprintln!("{}", s),
            Err(e) => eprintln!("error serialising stats: {}", e),
        }
        return;
    }

    eprintln!(
        "Received {} events: {} ignored, {} malformed, {} scored",
        stats.received, stats.ignored, stats.malformed, stats.scored
    );
    eprintln!(
        "  {} flushes, {} below threshold, {} truncated",
        stats.flushes, stats.insignificant, stats.truncated
    );
    eprintln!(
        "  {} enriched, {} not meaningful, {} delivered",
        stats.enriched, stats.not_meaningful, stats.delivered
    );
    if stats.consumer_errors > 0 {
        eprintln!("  {} batches failed to deliver", stats.consumer_errors);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use chrono::Local;

    use super::*;
    use crate::change::{ChangeKind, ScoredChange};
    use crate::parser::ContentFormat;

    fn enriched(path: &str, diff: Option<&str>, meta: Option<ParsedMetadata>) -> EnrichedChange {
        EnrichedChange {
            scored: ScoredChange {
                event: ChangeEvent {
                    id: 7,
                    path: PathBuf::from(path),
                    kind: ChangeKind::Modified,
                    observed_at: Local::now(),
                },
                score: 0.734,
                breakdown: BTreeMap::from([(Dimension::FileType, 1.0), (Dimension::Timing, 0.4)]),
                is_significant: true,
                is_critical: true,
            },
            diff_text: diff.map(str::to_string),
            parsed_metadata: meta,
            content_changed: true,
            is_meaningful: true,
        }
    }

    fn headings(n: usize) -> ParsedMetadata {
        ParsedMetadata {
            format: ContentFormat::Markdown,
            line_count: 10,
            headings: (0..n).map(|i| format!("H{i}")).collect(),
            keys: Vec::new(),
            definitions: 0,
        }
    }

    #[test]
    fn test_compact_line() {
        let change = enriched("CLAUDE.md", Some("--- a\n+++ b\n-x\n+y\n+z\n"), Some(headings(2)));
        assert_eq!(
            format_change_line(&change),
            "modified 0.73 CLAUDE.md critical +2 -1 (2 headings)"
        );
    }

    #[test]
    fn test_compact_line_without_details() {
        let mut change = enriched("notes.txt", None, None);
        change.scored.is_critical = false;
        assert_eq!(format_change_line(&change), "modified 0.73 notes.txt");
    }

    #[test]
    fn test_json_line_is_flat() {
        let change = enriched("CLAUDE.md", None, Some(headings(1)));
        let line = render_change(&change, OutputFormat::Json).unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["path"], "CLAUDE.md");
        assert_eq!(value["kind"], "modified");
        assert_eq!(value["id"], 7);
        assert_eq!(value["breakdown"]["file_type"], 1.0);
        assert_eq!(value["is_meaningful"], true);
        assert_eq!(value["parsed_metadata"]["headings"][0], "H0");
        assert!(value["diff_text"].is_null());
    }
}
