use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::parser::ParsedMetadata;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// A single observed change, relative to the project root.
///
/// `id` is unique per pipeline run and lets the scorer recognise an event it
/// has already counted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub id: u64,
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: DateTime<Local>,
}

impl ChangeEvent {
    /// The relative path with `/` separators, the form every pattern is matched against.
    pub fn path_str(&self) -> String {
        normalized_path(&self.path)
    }
}

pub fn normalized_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// One of the five scoring dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    FileType,
    ContentDelta,
    Frequency,
    Location,
    Timing,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::FileType,
        Dimension::ContentDelta,
        Dimension::Frequency,
        Dimension::Location,
        Dimension::Timing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::FileType => "file_type",
            Dimension::ContentDelta => "content_delta",
            Dimension::Frequency => "frequency",
            Dimension::Location => "location",
            Dimension::Timing => "timing",
        }
    }
}

/// A change with its weighted significance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChange {
    #[serde(flatten)]
    pub event: ChangeEvent,
    pub score: f64,
    pub breakdown: BTreeMap<Dimension, f64>,
    pub is_significant: bool,
    /// Whether the path matched a critical pattern. Carried forward for the meaningful gate.
    #[serde(skip)]
    pub is_critical: bool,
}

impl ScoredChange {
    pub fn path(&self) -> &PathBuf {
        &self.event.path
    }

    pub fn kind(&self) -> ChangeKind {
        self.event.kind
    }
}

/// Terminal form of a change, handed to the consumer once.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedChange {
    #[serde(flatten)]
    pub scored: ScoredChange,
    pub diff_text: Option<String>,
    pub parsed_metadata: Option<ParsedMetadata>,
    pub content_changed: bool,
    pub is_meaningful: bool,
}
