use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::change::ChangeKind;

/// A filesystem notification after add/modify/delete classification, before
/// it has been validated or given an id.
#[derive(Debug, Clone)]
pub struct RawChange {
    /// Absolute, or relative to the watched root.
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Local>,
}

impl RawChange {
    pub fn now(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Local::now(),
        }
    }
}
