use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::UNIX_EPOCH;

use futures::future::join_all;
use sha2::{Digest, Sha256};

use crate::change::{ChangeKind, EnrichedChange, ScoredChange};
use crate::error::PipelineError;
use crate::parser::{ContentParser, ParsedMetadata};

use super::diff::{DiffProvider, DiffStats};

/// Minimum non-whitespace changed lines for a non-critical modification to count.
pub const MIN_SUBSTANTIVE_LINES: usize = 3;

/// Last seen content of a path: SHA-256 hash plus filesystem metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub hash: String,
    pub size: u64,
    pub mtime_secs: u64,
}

/// Attaches content hashes, diff text and a structural summary to scored changes.
///
/// Owns the per-path content cache; it is created empty and dropped with the
/// enricher.
pub struct Enricher {
    root: PathBuf,
    diff: Arc<dyn DiffProvider>,
    parser: Arc<dyn ContentParser>,
    cache: Mutex<HashMap<PathBuf, ContentRecord>>,
}

impl Enricher {
    pub fn new(
        root: impl Into<PathBuf>,
        diff: Arc<dyn DiffProvider>,
        parser: Arc<dyn ContentParser>,
    ) -> Self {
        Self {
            root: root.into(),
            diff,
            parser,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Enrich every change concurrently. The output keeps the input order.
    pub async fn enrich_batch(&self, batch: Vec<ScoredChange>) -> Vec<EnrichedChange> {
        join_all(batch.into_iter().map(|change| self.enrich(change))).await
    }

    pub async fn enrich(&self, scored: ScoredChange) -> EnrichedChange {
        let path = scored.path().clone();

        if scored.kind() == ChangeKind::Deleted {
            self.cache().remove(&path);
            return finish(scored, None, None, true);
        }

        let (content, record) = match self.read(&path).await {
            Ok(read) => read,
            Err(err) => {
                tracing::warn!("{err}; delivering without content details");
                return finish(scored, None, None, true);
            }
        };

        let previous = self.cache().insert(path.clone(), record.clone());
        let content_changed = previous.is_none_or(|p| p.hash != record.hash);

        let diff_text = if content_changed {
            self.diff.diff(&path).await
        } else {
            None
        };

        let parsed = match self.parser.parse(&path, &content) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                tracing::debug!("no structural summary for {}: {err:#}", path.display());
                None
            }
        };

        finish(scored, diff_text, parsed, content_changed)
    }

    /// Cached record for a path, if it has been read before.
    #[cfg(test)]
    pub fn cached(&self, path: &Path) -> Option<ContentRecord> {
        self.cache().get(path).cloned()
    }

    async fn read(&self, path: &Path) -> Result<(Vec<u8>, ContentRecord), PipelineError> {
        let full = self.root.join(path);
        let io_error = |source| PipelineError::EnrichmentIo {
            path: path.to_path_buf(),
            source,
        };

        let content = tokio::fs::read(&full).await.map_err(io_error)?;
        let metadata = tokio::fs::metadata(&full).await.map_err(io_error)?;
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let record = ContentRecord {
            hash: format!("{:x}", Sha256::digest(&content)),
            size: metadata.len(),
            mtime_secs,
        };
        Ok((content, record))
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<PathBuf, ContentRecord>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn finish(
    scored: ScoredChange,
    diff_text: Option<String>,
    parsed_metadata: Option<ParsedMetadata>,
    content_changed: bool,
) -> EnrichedChange {
    let is_meaningful = is_meaningful(
        scored.kind(),
        content_changed,
        scored.is_critical,
        diff_text.as_deref(),
    );
    EnrichedChange {
        scored,
        diff_text,
        parsed_metadata,
        content_changed,
        is_meaningful,
    }
}

/// Final deliver/drop gate.
///
/// Additions and deletions always pass. A modification passes only if its
/// content changed and it is either critical or has at least
/// [`MIN_SUBSTANTIVE_LINES`] non-whitespace changed lines. Without a diff the
/// line check cannot run, and the change passes.
pub fn is_meaningful(
    kind: ChangeKind,
    content_changed: bool,
    is_critical: bool,
    diff: Option<&str>,
) -> bool {
    match kind {
        ChangeKind::Added | ChangeKind::Deleted => true,
        ChangeKind::Modified => {
            content_changed
                && (is_critical
                    || diff.is_none_or(|d| DiffStats::from_diff(d).substantive >= MIN_SUBSTANTIVE_LINES))
        }
    }
}
