pub mod event;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::change::ChangeKind;
use crate::config::{FilterConfig, STATE_DIR};
use crate::walker;

use event::RawChange;

/// Coalescing window for raw OS notifications. Short: the pipeline's own
/// debounce buffer does the real batching.
const RAW_DEBOUNCE: Duration = Duration::from_millis(50);

/// Handle to a running watcher. Dropping it stops watching.
pub struct WatcherHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _bridge_task: JoinHandle<()>,
}

/// Tells additions from modifications by remembering which files exist.
///
/// `notify-debouncer-mini` reports only "something happened at this path";
/// the kind is recovered by comparing the path's existence against the set.
#[derive(Debug, Default)]
pub struct KindTracker {
    known: HashSet<PathBuf>,
}

impl KindTracker {
    pub fn new(known: HashSet<PathBuf>) -> Self {
        Self { known }
    }

    /// Classify a notification for `path`. `None` for directories and for
    /// files that appeared and vanished between two notifications.
    pub fn classify(&mut self, path: &Path, exists: bool, is_dir: bool) -> Option<ChangeKind> {
        if is_dir {
            return None;
        }
        match (exists, self.known.contains(path)) {
            (true, true) => Some(ChangeKind::Modified),
            (true, false) => {
                self.known.insert(path.to_path_buf());
                Some(ChangeKind::Added)
            }
            (false, true) => {
                self.known.remove(path);
                Some(ChangeKind::Deleted)
            }
            (false, false) => None,
        }
    }

    fn len(&self) -> usize {
        self.known.len()
    }
}

/// Build a Gitignore matcher from the project root's .gitignore file.
/// If no .gitignore exists, returns an empty matcher that matches nothing.
fn build_gitignore_matcher(project_root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(project_root);
    let gitignore_path = project_root.join(".gitignore");
    if gitignore_path.exists()
        && let Some(err) = builder.add(&gitignore_path)
    {
        tracing::warn!("{}: {err}", gitignore_path.display());
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Start watching `root` recursively, sending classified changes to `tx`.
///
/// `root` should be absolute; notify reports absolute paths. Existing files are
/// snapshotted first so their first write is classified as a modification.
/// Paths inside `.git` and the tool's own state directory are never reported,
/// and `.gitignore`d paths are skipped when `filter.respect_gitignore` is set.
/// Everything else is left to the pipeline's noise filter.
pub fn start_watcher(
    root: &Path,
    filter: &FilterConfig,
    tx: tokio_mpsc::Sender<RawChange>,
) -> anyhow::Result<WatcherHandle> {
    let mut tracker = KindTracker::new(walker::snapshot_files(root, filter));
    tracing::info!("watching {} ({} existing files)", root.display(), tracker.len());

    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(RAW_DEBOUNCE, move |res| {
        let _ = std_tx.send(res);
    })?;
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;

    let gitignore = filter
        .respect_gitignore
        .then(|| build_gitignore_matcher(root));

    // Bridge: receive from the std channel on a blocking thread, classify, forward to tokio.
    let root = root.to_path_buf();
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            let events = match result {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!("watch error: {err}");
                    continue;
                }
            };
            for debounced in events {
                let path = debounced.path;
                if is_excluded(&path, &root, gitignore.as_ref()) {
                    continue;
                }
                let Some(kind) = tracker.classify(&path, path.exists(), path.is_dir()) else {
                    continue;
                };
                if tx.blocking_send(RawChange::now(path, kind)).is_err() {
                    return; // pipeline closed
                }
            }
        }
    });

    Ok(WatcherHandle {
        _debouncer: debouncer,
        _bridge_task: bridge_task,
    })
}

fn is_excluded(path: &Path, root: &Path, gitignore: Option<&Gitignore>) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false; // the pipeline rejects it as malformed
    };
    if relative
        .components()
        .any(|c| c.as_os_str() == ".git" || c.as_os_str() == STATE_DIR)
    {
        return true;
    }
    gitignore.is_some_and(|gi| {
        gi.matched_path_or_any_parents(relative, path.is_dir())
            .is_ignore()
    })
}
