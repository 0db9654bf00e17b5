use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

/// Source of unified-diff text for a path.
///
/// Implementations never fail: a clean, untracked or unreadable file yields `None`.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    async fn diff(&self, path: &Path) -> Option<String>;
}

/// Asks `git` for the working-tree diff of a path against `HEAD`.
pub struct GitDiffProvider {
    repo_root: PathBuf,
}

impl GitDiffProvider {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }
}

#[async_trait]
impl DiffProvider for GitDiffProvider {
    async fn diff(&self, path: &Path) -> Option<String> {
        let output = Command::new("git")
            .args(["diff", "HEAD", "--no-color", "--no-ext-diff", "--"])
            .arg(path)
            .current_dir(&self.repo_root)
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!("git diff unavailable for {}: {err}", path.display());
                return None;
            }
        };

        // Non-zero exit: not a repository, or no HEAD yet.
        if !output.status.success() {
            return None;
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Provider for projects without version control.
pub struct NoDiff;

#[async_trait]
impl DiffProvider for NoDiff {
    async fn diff(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Line counts extracted from a unified diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    /// Changed lines whose content is more than whitespace.
    pub substantive: usize,
}

impl DiffStats {
    pub fn from_diff(diff: &str) -> Self {
        let mut stats = DiffStats::default();
        for (sign, body) in changed_lines(diff) {
            match sign {
                '+' => stats.added += 1,
                _ => stats.removed += 1,
            }
            if !body.trim().is_empty() {
                stats.substantive += 1;
            }
        }
        stats
    }

    pub fn changed(&self) -> usize {
        self.added + self.removed
    }
}

/// True when every change in the diff is whitespace: the added and removed
/// lines read the same, in order, once whitespace is stripped and blank lines
/// dropped.
///
/// A diff without changed lines is not considered whitespace-only.
pub fn is_whitespace_only(diff: &str) -> bool {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut any = false;

    for (sign, body) in changed_lines(diff) {
        any = true;
        let squeezed: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        if squeezed.is_empty() {
            continue;
        }
        if sign == '+' {
            added.push(squeezed);
        } else {
            removed.push(squeezed);
        }
    }

    any && added == removed
}

/// Every added or removed line as `(sign, body)`.
///
/// Parsed with `diffy`, which follows the hunk line counts, so a removed line
/// that itself starts with `--` is not mistaken for a file header. Input that
/// `diffy` rejects (several files in one diff, for one) goes through
/// [`scan_changed_lines`].
fn changed_lines(diff: &str) -> Vec<(char, &str)> {
    let Ok(patch) = diffy::Patch::from_str(diff) else {
        return scan_changed_lines(diff);
    };
    // `Patch::hunks` ties line bodies to `patch`; they are slices of `diff`,
    // so re-slice them from `diff` to return them with its lifetime.
    let within = |body: &str| -> &str {
        let start = body.as_ptr() as usize - diff.as_ptr() as usize;
        &diff[start..start + body.len()]
    };
    let mut lines = Vec::new();
    for hunk in patch.hunks() {
        for line in hunk.lines() {
            match line {
                diffy::Line::Insert(body) => lines.push(('+', within(body))),
                diffy::Line::Delete(body) => lines.push(('-', within(body))),
                diffy::Line::Context(_) => {}
            }
        }
    }
    lines
}

/// Line scanner for diffs `diffy` cannot parse. `---`/`+++` lines are file
/// headers only between a `diff` line and the first `@@` that follows it.
fn scan_changed_lines(diff: &str) -> Vec<(char, &str)> {
    let mut in_hunk = false;
    let mut lines = Vec::new();
    for line in diff.lines() {
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if line.starts_with("diff ") {
            in_hunk = false;
            continue;
        }
        if !in_hunk {
            continue;
        }
        let mut chars = line.chars();
        if let Some(sign @ ('+' | '-')) = chars.next() {
            lines.push((sign, chars.as_str()));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "diff --git a/src/app.ts b/src/app.ts\nindex 1..2 100644\n--- a/src/app.ts\n+++ b/src/app.ts\n@@ -1,3 +1,3 @@\n";

    #[test]
    fn test_stats_ignore_file_headers() {
        let diff = format!("{HEADER} context\n-let a = 1;\n+let a = 2;\n+\n");
        let stats = DiffStats::from_diff(&diff);
        assert_eq!(stats.added, 2);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.changed(), 3);
        assert_eq!(stats.substantive, 2);
    }

    #[test]
    fn test_whitespace_only_reindent() {
        let diff = format!("{HEADER}-fn main() {{\n+fn  main()  {{\n-\tx();\n+    x();\n");
        assert!(is_whitespace_only(&diff));
    }

    #[test]
    fn test_whitespace_only_blank_lines() {
        let diff = format!("{HEADER}+\n+   \n-\t\n");
        assert!(is_whitespace_only(&diff));
    }

    #[test]
    fn test_real_change_is_not_whitespace_only() {
        let diff = format!("{HEADER}-let a = 1;\n+let a = 2;\n");
        assert!(!is_whitespace_only(&diff));
    }

    #[test]
    fn test_reordered_lines_are_a_real_change() {
        let diff = format!("{HEADER}-a();\n-b();\n+  b();\n+  a();\n");
        assert!(!is_whitespace_only(&diff));
    }

    #[test]
    fn test_empty_diff_is_not_whitespace_only() {
        assert!(!is_whitespace_only(HEADER));
        assert!(!is_whitespace_only(""));
    }

    #[test]
    fn test_removed_sql_comment_is_a_real_change() {
        let diff = "--- a/q.sql\n+++ b/q.sql\n@@ -1,2 +1,1 @@\n--- drop legacy\n-  select 1;\n+select 1;\n";
        assert!(!is_whitespace_only(diff));
        let stats = DiffStats::from_diff(diff);
        assert_eq!((stats.added, stats.removed), (1, 2));
    }

    #[test]
    fn test_removed_front_matter_counts_every_line() {
        let diff = "diff --git a/post.md b/post.md\n--- a/post.md\n+++ b/post.md\n@@ -1,4 +1,1 @@\n----\n-title: x\n----\n # Post\n";
        let stats = DiffStats::from_diff(diff);
        assert_eq!(stats.removed, 3);
        assert_eq!(stats.added, 0);
        assert_eq!(stats.substantive, 3);
    }

    #[test]
    fn test_fallback_scanner_treats_dashes_in_hunks_as_changes() {
        let diff = "diff --git a/a.sql b/a.sql\n--- a/a.sql\n+++ b/a.sql\n@@ -1 +0,0 @@\n--- gone\n\
                    diff --git a/b.md b/b.md\n--- a/b.md\n+++ b/b.md\n@@ -0,0 +1 @@\n++++ kept\n";
        assert_eq!(
            scan_changed_lines(diff),
            vec![('-', "-- gone"), ('+', "+++ kept")]
        );
    }

    #[tokio::test]
    async fn test_git_diff_outside_repository_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.md"), "# hi\n").unwrap();
        let provider = GitDiffProvider::new(tmp.path());
        assert!(provider.diff(Path::new("notes.md")).await.is_none());
    }
}
