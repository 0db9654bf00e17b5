use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{FilterConfig, STATE_DIR};

/// Collect every file currently under `root`, as absolute paths.
///
/// Used to seed the watcher's set of known files, so the first write to an
/// existing file is reported as a modification rather than an addition.
/// Directories named in `config.ignore_dirs` are not descended into, and
/// `.gitignore` rules apply when `config.respect_gitignore` is set.
pub fn snapshot_files(root: &Path, config: &FilterConfig) -> HashSet<PathBuf> {
    let ignore_dirs: HashSet<String> = config.ignore_dirs.iter().cloned().collect();

    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .git_global(false)
        // Read .gitignore files even when the directory is not inside a git repository.
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            let name = entry.file_name().to_string_lossy();
            !(is_dir && (name == ".git" || name == STATE_DIR || ignore_dirs.contains(&*name)))
        })
        .build();

    let mut files = HashSet::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("walk: {err}");
                continue;
            }
        };
        if entry.file_type().is_some_and(|ft| ft.is_file()) {
            files.insert(entry.into_path());
        }
    }

    tracing::debug!("found {} existing file(s) under {}", files.len(), root.display());
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn names(files: &HashSet<PathBuf>, root: &Path) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_snapshot_finds_all_files_including_hidden() {
        let dir = tmp();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# Hello").unwrap();
        fs::write(dir.path().join(".env.example"), "KEY=").unwrap();

        let files = snapshot_files(dir.path(), &FilterConfig::default());
        assert_eq!(
            names(&files, dir.path()),
            vec![".env.example", "README.md", "src/main.rs"]
        );
    }

    #[test]
    fn test_snapshot_skips_ignored_dirs() {
        let dir = tmp();
        let nm = dir.path().join("node_modules").join("pkg");
        fs::create_dir_all(&nm).unwrap();
        fs::write(nm.join("package.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        fs::write(dir.path().join(STATE_DIR).join("state"), "x").unwrap();
        fs::write(dir.path().join("README.md"), "# Hello").unwrap();

        let files = snapshot_files(dir.path(), &FilterConfig::default());
        assert_eq!(names(&files, dir.path()), vec!["README.md"]);
    }

    #[test]
    fn test_snapshot_gitignore_toggle() {
        let dir = tmp();
        fs::write(dir.path().join(".gitignore"), "secret.txt\n").unwrap();
        fs::write(dir.path().join("secret.txt"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "y").unwrap();

        let respected = snapshot_files(dir.path(), &FilterConfig::default());
        assert!(!names(&respected, dir.path()).contains(&"secret.txt".to_string()));

        let config = FilterConfig {
            respect_gitignore: false,
            ..FilterConfig::default()
        };
        let all = snapshot_files(dir.path(), &config);
        assert!(names(&all, dir.path()).contains(&"secret.txt".to_string()));
    }
}
