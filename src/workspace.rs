//! Source tree of the monitored service
//!
//! Reads the files the oracle is allowed to see and applies exact-match
//! patches to them. A patch batch is all-or-nothing: every file is patched
//! in memory first and nothing is written unless every change matched.

use crate::domain::FileChange;
use crate::error::PatchError;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    eligible: Vec<String>,
}

impl SourceTree {
    pub fn new(root: PathBuf, eligible: Vec<String>) -> Self {
        Self { root, eligible }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        !self.eligible.is_empty()
    }

    /// Current text of every eligible file; unreadable files are skipped
    pub async fn read_all(&self) -> BTreeMap<String, String> {
        let mut sources = BTreeMap::new();
        for filename in &self.eligible {
            match tokio::fs::read_to_string(self.root.join(filename)).await {
                Ok(content) => {
                    sources.insert(filename.clone(), content);
                }
                Err(e) => warn!("Error reading {}: {}", filename, e),
            }
        }
        sources
    }

    /// Map a plan filename to a path inside the tree
    fn resolve(&self, filename: &str) -> Result<PathBuf, PatchError> {
        let relative = Path::new(filename);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(PatchError::OutsideProject {
                filename: filename.to_string(),
            });
        }

        let normalized = normalize(relative);
        let allowed = self
            .eligible
            .iter()
            .any(|e| normalize(Path::new(e)) == normalized);
        if !allowed {
            return Err(PatchError::Ineligible {
                filename: filename.to_string(),
            });
        }

        Ok(self.root.join(normalized))
    }

    /// Apply every change of every file, or none at all.
    ///
    /// Returns the edited filenames in plan order.
    pub async fn apply(&self, files: &[FileChange]) -> Result<Vec<String>, PatchError> {
        let mut staged: Vec<(PathBuf, String, String)> = Vec::with_capacity(files.len());

        for file in files {
            let path = self.resolve(&file.filename)?;

            // A file listed twice is patched on top of its staged content
            let existing = staged.iter().position(|(p, _, _)| *p == path);
            let content = match existing {
                Some(idx) => staged[idx].2.clone(),
                None => tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| PatchError::Read {
                        filename: file.filename.clone(),
                        reason: e.to_string(),
                    })?,
            };

            let patched = patch_content(&file.filename, content, file)?;
            match existing {
                Some(idx) => staged[idx].2 = patched,
                None => staged.push((path, file.filename.clone(), patched)),
            }
        }

        write_staged(staged).await
    }
}

/// Write staged contents in order; a failure reports what already landed
async fn write_staged(staged: Vec<(PathBuf, String, String)>) -> Result<Vec<String>, PatchError> {
    let mut edited = Vec::with_capacity(staged.len());
    for (path, filename, content) in staged {
        if let Err(e) = tokio::fs::write(&path, content).await {
            if !edited.is_empty() {
                warn!("Partial patch: {:?} already written before {} failed", edited, filename);
            }
            return Err(PatchError::Write {
                filename,
                reason: e.to_string(),
                written: edited,
            });
        }
        info!("Wrote patched {}", filename);
        edited.push(filename);
    }
    Ok(edited)
}

/// Drop `.` components so `./main.py` and `main.py` compare equal
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Replace the first occurrence of each `old_code`, in order
pub fn patch_content(
    filename: &str,
    mut content: String,
    file: &FileChange,
) -> Result<String, PatchError> {
    if file.changes.is_empty() {
        return Err(PatchError::EmptyChangeSet {
            filename: filename.to_string(),
        });
    }

    for change in &file.changes {
        let occurrences = content.matches(change.old_code.as_str()).count();
        if occurrences == 0 {
            warn!("Could not find exact match in {}", filename);
            return Err(PatchError::NotFound {
                filename: filename.to_string(),
            });
        }
        if occurrences > 1 {
            // Known limitation: only the first site is patched
            warn!(
                "old_code occurs {} times in {}, replacing the first",
                occurrences, filename
            );
        }
        content = content.replacen(change.old_code.as_str(), &change.new_code, 1);
        debug!("Applied change to {}: {}", filename, change.explanation);
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CodeChange;
    use tempfile::tempdir;

    fn change(old: &str, new: &str) -> CodeChange {
        CodeChange {
            old_code: old.to_string(),
            new_code: new.to_string(),
            explanation: "test".to_string(),
        }
    }

    fn file(name: &str, changes: Vec<CodeChange>) -> FileChange {
        FileChange {
            filename: name.to_string(),
            changes,
        }
    }

    #[test]
    fn test_patch_replaces_first_occurrence_only() {
        let out = patch_content(
            "a.py",
            "x = d['k']\ny = d['k']\n".to_string(),
            &file("a.py", vec![change("d['k']", "d.get('k')")]),
        )
        .unwrap();
        assert_eq!(out, "x = d.get('k')\ny = d['k']\n");
    }

    #[test]
    fn test_patch_is_whitespace_sensitive() {
        let err = patch_content(
            "a.py",
            "if x:\n    run()\n".to_string(),
            &file("a.py", vec![change("if x:\n  run()", "pass")]),
        )
        .unwrap_err();
        assert_eq!(err, PatchError::NotFound { filename: "a.py".to_string() });
    }

    #[test]
    fn test_changes_apply_in_order() {
        let out = patch_content(
            "a.py",
            "a".to_string(),
            &file("a.py", vec![change("a", "b"), change("b", "c")]),
        )
        .unwrap();
        assert_eq!(out, "c");
    }

    #[tokio::test]
    async fn test_apply_writes_all_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print(x['k'])\nrest\n").unwrap();
        std::fs::write(dir.path().join("start.py"), "run()\n").unwrap();

        let tree = SourceTree::new(
            dir.path().to_path_buf(),
            vec!["main.py".to_string(), "start.py".to_string()],
        );
        let edited = tree
            .apply(&[
                file("main.py", vec![change("x['k']", "x.get('k')")]),
                file("./start.py", vec![change("run()", "run(retry=True)")]),
            ])
            .await
            .unwrap();

        assert_eq!(edited, vec!["main.py", "./start.py"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.py")).unwrap(),
            "print(x.get('k'))\nrest\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("start.py")).unwrap(),
            "run(retry=True)\n"
        );
    }

    #[tokio::test]
    async fn test_missing_match_writes_nothing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "alpha\n").unwrap();
        std::fs::write(dir.path().join("start.py"), "beta\n").unwrap();

        let tree = SourceTree::new(
            dir.path().to_path_buf(),
            vec!["main.py".to_string(), "start.py".to_string()],
        );
        let err = tree
            .apply(&[
                file("main.py", vec![change("alpha", "ALPHA")]),
                file("start.py", vec![change("gamma", "GAMMA")]),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, PatchError::NotFound { filename: "start.py".to_string() });
        assert_eq!(std::fs::read_to_string(dir.path().join("main.py")).unwrap(), "alpha\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("start.py")).unwrap(), "beta\n");
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_tree() {
        let dir = tempdir().unwrap();
        let tree = SourceTree::new(dir.path().to_path_buf(), vec!["main.py".to_string()]);

        let err = tree
            .apply(&[file("../etc/passwd", vec![change("a", "b")])])
            .await
            .unwrap_err();
        assert!(matches!(err, PatchError::OutsideProject { .. }));

        let err = tree
            .apply(&[file("/etc/passwd", vec![change("a", "b")])])
            .await
            .unwrap_err();
        assert!(matches!(err, PatchError::OutsideProject { .. }));
    }

    #[tokio::test]
    async fn test_rejects_ineligible_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM python\n").unwrap();
        let tree = SourceTree::new(dir.path().to_path_buf(), vec!["main.py".to_string()]);

        let err = tree
            .apply(&[file("Dockerfile", vec![change("python", "alpine")])])
            .await
            .unwrap_err();
        assert_eq!(err, PatchError::Ineligible { filename: "Dockerfile".to_string() });
    }

    #[tokio::test]
    async fn test_read_all_skips_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "x = 1\n").unwrap();
        let tree = SourceTree::new(
            dir.path().to_path_buf(),
            vec!["main.py".to_string(), "gone.py".to_string()],
        );
        let sources = tree.read_all().await;
        assert_eq!(sources.len(), 1);
        assert_eq!(sources["main.py"], "x = 1\n");
    }

    #[tokio::test]
    async fn test_write_failure_reports_written_files() {
        let dir = tempdir().unwrap();
        let blocked = dir.path().join("start.py");
        std::fs::create_dir(&blocked).unwrap();

        let err = write_staged(vec![
            (dir.path().join("main.py"), "main.py".to_string(), "new\n".to_string()),
            (blocked, "start.py".to_string(), "new\n".to_string()),
        ])
        .await
        .unwrap_err();

        assert!(matches!(err, PatchError::Write { ref filename, .. } if filename == "start.py"));
        assert_eq!(err.written_files(), &["main.py".to_string()]);
        assert_eq!(std::fs::read_to_string(dir.path().join("main.py")).unwrap(), "new\n");
    }
}
