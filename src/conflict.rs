//! Git-level and semantic conflict detection.

use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;

use crate::vcs::Repository;
use crate::worktree_manager::WorktreeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub file: PathBuf,
    pub location: Option<String>,
    pub reason: Option<String>,
    pub severity: Severity,
    pub can_auto_merge: bool,
}

pub struct ConflictClassifier<'a> {
    repo: &'a Repository,
}

impl<'a> ConflictClassifier<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// Detects git-level conflicts between the base branch and a spec's
    /// worktree branch using a non-destructive three-way merge-tree. Never
    /// touches the working tree or index: `merge-tree` operates purely on
    /// the object store.
    pub fn check_git_conflicts(&self, info: &WorktreeInfo) -> anyhow::Result<Vec<Conflict>> {
        let Some(base) = self.repo.merge_base(&info.base_branch, &info.branch)? else {
            // No common ancestor: nothing to reconcile at the git level, the
            // worktree branch content simply wins (handled by the orchestrator).
            return Ok(Vec::new());
        };

        let Some(raw) = self
            .repo
            .merge_tree_check(&base, &info.base_branch, &info.branch)?
        else {
            return Ok(Vec::new());
        };

        let parsed = parse_merge_tree_conflicts(&raw);
        if !parsed.is_empty() {
            return Ok(parsed);
        }

        // merge-tree reported conflicts but we couldn't parse file names out of
        // its output (format varies by git version) — fall back to the
        // intersection of files changed on each side since the merge-base.
        let base_changed: HashSet<PathBuf> = self
            .repo
            .diff_name_status(&base, &info.base_branch)?
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        let branch_changed: HashSet<PathBuf> = self
            .repo
            .diff_name_status(&base, &info.branch)?
            .into_iter()
            .map(|(_, p)| p)
            .collect();

        Ok(base_changed
            .intersection(&branch_changed)
            .cloned()
            .map(|file| Conflict {
                file,
                location: None,
                reason: Some("changed on both sides since branch point".to_string()),
                severity: Severity::Medium,
                can_auto_merge: true,
            })
            .collect())
    }

    /// Semantic conflict preview over planned changes for one or more specs,
    /// for use before an actual merge is attempted.
    pub fn preview_merge(&self, infos: &[WorktreeInfo]) -> anyhow::Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();
        for info in infos {
            conflicts.extend(self.check_git_conflicts(info)?);
        }
        Ok(conflicts)
    }
}

/// Parse file paths out of `git merge-tree --write-tree` conflict output.
///
/// The format includes lines like:
/// ```text
/// CONFLICT (content): Merge conflict in src/lib.rs
/// ```
fn parse_merge_tree_conflicts(raw: &str) -> Vec<Conflict> {
    let re = Regex::new(r"^CONFLICT \(([^)]+)\): .*? in (.+)$").expect("valid regex");
    raw.lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let kind = caps.get(1)?.as_str();
            let path = caps.get(2)?.as_str();
            Some(Conflict {
                file: PathBuf::from(path),
                location: None,
                reason: Some(kind.to_string()),
                severity: if kind.contains("content") {
                    Severity::Medium
                } else {
                    Severity::High
                },
                can_auto_merge: kind.contains("content"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_conflict_as_medium_auto_mergeable() {
        let raw = "CONFLICT (content): Merge conflict in src/lib.rs\n";
        let parsed = parse_merge_tree_conflicts(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].file, PathBuf::from("src/lib.rs"));
        assert_eq!(parsed[0].severity, Severity::Medium);
        assert!(parsed[0].can_auto_merge);
    }

    #[test]
    fn parses_rename_conflict_as_high_not_auto_mergeable() {
        let raw = "CONFLICT (rename/rename): Merge conflict in old.rs and new.rs\n";
        let parsed = parse_merge_tree_conflicts(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].severity, Severity::High);
        assert!(!parsed[0].can_auto_merge);
    }

    #[test]
    fn unparseable_output_yields_no_conflicts_here() {
        // The classifier itself falls back to diff intersection in this case;
        // the parser alone should just return empty, not panic.
        assert!(parse_merge_tree_conflicts("garbled nonsense\n").is_empty());
    }
}
