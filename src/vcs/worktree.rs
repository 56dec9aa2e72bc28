//! Parsing for `git worktree list --porcelain` output.

use std::path::PathBuf;

/// A single entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsWorktree {
    pub path: PathBuf,
    pub head: Option<String>,
    pub branch: Option<String>,
    pub bare: bool,
    pub detached: bool,
}

/// A non-empty, bare-filtered list of worktrees.
#[derive(Debug, Clone)]
pub struct WorktreeList(Vec<VcsWorktree>);

impl WorktreeList {
    pub fn into_inner(self) -> Vec<VcsWorktree> {
        self.0
    }
}

impl IntoIterator for WorktreeList {
    type Item = VcsWorktree;
    type IntoIter = std::vec::IntoIter<VcsWorktree>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

pub(super) fn parse_porcelain_list(stdout: &str) -> Vec<VcsWorktree> {
    let mut worktrees = Vec::new();
    let mut current: Option<VcsWorktree> = None;

    for line in stdout.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(wt) = current.take() {
                worktrees.push(wt);
            }
            current = Some(VcsWorktree {
                path: PathBuf::from(path),
                head: None,
                branch: None,
                bare: false,
                detached: false,
            });
        } else if let Some(wt) = current.as_mut() {
            if let Some(head) = line.strip_prefix("HEAD ") {
                wt.head = Some(head.to_string());
            } else if let Some(branch) = line.strip_prefix("branch ") {
                wt.branch = Some(
                    branch
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch)
                        .to_string(),
                );
            } else if line == "bare" {
                wt.bare = true;
            } else if line == "detached" {
                wt.detached = true;
            }
        }
    }
    if let Some(wt) = current.take() {
        worktrees.push(wt);
    }
    worktrees
}
