//! Owns `.worktrees/<spec>` directories and `auto-claude/<spec>` branches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::vcs::Repository;

fn branch_name(spec: &str) -> String {
    format!("auto-claude/{spec}")
}

fn worktree_path(project_root: &Path, spec: &str) -> PathBuf {
    project_root.join(".worktrees").join(spec)
}

fn registry_path(project_root: &Path) -> PathBuf {
    project_root.join(".auto-claude").join("worktrees.json")
}

/// Everything the rest of the crate needs to know about one spec's worktree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub spec_name: String,
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
}

/// On-disk record of the base branch each worktree was created from, so a
/// later lookup reports the branch the spec actually started on rather than
/// whatever happens to be checked out in the main worktree at lookup time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorktreeRegistry {
    entries: HashMap<String, WorktreeInfo>,
}

impl WorktreeRegistry {
    fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save(&self, path: &Path) -> std::io::Result<()> {
        crate::util::write_json_atomic(path, self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeSummary {
    pub new_files: Vec<PathBuf>,
    pub modified_files: Vec<PathBuf>,
    pub deleted_files: Vec<PathBuf>,
}

pub struct WorktreeManager<'a> {
    repo: &'a Repository,
    project_root: PathBuf,
}

impl<'a> WorktreeManager<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            project_root: repo.root().to_path_buf(),
        }
    }

    /// Idempotent: returns the existing worktree if one is already registered
    /// for `spec`, otherwise creates a new branch from `base_branch` and a
    /// worktree at `.worktrees/<spec>`.
    pub fn get_or_create_worktree(&self, spec: &str, base_branch: &str) -> anyhow::Result<WorktreeInfo> {
        if let Some(existing) = self.get_worktree_info(spec)? {
            return Ok(existing);
        }

        let branch = branch_name(spec);
        let path = worktree_path(&self.project_root, spec);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.repo.add_worktree(&path, &branch, base_branch)?;

        let info = WorktreeInfo {
            spec_name: spec.to_string(),
            path,
            branch,
            base_branch: base_branch.to_string(),
        };

        let mut registry = WorktreeRegistry::load(&registry_path(&self.project_root));
        registry.entries.insert(spec.to_string(), info.clone());
        if let Err(e) = registry.save(&registry_path(&self.project_root)) {
            log::warn!("failed to persist worktree record for '{spec}': {e}");
        }

        Ok(info)
    }

    /// Look up a spec's worktree, resolving the linked-worktree `gitdir:`
    /// indirection transparently via `git worktree list`.
    ///
    /// `base_branch` is read back from the on-disk registry written at
    /// creation time, not recomputed from whatever is currently checked out
    /// in the main worktree — the base branch is the branch the spec started
    /// on, not the branch the user happens to be on later.
    pub fn get_worktree_info(&self, spec: &str) -> anyhow::Result<Option<WorktreeInfo>> {
        let branch = branch_name(spec);
        let worktrees = self.repo.list_worktrees()?;
        let Some(wt) = worktrees
            .into_iter()
            .find(|wt| wt.branch.as_deref() == Some(branch.as_str()) && !wt.bare)
        else {
            return Ok(None);
        };

        let registry = WorktreeRegistry::load(&registry_path(&self.project_root));
        let base_branch = match registry.entries.get(spec) {
            Some(info) => info.base_branch.clone(),
            None => self.current_base_branch()?,
        };

        Ok(Some(WorktreeInfo {
            spec_name: spec.to_string(),
            path: wt.path,
            branch,
            base_branch,
        }))
    }

    pub fn list_all_worktrees(&self) -> anyhow::Result<Vec<WorktreeInfo>> {
        let registry = WorktreeRegistry::load(&registry_path(&self.project_root));
        let fallback_base_branch = self.current_base_branch()?;
        Ok(self
            .repo
            .list_worktrees()?
            .into_iter()
            .filter(|wt| !wt.bare)
            .filter_map(|wt| {
                let branch = wt.branch?;
                let spec = branch.strip_prefix("auto-claude/")?.to_string();
                let base_branch = registry
                    .entries
                    .get(&spec)
                    .map(|info| info.base_branch.clone())
                    .unwrap_or_else(|| fallback_base_branch.clone());
                Some(WorktreeInfo {
                    spec_name: spec,
                    path: wt.path,
                    branch,
                    base_branch,
                })
            })
            .collect())
    }

    pub fn get_changed_files(&self, spec: &str) -> anyhow::Result<Vec<(char, PathBuf)>> {
        let info = self.require_worktree(spec)?;
        self.repo.diff_name_status(&info.base_branch, &info.branch)
    }

    pub fn get_change_summary(&self, spec: &str) -> anyhow::Result<ChangeSummary> {
        let mut summary = ChangeSummary::default();
        for (status, path) in self.get_changed_files(spec)? {
            match status {
                'A' => summary.new_files.push(path),
                'D' => summary.deleted_files.push(path),
                _ => summary.modified_files.push(path),
            }
        }
        Ok(summary)
    }

    /// Merge the spec branch into the base branch in the main checkout.
    ///
    /// Returns `true` iff the merge completed with no unresolved conflicts.
    /// On success with `delete_after`, removes the worktree and branch.
    pub fn merge_worktree(&self, spec: &str, delete_after: bool, no_commit: bool) -> anyhow::Result<bool> {
        let info = self.require_worktree(spec)?;
        let mut args = vec!["merge", "--no-ff"];
        if no_commit {
            args.push("--no-commit");
        }
        args.push(&info.branch);
        let clean = self.repo.run_command_check(&args)?;
        if !clean {
            // Leave the conflicted merge state for the caller to inspect; never
            // force-abort work the user might want to see.
            return Ok(false);
        }
        if delete_after {
            self.remove_worktree(spec, true)?;
        }
        Ok(true)
    }

    pub fn remove_worktree(&self, spec: &str, delete_branch: bool) -> anyhow::Result<()> {
        let Some(info) = self.get_worktree_info(spec)? else {
            return Ok(());
        };
        if let Err(e) = self.repo.remove_worktree(&info.path, true) {
            log::warn!("failed to remove worktree for '{spec}': {e}");
        }
        self.repo.prune_worktrees().ok();
        if delete_branch {
            if let Err(e) = self.repo.delete_branch(&info.branch, true) {
                log::warn!("failed to delete branch '{}': {e}", info.branch);
            }
        }

        let mut registry = WorktreeRegistry::load(&registry_path(&self.project_root));
        if registry.entries.remove(spec).is_some() {
            if let Err(e) = registry.save(&registry_path(&self.project_root)) {
                log::warn!("failed to update worktree registry after removing '{spec}': {e}");
            }
        }
        Ok(())
    }

    /// Remove every `.worktrees/<spec>` entry and its branch. Best-effort per
    /// spec; one failure does not stop the sweep.
    pub fn cleanup_all(&self) -> anyhow::Result<Vec<String>> {
        let mut removed = Vec::new();
        for info in self.list_all_worktrees()? {
            match self.remove_worktree(&info.spec_name, true) {
                Ok(()) => removed.push(info.spec_name),
                Err(e) => log::warn!("cleanup failed for '{}': {e}", info.spec_name),
            }
        }
        Ok(removed)
    }

    fn require_worktree(&self, spec: &str) -> anyhow::Result<WorktreeInfo> {
        self.get_worktree_info(spec)?
            .ok_or_else(|| crate::error::CoreError::NoBuild { spec: spec.to_string() }.into())
    }

    fn current_base_branch(&self) -> anyhow::Result<String> {
        Ok(self
            .repo
            .current_branch()?
            .unwrap_or_else(|| "HEAD".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .env("GIT_AUTHOR_NAME", "test")
                .env("GIT_AUTHOR_EMAIL", "test@test.com")
                .env("GIT_COMMITTER_NAME", "test")
                .env("GIT_COMMITTER_EMAIL", "test@test.com")
                .output()
                .unwrap();
        };
        run(&["init", "-q", "-b", "main"]);
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);
        let repo = Repository::discover(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (_dir, repo) = init_repo();
        let mgr = WorktreeManager::new(&repo);
        let first = mgr.get_or_create_worktree("001-feature", "main").unwrap();
        let second = mgr.get_or_create_worktree("001-feature", "main").unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(first.branch, "auto-claude/001-feature");
    }

    #[test]
    fn base_branch_survives_a_later_checkout_on_the_main_worktree() {
        let (dir, repo) = init_repo();
        Command::new("git")
            .args(["checkout", "-q", "-b", "release"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["checkout", "-q", "main"])
            .current_dir(dir.path())
            .output()
            .unwrap();

        let mgr = WorktreeManager::new(&repo);
        let created = mgr.get_or_create_worktree("001-feature", "main").unwrap();
        assert_eq!(created.base_branch, "main");

        // Simulate the user switching branches on the main checkout between
        // worktree creation and a later lookup.
        Command::new("git")
            .args(["checkout", "-q", "release"])
            .current_dir(dir.path())
            .output()
            .unwrap();

        let looked_up = mgr.get_worktree_info("001-feature").unwrap().unwrap();
        assert_eq!(looked_up.base_branch, "main");

        let listed = mgr.list_all_worktrees().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].base_branch, "main");
    }

    #[test]
    fn missing_worktree_returns_none() {
        let (_dir, repo) = init_repo();
        let mgr = WorktreeManager::new(&repo);
        assert!(mgr.get_worktree_info("missing-spec").unwrap().is_none());
    }

    #[test]
    fn change_summary_reports_new_file() {
        let (dir, repo) = init_repo();
        let mgr = WorktreeManager::new(&repo);
        let info = mgr.get_or_create_worktree("001-feature", "main").unwrap();
        std::fs::write(info.path.join("b.txt"), "new\n").unwrap();
        Command::new("git")
            .args(["add", "."])
            .current_dir(&info.path)
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-q", "-m", "add b"])
            .current_dir(&info.path)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@test.com")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@test.com")
            .output()
            .unwrap();
        let _ = dir;
        let summary = mgr.get_change_summary("001-feature").unwrap();
        assert_eq!(summary.new_files, vec![PathBuf::from("b.txt")]);
    }
}
