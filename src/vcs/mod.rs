//! Thin typed adapter over the underlying version-control tool.
//!
//! Every subprocess call funnels through [`Repository::run_command`] (or one
//! of its siblings) so logging and error formatting stay in one place. The
//! rest of the crate never shells out to `git` directly.

mod worktree;

pub use worktree::{VcsWorktree, WorktreeList};

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, bail};
use dashmap::DashMap;

/// Shared, cheaply-cloned handle to a repository.
///
/// The merge-base cache is shared across clones so repeated lookups for the
/// same (a, b) pair within one orchestrator run don't re-invoke git.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
    cache: Arc<RepoCache>,
}

#[derive(Debug, Default)]
struct RepoCache {
    merge_base: DashMap<(String, String), Option<String>>,
}

impl Repository {
    /// Discover the repository containing `path` (or any path within it).
    pub fn discover(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let discovery_path = path.into();
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(&discovery_path)
            .output()
            .with_context(|| format!("failed to execute git in {}", discovery_path.display()))?;
        if !output.status.success() {
            bail!(
                "not a git repository: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        Ok(Self {
            root,
            cache: Arc::new(RepoCache::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a git command rooted at `cwd` (defaults to the repo root) and return stdout.
    ///
    /// Bails with combined stderr+stdout on non-zero exit, matching the
    /// single-choke-point pattern used throughout this adapter.
    pub fn run_command_in(&self, cwd: &Path, args: &[&str]) -> anyhow::Result<String> {
        log::debug!("$ git {} [{}]", args.join(" "), cwd.display());
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .with_context(|| format!("failed to execute: git {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let msg = [stderr.trim(), stdout.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            bail!("{}", msg);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn run_command(&self, args: &[&str]) -> anyhow::Result<String> {
        self.run_command_in(&self.root, args)
    }

    pub fn run_command_check(&self, args: &[&str]) -> anyhow::Result<bool> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("failed to execute: git {}", args.join(" ")))?;
        Ok(output.status.success())
    }

    /// Raw output, for commands whose exit code carries meaning beyond success/failure
    /// (e.g. `merge-tree`, which uses exit 1 for "conflicts found").
    pub fn run_command_output(&self, args: &[&str]) -> anyhow::Result<std::process::Output> {
        log::debug!("$ git {} [{}]", args.join(" "), self.root.display());
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("failed to execute: git {}", args.join(" ")))
    }

    pub fn current_branch(&self) -> anyhow::Result<Option<String>> {
        let out = self.run_command(&["symbolic-ref", "--short", "-q", "HEAD"])?;
        let branch = out.trim();
        Ok(if branch.is_empty() {
            None
        } else {
            Some(branch.to_string())
        })
    }

    pub fn head_commit(&self) -> anyhow::Result<String> {
        Ok(self.run_command(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    pub fn rev_parse(&self, rev: &str) -> anyhow::Result<String> {
        Ok(self.run_command(&["rev-parse", rev])?.trim().to_string())
    }

    pub fn branch_exists(&self, branch: &str) -> anyhow::Result<bool> {
        self.run_command_check(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])
    }

    /// Merge base of two revisions, cached per repository handle.
    pub fn merge_base(&self, a: &str, b: &str) -> anyhow::Result<Option<String>> {
        let key = (a.to_string(), b.to_string());
        if let Some(hit) = self.cache.merge_base.get(&key) {
            return Ok(hit.clone());
        }
        let output = self.run_command_output(&["merge-base", a, b])?;
        let result = if output.status.success() {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            None
        };
        self.cache.merge_base.insert(key, result.clone());
        Ok(result)
    }

    /// Read a blob at `<rev>:<path>`, or `None` if the path doesn't exist at that rev.
    pub fn show_blob(&self, rev: &str, path: &Path) -> anyhow::Result<Option<String>> {
        let spec = format!("{rev}:{}", path_arg(path));
        let output = self.run_command_output(&["show", &spec])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(None)
        }
    }

    /// Count of commits reachable from `to` but not `from` (`git rev-list --count from..to`).
    pub fn rev_list_count(&self, from: &str, to: &str) -> anyhow::Result<usize> {
        let out = self.run_command(&["rev-list", "--count", &format!("{from}..{to}")])?;
        Ok(out.trim().parse().unwrap_or(0))
    }

    /// `git diff --name-status base...branch`.
    pub fn diff_name_status(&self, base: &str, branch: &str) -> anyhow::Result<Vec<(char, PathBuf)>> {
        let spec = format!("{base}...{branch}");
        let out = self.run_command(&["diff", "--name-status", &spec])?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(2, '\t');
                let status = parts.next()?.chars().next()?;
                let path = parts.next()?;
                Some((status, PathBuf::from(path)))
            })
            .collect())
    }

    /// Non-destructive three-way merge-tree check. Never touches the index or working tree.
    ///
    /// Returns `Ok(None)` if the merge is clean, `Ok(Some(raw_output))` if it
    /// reports conflicts.
    pub fn merge_tree_check(&self, base: &str, ours: &str, theirs: &str) -> anyhow::Result<Option<String>> {
        let output = self.run_command_output(&[
            "merge-tree",
            "--write-tree",
            "--no-messages",
            &format!("--merge-base={base}"),
            ours,
            theirs,
        ])?;
        if output.status.success() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        }
    }

    /// Three-way merge of file contents via `git merge-file -p`, returning the
    /// marker-bearing result without touching any tracked file.
    pub fn merge_file_text(&self, ours: &str, base: &str, theirs: &str) -> anyhow::Result<(String, bool)> {
        merge_file_text_standalone(ours, base, theirs)
    }

    pub fn stage(&self, path: &Path) -> anyhow::Result<()> {
        self.run_command(&["add", "--", &path_arg(path)])?;
        Ok(())
    }

    pub fn stage_removal(&self, path: &Path) -> anyhow::Result<()> {
        self.run_command(&["rm", "--cached", "--ignore-unmatch", "--", &path_arg(path)])?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> anyhow::Result<()> {
        self.run_command(&["commit", "-m", message])?;
        Ok(())
    }

    pub fn list_worktrees(&self) -> anyhow::Result<Vec<VcsWorktree>> {
        let stdout = self.run_command(&["worktree", "list", "--porcelain"])?;
        Ok(worktree::parse_porcelain_list(&stdout))
    }

    pub fn add_worktree(&self, path: &Path, branch: &str, base: &str) -> anyhow::Result<()> {
        self.run_command(&[
            "worktree",
            "add",
            "-b",
            branch,
            &path_arg(path),
            base,
        ])?;
        Ok(())
    }

    pub fn remove_worktree(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        let path_str = path_arg(path);
        args.push(&path_str);
        self.run_command(&args)?;
        Ok(())
    }

    pub fn delete_branch(&self, branch: &str, force: bool) -> anyhow::Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_command(&["branch", flag, branch])?;
        Ok(())
    }

    pub fn prune_worktrees(&self) -> anyhow::Result<()> {
        self.run_command(&["worktree", "prune"])?;
        Ok(())
    }

    pub fn is_working_tree_dirty(&self) -> anyhow::Result<bool> {
        Ok(!self.run_command_check(&["diff", "--quiet", "--exit-code"])?
            || !self.run_command_check(&["diff", "--quiet", "--cached", "--exit-code"])?)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Three-way merge of file contents via `git merge-file -p`. Plumbing-level:
/// works without a surrounding repository, so the merge engine can call this
/// directly without discovering one.
pub fn merge_file_text_standalone(ours: &str, base: &str, theirs: &str) -> anyhow::Result<(String, bool)> {
    let dir = tempfile::tempdir().context("creating scratch dir for merge-file")?;
    let ours_path = dir.path().join("ours");
    let base_path = dir.path().join("base");
    let theirs_path = dir.path().join("theirs");
    std::fs::write(&ours_path, ours)?;
    std::fs::write(&base_path, base)?;
    std::fs::write(&theirs_path, theirs)?;

    let output = Command::new("git")
        .args(["merge-file", "-p", "-L", "ours", "-L", "base", "-L", "theirs"])
        .arg(&ours_path)
        .arg(&base_path)
        .arg(&theirs_path)
        .output()
        .context("failed to execute: git merge-file")?;

    let merged = String::from_utf8_lossy(&output.stdout).into_owned();
    // Exit code 0 = clean merge, >0 = number of conflicts, <0 = error.
    let had_conflicts = output.status.code().is_some_and(|c| c > 0);
    Ok((merged, had_conflicts))
}
