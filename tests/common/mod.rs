//! Shared git fixture for integration tests: a throwaway repo on disk with
//! small helpers for committing files and creating worktrees.

use std::path::Path;
use std::process::Command;

use autoclaude_merge::Repository;

pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn init() -> Self {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init", "-q", "-b", "main"]);
        // Configure identity on the repo itself so commits made through
        // `Repository::commit` (which doesn't set env vars) still succeed,
        // independent of the host's global git config.
        run(dir.path(), &["config", "user.name", "test"]);
        run(dir.path(), &["config", "user.email", "test@test.com"]);
        std::fs::write(dir.path().join("README.md"), "init\n").unwrap();
        run(dir.path(), &["add", "."]);
        run(dir.path(), &["commit", "-q", "-m", "init"]);
        let repo = Repository::discover(dir.path()).unwrap();
        Self { dir, repo }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.root().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }

    pub fn commit_all(&self, cwd: &Path, message: &str) {
        run(cwd, &["add", "."]);
        run(cwd, &["commit", "-q", "-m", message]);
    }
}

fn run(cwd: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_AUTHOR_NAME", "test")
        .env("GIT_AUTHOR_EMAIL", "test@test.com")
        .env("GIT_COMMITTER_NAME", "test")
        .env("GIT_COMMITTER_EMAIL", "test@test.com")
        .output()
        .unwrap();
    assert!(
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}
