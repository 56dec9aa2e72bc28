//! End-to-end coverage of the merge orchestrator's documented scenarios.

mod common;

use std::path::Path;

use autoclaude_merge::config::CoreConfig;
use autoclaude_merge::lock::MergeLockGuard;
use autoclaude_merge::orchestrator::{MergeOrchestrator, MergeResult};
use autoclaude_merge::worktree_manager::WorktreeManager;
use autoclaude_merge::AiCaller;
use rstest::{fixture, rstest};

use common::TestRepo;

fn numbered_python(lines: usize) -> String {
    (1..=lines).map(|n| format!("x{n} = {n}\n")).collect()
}

/// Every scenario below starts from the same bare repo with one commit;
/// `rstest` injects a fresh instance into each test function by parameter name.
#[fixture]
fn repo() -> TestRepo {
    TestRepo::init()
}

/// S1 — clean merge, no divergence: the spec branch only adds a file.
#[rstest]
fn s1_clean_merge_with_no_divergence(repo: TestRepo) {
    let worktrees = WorktreeManager::new(&repo.repo);
    let info = worktrees.get_or_create_worktree("s1-add-file", "main").unwrap();

    std::fs::write(info.path.join("a.txt"), "hello\n").unwrap();
    repo.commit_all(&info.path, "add a.txt");

    let orchestrator = MergeOrchestrator::new(repo.repo.clone(), CoreConfig::default(), None);
    match orchestrator.merge("s1-add-file", false) {
        MergeResult::Success { stats } => assert_eq!(stats.files_merged, 1),
        MergeResult::Failure { error, .. } => panic!("expected success, got: {error}"),
    }

    assert_eq!(
        std::fs::read_to_string(repo.root().join("a.txt")).unwrap(),
        "hello\n"
    );
    assert!(!repo.root().join(".worktrees/s1-add-file").exists());
}

/// S2 — lock contention: a second merge attempt fails while the lock is held.
#[rstest]
fn s2_lock_contention_blocks_second_merge(repo: TestRepo) {
    let worktrees = WorktreeManager::new(&repo.repo);
    worktrees.get_or_create_worktree("s2-locked", "main").unwrap();

    let _held = MergeLockGuard::acquire(repo.root(), "s2-locked", 300).unwrap();

    let orchestrator = MergeOrchestrator::new(repo.repo.clone(), CoreConfig::default(), None);
    match orchestrator.merge("s2-locked", false) {
        MergeResult::Failure { error, resolved, remaining_conflicts } => {
            assert!(error.contains("held by pid"));
            assert!(resolved.is_empty());
            assert!(remaining_conflicts.is_empty());
        }
        MergeResult::Success { .. } => panic!("expected lock contention to block the merge"),
    }
}

/// S3 — stale lock reclamation: an old lock from a dead pid doesn't block a merge.
#[rstest]
fn s3_stale_lock_is_reclaimed(repo: TestRepo) {
    let worktrees = WorktreeManager::new(&repo.repo);
    let info = worktrees.get_or_create_worktree("s3-stale", "main").unwrap();
    std::fs::write(info.path.join("b.txt"), "new\n").unwrap();
    repo.commit_all(&info.path, "add b.txt");

    let lock_dir = repo.root().join(".auto-claude/.locks");
    std::fs::create_dir_all(&lock_dir).unwrap();
    std::fs::write(
        lock_dir.join("merge-s3-stale.lock"),
        r#"{"spec_name":"s3-stale","timestamp":1,"pid":999999}"#,
    )
    .unwrap();

    let orchestrator = MergeOrchestrator::new(repo.repo.clone(), CoreConfig::default(), None);
    match orchestrator.merge("s3-stale", false) {
        MergeResult::Success { .. } => {}
        MergeResult::Failure { error, .. } => panic!("expected reclamation to succeed, got: {error}"),
    }
}

/// S4 — AI-resolved divergence: both sides edit the same line, the AI caller
/// resolves the single conflicting region.
#[rstest]
fn s4_ai_resolves_single_line_divergence(repo: TestRepo) {
    repo.write("util.py", &numbered_python(30));
    repo.commit_all(repo.root(), "add util.py");

    let worktrees = WorktreeManager::new(&repo.repo);
    let info = worktrees.get_or_create_worktree("s4-divergence", "main").unwrap();

    let mut worktree_lines: Vec<String> = numbered_python(30).lines().map(String::from).collect();
    worktree_lines[14] = "x15 = 888".to_string();
    std::fs::write(info.path.join("util.py"), worktree_lines.join("\n") + "\n").unwrap();
    repo.commit_all(&info.path, "worktree edits line 15");

    let mut main_lines: Vec<String> = numbered_python(30).lines().map(String::from).collect();
    main_lines[14] = "x15 = 999".to_string();
    std::fs::write(repo.root().join("util.py"), main_lines.join("\n") + "\n").unwrap();
    repo.commit_all(repo.root(), "main edits line 15");

    let ai = |_system: &str, _user: &str| -> anyhow::Result<String> {
        Ok("```python\nx15 = 1000\n```".to_string())
    };
    let ai_ref: &dyn AiCaller = &ai;

    let orchestrator = MergeOrchestrator::new(repo.repo.clone(), CoreConfig::default(), Some(ai_ref));
    match orchestrator.merge("s4-divergence", false) {
        MergeResult::Success { stats } => {
            assert_eq!(stats.ai_assisted, 1);
            assert_eq!(stats.files_merged, 1);
        }
        MergeResult::Failure { error, .. } => panic!("expected AI-assisted success, got: {error}"),
    }

    let merged = std::fs::read_to_string(repo.root().join("util.py")).unwrap();
    assert!(merged.contains("x15 = 1000"));
}

/// S5 — AI retry-then-fail: the AI caller never returns usable code, so the
/// conflicting file is reported unresolved while unrelated files still land.
#[rstest]
fn s5_ai_retry_then_fail_leaves_file_unresolved(repo: TestRepo) {
    repo.write("util.py", &numbered_python(30));
    repo.commit_all(repo.root(), "add util.py");

    let worktrees = WorktreeManager::new(&repo.repo);
    let info = worktrees.get_or_create_worktree("s5-unresolved", "main").unwrap();

    let mut worktree_lines: Vec<String> = numbered_python(30).lines().map(String::from).collect();
    worktree_lines[14] = "x15 = 888".to_string();
    std::fs::write(info.path.join("util.py"), worktree_lines.join("\n") + "\n").unwrap();
    std::fs::write(info.path.join("notes.txt"), "unrelated change\n").unwrap();
    repo.commit_all(&info.path, "worktree edits line 15 and adds notes");

    let mut main_lines: Vec<String> = numbered_python(30).lines().map(String::from).collect();
    main_lines[14] = "x15 = 999".to_string();
    std::fs::write(repo.root().join("util.py"), main_lines.join("\n") + "\n").unwrap();
    repo.commit_all(repo.root(), "main edits line 15");

    let ai = |_system: &str, _user: &str| -> anyhow::Result<String> {
        Ok("I cannot resolve this conflict, sorry.".to_string())
    };
    let ai_ref: &dyn AiCaller = &ai;

    let orchestrator = MergeOrchestrator::new(repo.repo.clone(), CoreConfig::default(), Some(ai_ref));
    match orchestrator.merge("s5-unresolved", false) {
        MergeResult::Failure {
            remaining_conflicts,
            ..
        } => {
            assert_eq!(remaining_conflicts.len(), 1);
            assert_eq!(remaining_conflicts[0].file, Path::new("util.py"));
            assert_eq!(remaining_conflicts[0].severity, "high");
        }
        MergeResult::Success { .. } => panic!("expected the conflict to remain unresolved"),
    }

    assert_eq!(
        std::fs::read_to_string(repo.root().join("notes.txt")).unwrap(),
        "unrelated change\n"
    );
}

/// S6 — deletion carried through: the spec branch deletes a file the base
/// branch never touched.
#[rstest]
fn s6_deletion_is_carried_through(repo: TestRepo) {
    repo.write("old.txt", "to be removed\n");
    repo.commit_all(repo.root(), "add old.txt");

    let worktrees = WorktreeManager::new(&repo.repo);
    let info = worktrees.get_or_create_worktree("s6-delete", "main").unwrap();
    std::fs::remove_file(info.path.join("old.txt")).unwrap();
    repo.commit_all(&info.path, "remove old.txt");

    let orchestrator = MergeOrchestrator::new(repo.repo.clone(), CoreConfig::default(), None);
    match orchestrator.merge("s6-delete", false) {
        MergeResult::Success { .. } => {}
        MergeResult::Failure { error, .. } => panic!("expected deletion merge to succeed, got: {error}"),
    }

    assert!(!repo.root().join("old.txt").exists());
}
