//! Top-level merge algorithm: acquire lock, detect conflicts, resolve per
//! file, fall back to a plain VCS merge when clean, record completion.

use std::path::{Path, PathBuf};

use crate::ai::AiCaller;
use crate::conflict::ConflictClassifier;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::evolution::EvolutionTracker;
use crate::lock::MergeLockGuard;
use crate::merge_engine::{MergeEngine, MergeOutcome};
use crate::timeline::TimelineTracker;
use crate::vcs::Repository;
use crate::worktree_manager::WorktreeManager;

#[derive(Debug, Clone)]
pub struct RemainingConflict {
    pub file: PathBuf,
    pub reason: String,
    pub severity: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct MergeStats {
    pub files_merged: usize,
    pub ai_assisted: usize,
}

#[derive(Debug, Clone)]
pub enum MergeResult {
    Success { stats: MergeStats },
    Failure {
        error: String,
        resolved: Vec<PathBuf>,
        remaining_conflicts: Vec<RemainingConflict>,
    },
}

fn evolution_path(project_root: &Path) -> PathBuf {
    project_root.join(".auto-claude").join("evolution.json")
}

fn timeline_path(project_root: &Path) -> PathBuf {
    project_root.join(".auto-claude").join("timeline.json")
}

pub struct MergeOrchestrator<'a> {
    repo: Repository,
    config: CoreConfig,
    ai: Option<&'a dyn AiCaller>,
}

impl<'a> MergeOrchestrator<'a> {
    pub fn new(repo: Repository, config: CoreConfig, ai: Option<&'a dyn AiCaller>) -> Self {
        Self { repo, config, ai }
    }

    pub fn merge(&self, spec: &str, no_commit: bool) -> MergeResult {
        let project_root = self.repo.root().to_path_buf();
        let worktrees = WorktreeManager::new(&self.repo);

        let Some(info) = worktrees.get_worktree_info(spec).unwrap_or(None) else {
            return MergeResult::Failure {
                error: CoreError::NoBuild { spec: spec.to_string() }.to_string(),
                resolved: Vec::new(),
                remaining_conflicts: Vec::new(),
            };
        };

        let _lock = match MergeLockGuard::acquire(&project_root, spec, self.config.stale_lock_secs) {
            Ok(guard) => guard,
            Err(e) => {
                return MergeResult::Failure {
                    error: e.to_string(),
                    resolved: Vec::new(),
                    remaining_conflicts: Vec::new(),
                };
            }
        };

        let task_intent = crate::intent::resolve_task_intent(&project_root, spec);

        let mut timeline = TimelineTracker::load(&timeline_path(&project_root));
        if timeline.task(spec).is_none() {
            let plan = crate::plan::ImplementationPlan::load(&project_root, spec);
            let files = plan.as_ref().map(|p| p.all_files()).unwrap_or_default();
            let title = plan
                .as_ref()
                .and_then(|p| p.title.clone())
                .unwrap_or_else(|| spec.to_string());
            let branch_point = self
                .repo
                .merge_base(&info.base_branch, &info.branch)
                .ok()
                .flatten()
                .unwrap_or_default();
            timeline.on_task_start(spec, &title, &task_intent, &branch_point, files);
        }
        if let Err(e) = timeline.capture_worktree_state(spec, &info.path) {
            log::warn!("timeline capture failed (non-fatal): {e}");
        }
        if let Err(e) = timeline.save(&timeline_path(&project_root)) {
            log::warn!("timeline save failed (non-fatal): {e}");
        }

        let mut evolution = EvolutionTracker::load(&evolution_path(&project_root));
        self.refresh_evolution(&mut evolution, &info, spec, &task_intent);
        if let Err(e) = evolution.save(&evolution_path(&project_root)) {
            log::warn!("evolution save failed (non-fatal): {e}");
        }

        let classifier = ConflictClassifier::new(&self.repo);
        let conflicts = match classifier.check_git_conflicts(&info) {
            Ok(c) => c,
            Err(e) => {
                return MergeResult::Failure {
                    error: CoreError::VcsFailure(e.to_string()).to_string(),
                    resolved: Vec::new(),
                    remaining_conflicts: Vec::new(),
                };
            }
        };

        if conflicts.is_empty() {
            return self.merge_clean(&worktrees, spec, no_commit, &mut evolution, &mut timeline, &project_root);
        }

        self.resolve_conflicts(
            spec,
            &info,
            conflicts,
            no_commit,
            &mut evolution,
            &mut timeline,
            &project_root,
        )
    }

    fn merge_clean(
        &self,
        worktrees: &WorktreeManager<'_>,
        spec: &str,
        no_commit: bool,
        evolution: &mut EvolutionTracker,
        timeline: &mut TimelineTracker,
        project_root: &Path,
    ) -> MergeResult {
        let changed_count = worktrees.get_changed_files(spec).map(|v| v.len()).unwrap_or(0);
        match worktrees.merge_worktree(spec, true, no_commit) {
            Ok(true) => {
                self.record_completion(spec, evolution, timeline, project_root);
                MergeResult::Success {
                    stats: MergeStats {
                        files_merged: changed_count,
                        ai_assisted: 0,
                    },
                }
            }
            Ok(false) => MergeResult::Failure {
                error: "merge produced conflicts the VCS could not auto-resolve".to_string(),
                resolved: Vec::new(),
                remaining_conflicts: Vec::new(),
            },
            Err(e) => MergeResult::Failure {
                error: CoreError::VcsFailure(e.to_string()).to_string(),
                resolved: Vec::new(),
                remaining_conflicts: Vec::new(),
            },
        }
    }

    fn resolve_conflicts(
        &self,
        spec: &str,
        info: &crate::worktree_manager::WorktreeInfo,
        conflicts: Vec<crate::conflict::Conflict>,
        no_commit: bool,
        evolution: &mut EvolutionTracker,
        timeline: &mut TimelineTracker,
        project_root: &Path,
    ) -> MergeResult {
        let engine = MergeEngine::new(&self.config, self.ai);
        let mut resolved = Vec::new();
        let mut remaining = Vec::new();
        let mut ai_assisted = 0usize;

        for conflict in &conflicts {
            let main_content = self.repo.show_blob(&info.base_branch, &conflict.file).unwrap_or(None);
            let worktree_content = self.repo.show_blob(&info.branch, &conflict.file).unwrap_or(None);

            match (main_content, worktree_content) {
                (_, None) => {
                    // Deleted on the worktree branch: carry the deletion through.
                    let full_path = self.repo.root().join(&conflict.file);
                    let _ = std::fs::remove_file(&full_path);
                    if self.repo.stage_removal(&conflict.file).is_ok() {
                        resolved.push(conflict.file.clone());
                    } else {
                        remaining.push(RemainingConflict {
                            file: conflict.file.clone(),
                            reason: "failed to stage deletion".to_string(),
                            severity: "high",
                        });
                    }
                }
                (None, Some(worktree_content)) => {
                    // New file on the worktree branch.
                    if self.write_and_stage(&conflict.file, &worktree_content).is_ok() {
                        resolved.push(conflict.file.clone());
                    } else {
                        remaining.push(RemainingConflict {
                            file: conflict.file.clone(),
                            reason: "failed to write new file".to_string(),
                            severity: "high",
                        });
                    }
                }
                (Some(main_content), Some(worktree_content)) => {
                    let base_content = self
                        .repo
                        .merge_base(&info.base_branch, &info.branch)
                        .ok()
                        .flatten()
                        .and_then(|base| self.repo.show_blob(&base, &conflict.file).ok().flatten());

                    let commits_behind = base_content_rev(&self.repo, info)
                        .and_then(|base| self.repo.rev_list_count(&base, &info.base_branch).ok())
                        .unwrap_or(0);

                    let task_intent = crate::intent::resolve_task_intent(project_root, spec);
                    let context = timeline.get_merge_context(spec, &conflict.file, evolution, commits_behind);

                    match engine.merge_file(
                        &conflict.file,
                        base_content.as_deref(),
                        &main_content,
                        &worktree_content,
                        &task_intent,
                        &context,
                    ) {
                        MergeOutcome::Merged { content, ai_assisted: was_ai } => {
                            if was_ai {
                                ai_assisted += 1;
                            }
                            if self.write_and_stage(&conflict.file, &content).is_ok() {
                                resolved.push(conflict.file.clone());
                            } else {
                                remaining.push(RemainingConflict {
                                    file: conflict.file.clone(),
                                    reason: "failed to write merged content".to_string(),
                                    severity: "high",
                                });
                            }
                        }
                        MergeOutcome::Unresolved { reason } => {
                            remaining.push(RemainingConflict {
                                file: conflict.file.clone(),
                                reason,
                                severity: "high",
                            });
                        }
                    }
                }
            }
        }

        // Non-conflicting files still touched by the branch must be carried through.
        if let Ok(all_changed) = self.repo.diff_name_status(&info.base_branch, &info.branch) {
            let conflicting: std::collections::HashSet<_> = conflicts.iter().map(|c| c.file.clone()).collect();
            for (status, path) in all_changed {
                if conflicting.contains(&path) {
                    continue;
                }
                match status {
                    'D' => {
                        let full_path = self.repo.root().join(&path);
                        let _ = std::fs::remove_file(&full_path);
                        let _ = self.repo.stage_removal(&path);
                    }
                    _ => {
                        if let Ok(Some(content)) = self.repo.show_blob(&info.branch, &path) {
                            let _ = self.write_and_stage(&path, &content);
                        }
                    }
                }
            }
        }

        if !remaining.is_empty() {
            return MergeResult::Failure {
                error: "one or more files could not be merged".to_string(),
                resolved,
                remaining_conflicts: remaining,
            };
        }

        if !no_commit {
            if let Err(e) = self
                .repo
                .commit(&format!("Merge {} via auto-claude", info.branch))
            {
                return MergeResult::Failure {
                    error: CoreError::VcsFailure(e.to_string()).to_string(),
                    resolved,
                    remaining_conflicts: Vec::new(),
                };
            }
        }

        self.record_completion(spec, evolution, timeline, project_root);
        MergeResult::Success {
            stats: MergeStats {
                files_merged: resolved.len(),
                ai_assisted,
            },
        }
    }

    fn write_and_stage(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        let full_path = self.repo.root().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, content)?;
        self.repo.stage(path)?;
        Ok(())
    }

    fn refresh_evolution(
        &self,
        evolution: &mut EvolutionTracker,
        info: &crate::worktree_manager::WorktreeInfo,
        spec: &str,
        task_intent: &str,
    ) {
        let Ok(changed) = self.repo.diff_name_status(&info.base_branch, &info.branch) else {
            return;
        };
        let now = now_secs();
        for (status, path) in changed {
            let changes = match status {
                'A' => crate::evolution::changes_from_diff_lines(&[format!("added {}", path.display())], &[]),
                'D' => crate::evolution::changes_from_diff_lines(&[], &[format!("removed {}", path.display())]),
                _ => crate::evolution::changes_from_diff_lines(&[format!("modified {}", path.display())], &[]),
            };
            evolution.record_task_change(&path, spec, task_intent, now, changes);
        }
    }

    fn record_completion(
        &self,
        spec: &str,
        evolution: &mut EvolutionTracker,
        timeline: &mut TimelineTracker,
        project_root: &Path,
    ) {
        let now = now_secs();
        let task_intent = crate::intent::resolve_task_intent(project_root, spec);
        evolution.mark_completed(spec, &task_intent, now);
        if let Err(e) = evolution.save(&evolution_path(project_root)) {
            log::warn!("evolution save failed (non-fatal): {e}");
        }

        let merge_commit = self.repo.head_commit().unwrap_or_default();
        timeline.on_task_merged(spec, &merge_commit);
        if let Err(e) = timeline.save(&timeline_path(project_root)) {
            log::warn!("timeline save failed (non-fatal): {e}");
        }
    }
}

fn base_content_rev(repo: &Repository, info: &crate::worktree_manager::WorktreeInfo) -> Option<String> {
    repo.merge_base(&info.base_branch, &info.branch).ok().flatten()
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
