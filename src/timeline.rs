//! Per-task intent, branch point, and file-snapshot tracking, persisted as JSON.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::evolution::{EvolutionTracker, SemanticChange};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTimeline {
    pub task_id: String,
    pub task_title: String,
    pub task_intent: String,
    pub branch_point_commit: String,
    pub files_to_modify: HashSet<PathBuf>,
    /// path -> content hash captured just before merge
    pub per_file_snapshots: HashMap<String, String>,
    pub merged_at_commit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineTracker {
    tasks: HashMap<String, TaskTimeline>,
}

/// Historical evidence bundled for an AI merge prompt.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub main_evolution: Vec<SemanticChange>,
    pub total_commits_behind: usize,
    pub pending_tasks: Vec<String>,
    pub total_pending_tasks: usize,
}

impl TimelineTracker {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        crate::util::write_json_atomic(path, self)
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskTimeline> {
        self.tasks.get(task_id)
    }

    pub fn on_task_start(
        &mut self,
        task_id: &str,
        task_title: &str,
        task_intent: &str,
        branch_point_commit: &str,
        files_to_modify: HashSet<PathBuf>,
    ) {
        self.tasks.insert(
            task_id.to_string(),
            TaskTimeline {
                task_id: task_id.to_string(),
                task_title: task_title.to_string(),
                task_intent: task_intent.to_string(),
                branch_point_commit: branch_point_commit.to_string(),
                files_to_modify,
                per_file_snapshots: HashMap::new(),
                merged_at_commit: None,
            },
        );
    }

    /// Snapshot file contents from the worktree just before merge. Hashes the
    /// content rather than storing it verbatim, since the tracker only needs
    /// to know *that* a file changed, not its full history here — the full
    /// history lives in [`EvolutionTracker`].
    pub fn capture_worktree_state(&mut self, task_id: &str, worktree_path: &Path) -> std::io::Result<()> {
        let Some(timeline) = self.tasks.get_mut(task_id) else {
            return Ok(());
        };
        for file in timeline.files_to_modify.clone() {
            let full_path = worktree_path.join(&file);
            let hash = match std::fs::read(&full_path) {
                Ok(bytes) => hex_sha256(&bytes),
                Err(_) => "deleted".to_string(),
            };
            timeline
                .per_file_snapshots
                .insert(file.to_string_lossy().replace('\\', "/"), hash);
        }
        Ok(())
    }

    pub fn on_task_merged(&mut self, task_id: &str, merge_commit: &str) {
        if let Some(timeline) = self.tasks.get_mut(task_id) {
            timeline.merged_at_commit = Some(merge_commit.to_string());
        }
    }

    pub fn is_merged(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .map(|t| t.merged_at_commit.is_some())
            .unwrap_or(false)
    }

    /// Other in-flight (not-yet-merged) tasks that also plan to touch `file_path`.
    pub fn pending_tasks_touching(&self, task_id: &str, file_path: &Path) -> Vec<String> {
        let key = file_path.to_string_lossy().replace('\\', "/");
        self.tasks
            .values()
            .filter(|t| t.task_id != task_id && t.merged_at_commit.is_none())
            .filter(|t| {
                t.files_to_modify
                    .iter()
                    .any(|f| f.to_string_lossy().replace('\\', "/") == key)
            })
            .map(|t| t.task_id.clone())
            .collect()
    }

    /// Build the evidence bundle passed into the AI merge prompt for one file.
    pub fn get_merge_context(
        &self,
        task_id: &str,
        file_path: &Path,
        evolution: &EvolutionTracker,
        commits_behind: usize,
    ) -> MergeContext {
        let main_evolution = evolution
            .file(file_path)
            .map(|evo| {
                evo.completed_history()
                    .into_iter()
                    .flat_map(|s| s.semantic_changes.clone())
                    .collect()
            })
            .unwrap_or_default();
        let pending_tasks = self.pending_tasks_touching(task_id, file_path);
        MergeContext {
            main_evolution,
            total_commits_behind: commits_behind,
            total_pending_tasks: pending_tasks.len(),
            pending_tasks,
        }
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Minimal hex encoding so we don't pull in the `hex` crate for one call site.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
