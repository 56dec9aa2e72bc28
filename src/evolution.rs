//! Per-file history of completed task snapshots, persisted as JSON.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A single, language-agnostic description of what changed to a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "change_type", rename_all = "snake_case")]
pub enum SemanticChange {
    Added { symbol_name: String },
    Removed { symbol_name: String },
    Modified { symbol_name: String, description: String },
    Other { description: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub task_intent: String,
    pub semantic_changes: Vec<SemanticChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileEvolution {
    pub snapshots: Vec<TaskSnapshot>,
}

impl FileEvolution {
    /// History relevant to a future merge: only completed snapshots with
    /// non-empty semantic changes count.
    pub fn completed_history(&self) -> Vec<&TaskSnapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.completed_at.is_some() && !s.semantic_changes.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionTracker {
    files: HashMap<String, FileEvolution>,
}

impl EvolutionTracker {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        crate::util::write_json_atomic(path, self)
    }

    pub fn file_mut(&mut self, path: &Path) -> &mut FileEvolution {
        self.files.entry(key(path)).or_default()
    }

    pub fn file(&self, path: &Path) -> Option<&FileEvolution> {
        self.files.get(&key(path))
    }

    /// Record (or update) a task's snapshot for a file from a diff-derived
    /// summary. Starting a snapshot twice for the same task is idempotent.
    pub fn record_task_change(
        &mut self,
        path: &Path,
        task_id: &str,
        task_intent: &str,
        started_at: i64,
        changes: Vec<SemanticChange>,
    ) {
        let evolution = self.file_mut(path);
        if let Some(existing) = evolution.snapshots.iter_mut().find(|s| s.task_id == task_id) {
            existing.semantic_changes = changes;
            existing.task_intent = task_intent.to_string();
        } else {
            evolution.snapshots.push(TaskSnapshot {
                task_id: task_id.to_string(),
                started_at,
                completed_at: None,
                task_intent: task_intent.to_string(),
                semantic_changes: changes,
            });
        }
    }

    /// Mark every snapshot belonging to `task_id` as completed.
    pub fn mark_completed(&mut self, task_id: &str, task_intent: &str, completed_at: i64) {
        for evolution in self.files.values_mut() {
            for snapshot in evolution.snapshots.iter_mut() {
                if snapshot.task_id == task_id {
                    snapshot.completed_at = Some(completed_at);
                    snapshot.task_intent = task_intent.to_string();
                }
            }
        }
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Derive a best-effort `SemanticChange` list from a unified diff-name-status
/// style summary. Per the open question in the design notes, this is
/// diff-sourced rather than parsed by a language-aware tool.
pub fn changes_from_diff_lines(added: &[String], removed: &[String]) -> Vec<SemanticChange> {
    let mut changes = Vec::new();
    for line in added {
        if let Some(symbol) = guess_symbol(line) {
            changes.push(SemanticChange::Added { symbol_name: symbol });
        }
    }
    for line in removed {
        if let Some(symbol) = guess_symbol(line) {
            changes.push(SemanticChange::Removed { symbol_name: symbol });
        }
    }
    if changes.is_empty() && (!added.is_empty() || !removed.is_empty()) {
        changes.push(SemanticChange::Other {
            description: format!("{} lines added, {} removed", added.len(), removed.len()),
        });
    }
    changes
}

/// Best-effort symbol guess from a single changed source line: the first
/// identifier following a common declaration keyword, if any.
fn guess_symbol(line: &str) -> Option<String> {
    const KEYWORDS: &[&str] = &["fn", "struct", "enum", "class", "def", "function", "impl", "trait"];
    let trimmed = line.trim_start();
    let mut words = trimmed.split_whitespace();
    while let Some(word) = words.next() {
        if KEYWORDS.contains(&word) {
            return words
                .next()
                .map(|s| s.trim_end_matches(['(', '{', ':', '<']).to_string())
                .filter(|s| !s.is_empty());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolution.json");
        let mut tracker = EvolutionTracker::default();
        tracker.record_task_change(
            Path::new("src/lib.rs"),
            "task-1",
            "add feature",
            100,
            vec![SemanticChange::Added { symbol_name: "foo".into() }],
        );
        tracker.save(&path).unwrap();

        let loaded = EvolutionTracker::load(&path);
        assert_eq!(loaded.file(Path::new("src/lib.rs")).unwrap().snapshots.len(), 1);
    }

    #[test]
    fn only_completed_with_changes_count_as_history() {
        let mut tracker = EvolutionTracker::default();
        tracker.record_task_change(Path::new("a.rs"), "t1", "intent", 0, vec![]);
        tracker.record_task_change(
            Path::new("a.rs"),
            "t2",
            "intent",
            0,
            vec![SemanticChange::Other { description: "x".into() }],
        );
        tracker.mark_completed("t2", "intent", 10);
        let evo = tracker.file(Path::new("a.rs")).unwrap();
        assert_eq!(evo.completed_history().len(), 1);
        assert_eq!(evo.completed_history()[0].task_id, "t2");
    }

    #[test]
    fn guesses_symbol_from_fn_declaration() {
        let changes = changes_from_diff_lines(&["pub fn do_thing(x: i32) {".to_string()], &[]);
        assert_eq!(
            changes,
            vec![SemanticChange::Added { symbol_name: "do_thing".into() }]
        );
    }
}
