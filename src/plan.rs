//! Permissive decode of `.auto-claude/specs/<spec>/implementation_plan.json`.
//!
//! The core only reads `title`, `description`, and the flattened `files`
//! list across all subtasks; unrecognized fields are ignored, not preserved.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ImplementationPlan {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Phase {
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subtask {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Read as an open string: normalizing unrecognized values is an
    /// external collaborator's job, not the core's.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl ImplementationPlan {
    pub fn load(project_root: &Path, spec: &str) -> Option<Self> {
        let path = project_root
            .join(".auto-claude")
            .join("specs")
            .join(spec)
            .join("implementation_plan.json");
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Every file path named by any subtask, across all phases.
    pub fn all_files(&self) -> std::collections::HashSet<PathBuf> {
        self.phases
            .iter()
            .flat_map(|p| p.subtasks.iter())
            .flat_map(|s| s.files.iter().cloned())
            .collect()
    }
}
