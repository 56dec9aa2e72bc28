//! Resolve a human-readable task intent string for a spec.
//!
//! Order of preference, grounded in the original implementation's
//! `_get_task_intent`: the implementation plan's title/description, then the
//! first non-empty paragraph of an adjacent `spec.md`, then the bare spec id.

use std::path::Path;

use crate::plan::ImplementationPlan;

pub fn resolve_task_intent(project_root: &Path, spec: &str) -> String {
    if let Some(plan) = ImplementationPlan::load(project_root, spec) {
        match (plan.title, plan.description) {
            (Some(title), Some(desc)) if !desc.trim().is_empty() => {
                return format!("{title}: {desc}");
            }
            (Some(title), _) => return title,
            (None, Some(desc)) if !desc.trim().is_empty() => return desc,
            _ => {}
        }
    }

    let spec_md = project_root
        .join(".auto-claude")
        .join("specs")
        .join(spec)
        .join("spec.md");
    if let Ok(contents) = std::fs::read_to_string(&spec_md) {
        if let Some(paragraph) = first_non_empty_paragraph(&contents) {
            return paragraph;
        }
    }

    spec.to_string()
}

fn first_non_empty_paragraph(markdown: &str) -> Option<String> {
    markdown
        .split("\n\n")
        .map(|p| p.trim())
        .find(|p| !p.is_empty() && !p.starts_with('#'))
        .map(|p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_implementation_plan_title_and_description() {
        let dir = tempfile::tempdir().unwrap();
        let spec_dir = dir.path().join(".auto-claude/specs/001");
        std::fs::create_dir_all(&spec_dir).unwrap();
        std::fs::write(
            spec_dir.join("implementation_plan.json"),
            r#"{"title": "Add login", "description": "Adds OAuth login flow"}"#,
        )
        .unwrap();
        assert_eq!(
            resolve_task_intent(dir.path(), "001"),
            "Add login: Adds OAuth login flow"
        );
    }

    #[test]
    fn falls_back_to_spec_md_paragraph() {
        let dir = tempfile::tempdir().unwrap();
        let spec_dir = dir.path().join(".auto-claude/specs/002");
        std::fs::create_dir_all(&spec_dir).unwrap();
        std::fs::write(
            spec_dir.join("spec.md"),
            "# Title\n\nThis spec adds dark mode support.\n\nMore details follow.",
        )
        .unwrap();
        assert_eq!(
            resolve_task_intent(dir.path(), "002"),
            "This spec adds dark mode support."
        );
    }

    #[test]
    fn falls_back_to_bare_spec_id() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_task_intent(dir.path(), "003-unknown"), "003-unknown");
    }
}
