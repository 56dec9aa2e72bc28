//! Pure decision of whether a task runs in an isolated worktree or directly
//! in the caller's working tree.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceMode {
    Isolated,
    Direct,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspacePolicyInput {
    pub project_has_uncommitted_changes: bool,
    pub force_isolated: bool,
    pub force_direct: bool,
    pub auto_continue: bool,
}

/// Precedence: explicit force flags first, then a dirty tree forces
/// isolation, then `auto_continue` forces isolation, otherwise the caller
/// decides (returns `None`).
pub fn decide(input: WorkspacePolicyInput) -> Option<WorkspaceMode> {
    if input.force_isolated {
        return Some(WorkspaceMode::Isolated);
    }
    if input.force_direct {
        return Some(WorkspaceMode::Direct);
    }
    if input.project_has_uncommitted_changes {
        return Some(WorkspaceMode::Isolated);
    }
    if input.auto_continue {
        return Some(WorkspaceMode::Isolated);
    }
    None
}
