//! Error types for the merge engine.

use std::path::PathBuf;

/// Error kinds surfaced by the merge subsystem.
///
/// Variants map to the error taxonomy the orchestrator reports: some (like
/// [`CoreError::NoBuild`] and [`CoreError::LockHeld`]) are returned directly to
/// callers, others are collected per-file into `remaining_conflicts` instead of
/// aborting a whole merge.
#[derive(Debug)]
pub enum CoreError {
    /// No worktree exists for the requested spec.
    NoBuild { spec: String },
    /// A valid merge lock is held by another live process.
    LockHeld { spec: String, holder_pid: i32 },
    /// A VCS subprocess failed in an unrecoverable way.
    VcsFailure(String),
    /// File could not be merged because it's binary.
    BinarySkipped { path: PathBuf },
    /// File exceeds the line-count guard on one or both sides.
    OversizeSkipped { path: PathBuf },
    /// The AI merge engine could not produce valid output after a retry.
    AiResolveFailed { path: PathBuf, reason: String },
    /// Reading or writing a tracker JSON file failed. Never fatal to a merge.
    TrackerIoError(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::NoBuild { spec } => write!(f, "no worktree exists for spec '{spec}'"),
            CoreError::LockHeld { spec, holder_pid } => {
                write!(f, "merge lock for '{spec}' is held by pid {holder_pid}")
            }
            CoreError::VcsFailure(msg) => write!(f, "vcs operation failed: {msg}"),
            CoreError::BinarySkipped { path } => {
                write!(f, "skipped binary file: {}", path.display())
            }
            CoreError::OversizeSkipped { path } => {
                write!(f, "skipped oversize file: {}", path.display())
            }
            CoreError::AiResolveFailed { path, reason } => {
                write!(f, "AI could not resolve {}: {reason}", path.display())
            }
            CoreError::TrackerIoError(msg) => write!(f, "tracker I/O error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::TrackerIoError(e.to_string())
    }
}
