//! AI-assisted file merge: conflict-region-only and full-file strategies,
//! with a heuristic fallback when no AI caller is configured.

use std::path::Path;
use std::time::Duration;

use crate::ai::{AiCaller, extract_code_block, prompts};
use crate::config::CoreConfig;
use crate::timeline::MergeContext;
use crate::util::line_count;
use crate::validate::{ValidationResult, infer_language, validate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { content: String, ai_assisted: bool },
    Unresolved { reason: String },
}

/// One region of a three-way-merged file where `ours` and `theirs` diverge
/// from `base`. Delimited by standard conflict markers in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRegion {
    pub main_lines: Vec<String>,
    pub base_lines: Vec<String>,
    pub worktree_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Common(Vec<String>),
    Conflict(ConflictRegion),
}

/// Parse `git merge-file -p -L ours -L base -L theirs` output into segments.
pub fn parse_conflict_regions(merged: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut common = Vec::new();
    let mut lines = merged.lines().peekable();

    while let Some(line) = lines.next() {
        if line.starts_with("<<<<<<<") {
            if !common.is_empty() {
                segments.push(Segment::Common(std::mem::take(&mut common)));
            }
            let mut ours = Vec::new();
            let mut base = Vec::new();
            let mut theirs = Vec::new();
            let mut in_base = false;
            let mut in_theirs = false;
            for inner in lines.by_ref() {
                if inner.starts_with("|||||||") {
                    in_base = true;
                    continue;
                }
                if inner.starts_with("=======") {
                    in_base = false;
                    in_theirs = true;
                    continue;
                }
                if inner.starts_with(">>>>>>>") {
                    break;
                }
                if in_theirs {
                    theirs.push(inner.to_string());
                } else if in_base {
                    base.push(inner.to_string());
                } else {
                    ours.push(inner.to_string());
                }
            }
            segments.push(Segment::Conflict(ConflictRegion {
                main_lines: ours,
                base_lines: base,
                worktree_lines: theirs,
            }));
        } else {
            common.push(line.to_string());
        }
    }
    if !common.is_empty() {
        segments.push(Segment::Common(common));
    }
    segments
}

/// Reassemble segments, replacing each conflict region with `resolve`'s output.
fn reassemble(segments: &[Segment], resolve: impl Fn(&ConflictRegion) -> Vec<String>) -> String {
    let mut out = Vec::new();
    for segment in segments {
        match segment {
            Segment::Common(lines) => out.extend(lines.iter().cloned()),
            Segment::Conflict(region) => out.extend(resolve(region)),
        }
    }
    out.join("\n")
}

/// Reassemble picking `main_lines` (ours) for every region.
pub fn reassemble_ours(segments: &[Segment]) -> String {
    reassemble(segments, |r| r.main_lines.clone())
}

/// Reassemble picking `worktree_lines` (theirs) for every region.
pub fn reassemble_theirs(segments: &[Segment]) -> String {
    reassemble(segments, |r| r.worktree_lines.clone())
}

fn is_binary_extension(path: &Path, config: &CoreConfig) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            config
                .binary_extensions
                .iter()
                .any(|b| b.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn is_oversize(main: &str, worktree: &str, config: &CoreConfig) -> bool {
    line_count(main).max(line_count(worktree)) > config.max_file_lines
}

/// Heuristic three-way merge used when no AI caller is configured.
///
/// - No base content: prefer the worktree content.
/// - Exactly one side diverges from base: take that side.
/// - Both sides diverge: unresolved.
pub fn heuristic_merge(base: Option<&str>, main: &str, worktree: &str) -> MergeOutcome {
    let Some(base) = base else {
        return MergeOutcome::Merged {
            content: worktree.to_string(),
            ai_assisted: false,
        };
    };
    let main_changed = main != base;
    let worktree_changed = worktree != base;
    match (main_changed, worktree_changed) {
        (false, false) | (false, true) => MergeOutcome::Merged {
            content: worktree.to_string(),
            ai_assisted: false,
        },
        (true, false) => MergeOutcome::Merged {
            content: main.to_string(),
            ai_assisted: false,
        },
        (true, true) => MergeOutcome::Unresolved {
            reason: "both sides changed and no AI caller is configured".to_string(),
        },
    }
}

pub struct MergeEngine<'a> {
    config: &'a CoreConfig,
    ai: Option<&'a dyn AiCaller>,
}

impl<'a> MergeEngine<'a> {
    pub fn new(config: &'a CoreConfig, ai: Option<&'a dyn AiCaller>) -> Self {
        Self { config, ai }
    }

    /// Merge one file's three versions, applying guards, then trying
    /// region-only (strategy A) before full-file (strategy B).
    pub fn merge_file(
        &self,
        path: &Path,
        base: Option<&str>,
        main: &str,
        worktree: &str,
        task_intent: &str,
        context: &MergeContext,
    ) -> MergeOutcome {
        if is_binary_extension(path, self.config) {
            return MergeOutcome::Unresolved {
                reason: "binary file".to_string(),
            };
        }
        if is_oversize(main, worktree, self.config) {
            return MergeOutcome::Unresolved {
                reason: "file exceeds size guard".to_string(),
            };
        }

        let Some(ai) = self.ai else {
            return heuristic_merge(base, main, worktree);
        };

        let language = infer_language(path);
        let timeout = Duration::from_secs(self.config.syntax_check_timeout_secs);

        if let Some(base) = base {
            let (merged, had_conflicts) = match git_merge_file(main, base, worktree) {
                Ok(v) => v,
                Err(_) => (String::new(), false),
            };
            if had_conflicts {
                if let Some(result) = self.try_region_strategy(path, language, &merged, task_intent, ai, timeout) {
                    return result;
                }
                // fall through to strategy B below
            } else if !merged.is_empty() {
                return MergeOutcome::Merged {
                    content: merged,
                    ai_assisted: false,
                };
            }
        }

        self.full_file_strategy(path, language, base, main, worktree, task_intent, context, ai, timeout)
    }

    fn try_region_strategy(
        &self,
        path: &Path,
        language: &str,
        merged_with_markers: &str,
        task_intent: &str,
        ai: &dyn AiCaller,
        timeout: Duration,
    ) -> Option<MergeOutcome> {
        let segments = parse_conflict_regions(merged_with_markers);
        let region_count = segments
            .iter()
            .filter(|s| matches!(s, Segment::Conflict(_)))
            .count();
        if region_count == 0 {
            return None;
        }

        let path_str = path.to_string_lossy();
        let mut resolutions: Vec<Vec<String>> = Vec::with_capacity(region_count);

        for segment in &segments {
            if let Segment::Conflict(region) = segment {
                let prompt = prompts::region_prompt(prompts::RegionPromptArgs {
                    path: &path_str,
                    language,
                    task_intent,
                    ours: &region.main_lines.join("\n"),
                    base: &region.base_lines.join("\n"),
                    theirs: &region.worktree_lines.join("\n"),
                });
                let response = ai.call("Resolve this merge conflict region.", &prompt).ok()?;
                let resolved = extract_code_block(&response)?;
                resolutions.push(resolved.lines().map(String::from).collect());
            }
        }

        let mut idx = 0;
        let content = reassemble(&segments, |_region| {
            let out = resolutions.get(idx).cloned().unwrap_or_default();
            idx += 1;
            out
        });

        match validate(&content, language, timeout) {
            ValidationResult::Valid => Some(MergeOutcome::Merged {
                content,
                ai_assisted: true,
            }),
            ValidationResult::Invalid(_) => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn full_file_strategy(
        &self,
        path: &Path,
        language: &str,
        base: Option<&str>,
        main: &str,
        worktree: &str,
        task_intent: &str,
        context: &MergeContext,
        ai: &dyn AiCaller,
        timeout: Duration,
    ) -> MergeOutcome {
        let path_str = path.to_string_lossy();
        let prompt = prompts::full_file_prompt(prompts::FullFilePromptArgs {
            path: &path_str,
            language,
            task_intent,
            base: base.unwrap_or(""),
            main,
            worktree,
            commits_behind: context.total_commits_behind,
            pending_tasks: &context.pending_tasks,
        });

        let system = "Merge these file versions into one coherent result.";
        let first = self.attempt_full_file(system, &prompt, language, ai, timeout);
        match first {
            Ok(outcome) => outcome,
            Err(reason) => {
                let retry_prompt = prompts::retry_prompt(&path_str, language, &reason);
                match self.attempt_full_file(system, &retry_prompt, language, ai, timeout) {
                    Ok(outcome) => outcome,
                    Err(reason) => MergeOutcome::Unresolved { reason },
                }
            }
        }
    }

    fn attempt_full_file(
        &self,
        system: &str,
        prompt: &str,
        language: &str,
        ai: &dyn AiCaller,
        timeout: Duration,
    ) -> Result<MergeOutcome, String> {
        let response = ai.call(system, prompt).map_err(|e| e.to_string())?;
        let Some(extracted) = extract_code_block(&response) else {
            return Err("response did not contain usable code".to_string());
        };
        match validate(&extracted, language, timeout) {
            ValidationResult::Valid => Ok(MergeOutcome::Merged {
                content: extracted,
                ai_assisted: true,
            }),
            ValidationResult::Invalid(msg) => Err(msg),
        }
    }
}

fn git_merge_file(ours: &str, base: &str, theirs: &str) -> anyhow::Result<(String, bool)> {
    crate::vcs::merge_file_text_standalone(ours, base, theirs)
}

/// Computes the line-count of content that would appear in a region-only
/// prompt vs. a full-file prompt for the same input, for the prompt-size
/// optimization invariant.
pub fn region_prompt_is_smaller(segments: &[Segment], main: &str, worktree: &str) -> bool {
    let region_lines: usize = segments
        .iter()
        .filter_map(|s| match s {
            Segment::Conflict(r) => Some(r.main_lines.len() + r.base_lines.len() + r.worktree_lines.len()),
            Segment::Common(_) => None,
        })
        .sum();
    let full_file_lines = line_count(main) + line_count(worktree);
    region_lines < full_file_lines
}
