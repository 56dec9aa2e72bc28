use std::process;

use autoclaude_merge::policy::{self, WorkspaceMode, WorkspacePolicyInput};
use autoclaude_merge::{AiCaller, CoreConfig, MergeOrchestrator, MergeResult, Repository, WorktreeManager};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "autoclaude-merge")]
#[command(about = "Workspace isolation and intent-aware merge for AI coding agent tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Spec identifier, e.g. "001-add-login"
    #[arg(long, global = true)]
    spec: Option<String>,

    /// Leave the merge staged but uncommitted.
    #[arg(long, global = true)]
    no_commit: bool,

    #[arg(long, global = true)]
    force_isolated: bool,

    #[arg(long, global = true)]
    force_direct: bool,

    #[arg(long, global = true)]
    auto_continue: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or reuse the spec's isolated worktree.
    Build,
    /// Merge the spec's worktree into the base branch.
    Merge,
    /// Preview conflicts for a spec without merging.
    Review,
    /// Tear down the spec's worktree and branch.
    Discard,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let cli = Cli::parse();
    let result = run(cli);

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let repo = Repository::discover(cwd.as_path())?;
    let project_root = repo.root().to_path_buf();
    let config = CoreConfig::load(&project_root);

    let spec = cli
        .spec
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--spec is required"))?;

    let policy_input = WorkspacePolicyInput {
        project_has_uncommitted_changes: repo.is_working_tree_dirty().unwrap_or(false),
        force_isolated: cli.force_isolated,
        force_direct: cli.force_direct,
        auto_continue: cli.auto_continue,
    };
    let mode = policy::decide(policy_input).unwrap_or(WorkspaceMode::Isolated);

    match cli.command {
        Commands::Build => {
            let worktrees = WorktreeManager::new(&repo);
            let base_branch = repo
                .current_branch()?
                .ok_or_else(|| anyhow::anyhow!("HEAD is detached; cannot determine base branch"))?;
            let info = worktrees.get_or_create_worktree(spec, &base_branch)?;
            println!(
                "build {spec}: {} ({:?}) at {}",
                info.branch,
                mode,
                info.path.display()
            );
            Ok(())
        }
        Commands::Merge => {
            let ai_command = std::env::var("AUTOCLAUDE_AI_COMMAND").ok();
            let caller = ai_command.map(|cmd| {
                autoclaude_merge::ai::SubprocessAiCaller::new(cmd, ai_args_from_env())
            });
            let ai_ref: Option<&dyn AiCaller> = caller.as_ref().map(|c| c as &dyn AiCaller);

            let orchestrator = MergeOrchestrator::new(repo, config, ai_ref);
            match orchestrator.merge(spec, cli.no_commit) {
                MergeResult::Success { stats } => {
                    println!(
                        "merge {spec}: ok ({} files merged, {} AI-assisted)",
                        stats.files_merged, stats.ai_assisted
                    );
                    Ok(())
                }
                MergeResult::Failure {
                    error,
                    resolved,
                    remaining_conflicts,
                } => {
                    println!(
                        "merge {spec}: failed ({error}); {} resolved, {} remaining",
                        resolved.len(),
                        remaining_conflicts.len()
                    );
                    process::exit(2);
                }
            }
        }
        Commands::Review => {
            let worktrees = WorktreeManager::new(&repo);
            let Some(info) = worktrees.get_worktree_info(spec)? else {
                println!("review {spec}: no worktree");
                process::exit(1);
            };
            let classifier = autoclaude_merge::conflict::ConflictClassifier::new(&repo);
            let conflicts = classifier.preview_merge(&[info])?;
            println!("review {spec}: {} conflicting file(s)", conflicts.len());
            for conflict in conflicts {
                println!(
                    "  {} [{:?}]{}",
                    conflict.file.display(),
                    conflict.severity,
                    conflict.reason.map(|r| format!(" - {r}")).unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Discard => {
            let worktrees = WorktreeManager::new(&repo);
            worktrees.remove_worktree(spec, true)?;
            println!("discard {spec}: removed");
            Ok(())
        }
    }
}

fn ai_args_from_env() -> Vec<String> {
    std::env::var("AUTOCLAUDE_AI_ARGS")
        .ok()
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}
