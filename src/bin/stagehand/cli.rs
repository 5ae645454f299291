//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Stagehand - staged builds for hybrid native + web bundle components
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to Stagehand.toml (defaults to searching upward from cwd)
    #[arg(long, global = true, env = "STAGEHAND_MANIFEST_PATH")]
    pub manifest_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the whole pipeline
    Build(BuildArgs),

    /// Print the stage graph and bundle targets as JSON
    Plan(PlanArgs),

    /// Resolve and print the host target triple
    Triple(TripleArgs),

    /// Remove build outputs
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Package the binary module in release mode
    #[arg(short, long)]
    pub release: bool,

    /// Number of bundle tasks run at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Output format: human or json
    #[arg(long, value_name = "FMT")]
    pub message_format: Option<String>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Plan a release build
    #[arg(short, long)]
    pub release: bool,
}

#[derive(Args)]
pub struct TripleArgs {}

#[derive(Args)]
pub struct CleanArgs {
    /// List what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
