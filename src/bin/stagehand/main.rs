//! Stagehand CLI - staged builds for native + web bundle components

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stagehand::builder::BuildError;
use stagehand::core::ManifestError;
use stagehand::util::diagnostic::{self, suggestions, Diagnostic};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("stagehand=debug")
        } else {
            EnvFilter::new("stagehand=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        let code = match e.downcast_ref::<BuildError>() {
            Some(build_err) => {
                diagnostic::emit(&build_err.to_diagnostic(), color);
                build_err.exit_code()
            }
            None => {
                let mut diag = Diagnostic::error(format!("{:#}", e));
                if let Some(ManifestError::NotFound(_)) = e.downcast_ref::<ManifestError>() {
                    diag = diag.with_suggestion(suggestions::NO_MANIFEST);
                }
                diagnostic::emit(&diag, color);
                1
            }
        };
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let global = commands::GlobalArgs {
        verbose: cli.verbose,
        no_color: cli.no_color,
        manifest_path: cli.manifest_path,
    };

    match cli.command {
        Commands::Build(args) => commands::build::execute(&global, args),
        Commands::Plan(args) => commands::plan::execute(&global, args),
        Commands::Triple(args) => commands::triple::execute(&global, args),
        Commands::Clean(args) => commands::clean::execute(&global, args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
