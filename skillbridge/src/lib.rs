//! SkillBridge CLI library: argument parsing and command dispatch.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use skillbridge_core::observability::{init_tracing, TracingMode};
use skillbridge_sandbox::runner::ResourceLimits;

/// Run the CLI: parse args and dispatch to command handlers.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let is_chat = matches!(cli.command, Commands::Chat { .. });
    init_tracing(if is_chat { TracingMode::Chat } else { TracingMode::Default });

    let paths = commands::resolve_paths(cli.skills_dir.as_deref(), cli.root.as_deref());

    match cli.command {
        Commands::Scan => {
            let registry = commands::load_registry(&paths)?;
            println!("{}", commands::catalog::scan(&registry)?);
        }
        Commands::Manifest { output } => {
            let registry = commands::load_registry(&paths)?;
            println!("{}", commands::catalog::manifest(&registry, output.as_deref())?);
        }
        Commands::Tools { target, query, max } => {
            let registry = commands::load_registry(&paths)?;
            println!(
                "{}",
                commands::catalog::tools(&registry, &target, query.as_deref(), max)?
            );
        }
        Commands::Exec {
            skill,
            args_json,
            approve,
            timeout,
            max_memory,
        } => {
            let arguments = commands::exec::read_args(&args_json)?;
            let limits = ResourceLimits::from_env().with_cli_overrides(max_memory, timeout);
            println!(
                "{}",
                commands::exec::run(&paths, &skill, arguments, approve, limits)?
            );
        }
        Commands::Chat {
            message,
            target,
            model,
            max_iterations,
            system_prompt,
            yes,
            verbose,
        } => {
            commands::chat::run(
                &paths,
                &message,
                commands::chat::ChatOptions {
                    target,
                    model,
                    max_iterations,
                    system_prompt,
                    yes,
                    verbose,
                },
            )?;
        }
    }
    Ok(())
}
