//! Kiln - Reproducible Build-Graph Orchestrator
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use kiln::cli::{Cli, Commands};
use kiln::config::ConfigManager;
use kiln::error::KilnResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} [{}] {}", style("Error:").red().bold(), e.kind(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> KilnResult<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("kiln=warn"),
        1 => EnvFilter::new("kiln=info"),
        _ => EnvFilter::new("kiln=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    kiln::ui::init_theme();

    match cli.command {
        // Commands that do not need configuration
        Commands::Init(args) => {
            kiln::cli::commands::init(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions(args) => {
            kiln::cli::commands::completions(args)?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let config = load_config(cli.config.as_deref(), cli.no_local).await?;
            ConfigManager::ensure_state_dirs(&config).await?;

            match command {
                Commands::Init(_) | Commands::Completions(_) => unreachable!("handled above"),
                Commands::Build(args) => {
                    kiln::cli::commands::build(args, &config).await?;
                    Ok(ExitCode::SUCCESS)
                }
                Commands::Run(args) => {
                    let code = kiln::cli::commands::run(args, &config).await?;
                    Ok(ExitCode::from(code.clamp(0, 255) as u8))
                }
                Commands::Shell(args) => {
                    let code = kiln::cli::commands::shell(args, &config).await?;
                    Ok(ExitCode::from(code.clamp(0, 255) as u8))
                }
                Commands::Status => {
                    kiln::cli::commands::status(&config).await?;
                    Ok(ExitCode::SUCCESS)
                }
                Commands::Cache(args) => {
                    kiln::cli::commands::cache(args, &config).await?;
                    Ok(ExitCode::SUCCESS)
                }
                Commands::Config(args) => {
                    kiln::cli::commands::config(args, &config).await?;
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
    }
}

async fn load_config(
    config_path: Option<&std::path::Path>,
    no_local: bool,
) -> KilnResult<kiln::config::Config> {
    let config_manager = match config_path {
        Some(path) => ConfigManager::with_path(path.to_path_buf()),
        None => ConfigManager::new(),
    };

    // Find local config unless --no-local is set
    let local_config_path = if no_local {
        debug!("Local config discovery disabled (--no-local)");
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| kiln::error::KilnError::io("getting current directory", e))?;
        let found = ConfigManager::find_local_config(&cwd);
        if let Some(ref path) = found {
            debug!("Found local config: {}", path.display());
        }
        found
    };

    config_manager
        .load_merged(local_config_path.as_deref())
        .await
}
