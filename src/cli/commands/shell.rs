//! Shell command - enter an environment with the resolved toolchain and a
//! package's build inputs exported. No build is triggered.

use crate::cli::args::ShellArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::graph::{DriverRunner, PlatformGraph};
use crate::registry::OutputRegistry;
use crate::ui::Console;
use std::sync::Arc;

/// Execute the shell command. Returns the shell's exit code.
pub async fn execute(args: ShellArgs, config: &Config) -> KilnResult<i32> {
    let console = Console::detect();

    let registry = OutputRegistry::from_config(config, ConfigManager::store_root(config))?;
    let output = match args.package {
        Some(ref name) => registry.resolve_package(name)?,
        None => {
            let name = registry
                .package_names()
                .first()
                .map(|n| n.to_string())
                .ok_or_else(|| KilnError::User("no packages declared in configuration".to_string()))?;
            registry.resolve_package(&name)?
        }
    };

    // Resolving the graph gives the toolchain env and the derivation key
    // without running either compile step
    let runner = Arc::new(DriverRunner::new());
    let graph = PlatformGraph::prepare(config, &output.platform, runner).await?;

    console.info(&format!(
        "Entering shell for {} ({}, variant {})",
        output.name, output.platform, output.variant.name
    ));
    console.field("derivation key", graph.key.short());

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());

    let mut path = graph.toolchain.bin_dir().into_os_string();
    if let Some(existing) = std::env::var_os("PATH") {
        path.push(":");
        path.push(existing);
    }

    let mut cmd = tokio::process::Command::new(&shell);
    cmd.env("PATH", path)
        .env("KILN_TARGET", &output.platform)
        .env("KILN_VARIANT", &output.variant.name)
        .env("KILN_FEATURES", output.variant.feature_args())
        .env("KILN_SOURCE_ROOT", &config.source.root)
        .env("KILN_DERIVATION_KEY", graph.key.as_str());

    if let Some(ref support_lib) = graph.toolchain.support_lib {
        cmd.env(&graph.toolchain.support_lib_env, support_lib);
    }

    let status = cmd
        .status()
        .await
        .map_err(|e| KilnError::command_failed(shell, e))?;

    Ok(status.code().unwrap_or(1))
}
