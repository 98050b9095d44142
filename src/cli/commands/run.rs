//! Run command - resolve an app's artifact and execute it

use crate::audit::AuditLog;
use crate::cli::args::RunArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::graph::{DriverRunner, PlatformGraph};
use crate::registry::OutputRegistry;
use crate::ui::Console;
use std::sync::Arc;
use tracing::debug;

/// Execute the run command. Returns the child's exit code, which the CLI
/// forwards verbatim.
pub async fn execute(args: RunArgs, config: &Config) -> KilnResult<i32> {
    let console = Console::detect();
    let audit = AuditLog::new(config);

    let registry = OutputRegistry::from_config(config, ConfigManager::store_root(config))?;
    let output = registry.resolve_app(&args.app)?;

    if !output.artifact.is_file() {
        debug!("Artifact for app '{}' not built yet", output.name);
        let spinner = console.spinner(&format!("Building {} first...", output.name));
        let runner = Arc::new(DriverRunner::new());
        let graph = PlatformGraph::prepare(config, &output.platform, runner).await?;
        graph.build_variant(&output.variant).await?;
        spinner.finish_and_clear();
    }

    audit
        .record(
            "run",
            serde_json::json!({
                "app": output.name,
                "platform": output.platform,
                "variant": output.variant.name,
                "artifact": output.artifact,
            }),
        )
        .await;

    debug!("Executing {} {:?}", output.artifact.display(), args.args);
    let status = tokio::process::Command::new(&output.artifact)
        .args(&args.args)
        .status()
        .await
        .map_err(|e| KilnError::command_failed(output.artifact.display().to_string(), e))?;

    Ok(status.code().unwrap_or(1))
}
