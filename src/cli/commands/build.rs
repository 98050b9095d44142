//! Build command - resolve and build one registry package

use crate::audit::AuditLog;
use crate::cli::args::BuildArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::graph::{DriverRunner, PlatformGraph, Variant};
use crate::registry::OutputRegistry;
use crate::ui::Console;
use std::sync::Arc;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> KilnResult<()> {
    let console = Console::detect();
    let audit = AuditLog::new(config);

    let registry = OutputRegistry::from_config(config, ConfigManager::store_root(config))?;
    let output = registry.resolve_package(&args.package)?;

    // An explicit feature list restricts the invocation to one declared
    // variant; it cannot rebind a package to a different one
    if !args.features.is_empty() {
        let requested = Variant::resolve_by_features(&args.features, config)?;
        if requested.name != output.variant.name {
            return Err(KilnError::User(format!(
                "package '{}' is bound to variant '{}', but the requested features select '{}'",
                output.name, output.variant.name, requested.name
            )));
        }
    }

    console.intro(&format!("Building {}", output.name));
    console.field("platform", &output.platform);
    console.field("variant", &output.variant.name);

    let spinner = console.spinner("Resolving toolchain and snapshotting source...");
    let runner = Arc::new(DriverRunner::new());
    let graph = match PlatformGraph::prepare(config, &output.platform, runner).await {
        Ok(graph) => {
            spinner.finish_and_clear();
            graph
        }
        Err(e) => {
            spinner.finish_and_clear();
            audit
                .record(
                    "build-failed",
                    serde_json::json!({
                        "package": output.name,
                        "platform": output.platform,
                        "error": e.kind(),
                    }),
                )
                .await;
            return Err(e);
        }
    };

    console.field("toolchain", &graph.toolchain.identifier);
    console.field("snapshot", graph.snapshot.short_hash());
    console.field("derivation key", graph.key.short());

    let spinner = console.spinner(&format!("Building variant {}...", output.variant));
    let result = graph.build_variant(&output.variant).await;
    spinner.finish_and_clear();

    match result {
        Ok(artifact) => {
            let (hits, misses) = graph.store_stats();
            debug!("Dependency store: {} hits, {} misses", hits, misses);
            if hits > 0 {
                console.ok("Dependency bundle reused from cache");
            } else {
                console.ok("Dependency bundle compiled");
            }
            console.ok_detail("Variant built", &artifact.path.display().to_string());

            audit
                .record(
                    "build",
                    serde_json::json!({
                        "package": output.name,
                        "platform": artifact.platform,
                        "variant": artifact.variant.name,
                        "key": artifact.key.as_str(),
                        "artifact": artifact.path,
                        "dep_cache_hit": hits > 0,
                    }),
                )
                .await;

            console.done(&format!("Built {}", output.name));
            Ok(())
        }
        Err(e) => {
            console.fail_detail(&format!("{} failed", output.name), e.kind());
            audit
                .record(
                    "build-failed",
                    serde_json::json!({
                        "package": output.name,
                        "platform": output.platform,
                        "variant": output.variant.name,
                        "key": graph.key.as_str(),
                        "error": e.kind(),
                    }),
                )
                .await;
            Err(e)
        }
    }
}
