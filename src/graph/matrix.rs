//! Per-platform build graphs and the platform matrix
//!
//! Each target platform gets a fully independent graph: toolchain
//! resolution, source snapshot, dependency cache, variant builds. Graphs
//! share nothing — each has its own store namespace — so platforms run
//! fully in parallel and one platform's failure never touches another.
//!
//! Within one platform the dependency stage is the synchronization point:
//! every variant build first awaits the shared cache entry, and concurrent
//! variant builds coalesce onto a single dependency compilation.

use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::graph::key::{DepInputs, DerivationKey};
use crate::graph::runner::{BuildRunner, DepBuildRequest, VariantBuildRequest};
use crate::graph::store::{platform_store_root, variant_output_path, ArtifactSet, CacheStore};
use crate::graph::variant::Variant;
use crate::snapshot::{ExcludeRules, SourceSnapshot};
use crate::toolchain::{host_triple, ToolchainDescriptor, ToolchainResolver, ToolchainSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// One finished variant build
#[derive(Debug, Clone)]
pub struct BuiltArtifact {
    /// Target platform the artifact was built for
    pub platform: String,

    /// The variant that was built
    pub variant: Variant,

    /// Derivation key of the dependency stage the build consumed
    pub key: DerivationKey,

    /// Final binary path
    pub path: PathBuf,
}

/// Outcome of one variant build on one platform
#[derive(Debug)]
pub struct VariantReport {
    pub variant: String,
    pub result: KilnResult<BuiltArtifact>,
}

/// Outcome of one platform's whole graph. `Err` means the graph failed
/// before any variant could build (toolchain, snapshot, or policy).
#[derive(Debug)]
pub struct PlatformReport {
    pub platform: String,
    pub outcome: KilnResult<Vec<VariantReport>>,
}

impl PlatformReport {
    /// Whether every variant on this platform built successfully
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            Ok(reports) => reports.iter().all(|r| r.result.is_ok()),
            Err(_) => false,
        }
    }
}

/// The configured target platforms, defaulting to the host
pub fn target_platforms(config: &Config) -> Vec<String> {
    if config.build.platforms.is_empty() {
        vec![host_triple()]
    } else {
        config.build.platforms.clone()
    }
}

/// An isolated build graph for one target platform
pub struct PlatformGraph {
    /// Target platform identifier
    pub platform: String,

    /// Resolved toolchain for this platform
    pub toolchain: ToolchainSpec,

    /// Captured source snapshot
    pub snapshot: SourceSnapshot,

    /// Derivation key of this platform's dependency stage
    pub key: DerivationKey,

    store: CacheStore,
    store_root: PathBuf,
    runner: Arc<dyn BuildRunner>,
    source_root: PathBuf,
    lockfile: PathBuf,
    artifact_name: String,
}

impl std::fmt::Debug for PlatformGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformGraph")
            .field("platform", &self.platform)
            .field("toolchain", &self.toolchain)
            .field("snapshot", &self.snapshot)
            .field("key", &self.key)
            .field("store_root", &self.store_root)
            .field("source_root", &self.source_root)
            .field("lockfile", &self.lockfile)
            .field("artifact_name", &self.artifact_name)
            .finish()
    }
}

impl PlatformGraph {
    /// Resolve the toolchain, capture the snapshot, and derive this
    /// platform's dependency key. Fails fast on anything that would poison
    /// every downstream step.
    pub async fn prepare(
        config: &Config,
        platform: &str,
        runner: Arc<dyn BuildRunner>,
    ) -> KilnResult<Self> {
        let source_root = config.source.root.clone();
        let descriptor_path = source_root.join(&config.toolchain.descriptor);
        let toolchain_root = ConfigManager::toolchain_root(config);
        let mirror = config.toolchain.mirror.clone();
        let driver = config.toolchain.driver.clone();
        let support_lib_env = config.toolchain.support_lib_env.clone();
        let exclude = ExcludeRules::new(&config.source.exclude);
        let lockfile_name = config.build.lockfile.clone();
        let auto_fetch = config.build.auto_fetch;
        let target = platform.to_string();

        // Resolution may fetch from the mirror and snapshotting reads the
        // whole tree; keep both off the async workers
        let (toolchain, snapshot, dep_inputs) = tokio::task::spawn_blocking(move || {
            let descriptor = ToolchainDescriptor::load(&descriptor_path)?;
            let resolver = ToolchainResolver::new(toolchain_root, mirror, driver, support_lib_env);
            let toolchain = resolver.resolve(&descriptor, &target)?;
            let snapshot = SourceSnapshot::capture(&source_root, &exclude)?;
            let dep_inputs = DepInputs::read(&source_root, &lockfile_name, auto_fetch)?;
            Ok::<_, KilnError>((toolchain, snapshot, dep_inputs))
        })
        .await
        .map_err(|e| KilnError::Internal(format!("platform preparation task failed: {e}")))??;

        let key = DerivationKey::compute(
            platform,
            &toolchain.identifier,
            &snapshot.hash,
            &dep_inputs,
        );
        debug!(
            "Prepared graph for {}: snapshot {}, key {}",
            platform,
            snapshot.short_hash(),
            key
        );

        let store_root = ConfigManager::store_root(config);
        let store = CacheStore::open(platform_store_root(&store_root, platform));

        Ok(Self {
            platform: platform.to_string(),
            toolchain,
            snapshot,
            key,
            store,
            store_root,
            runner,
            source_root: config.source.root.clone(),
            lockfile: config.source.root.join(&config.build.lockfile),
            artifact_name: config.build.artifact.clone(),
        })
    }

    /// The dependency artifact bundle for this platform, compiled at most
    /// once per derivation key
    pub async fn dependencies(&self) -> KilnResult<ArtifactSet> {
        let runner = Arc::clone(&self.runner);
        let toolchain = self.toolchain.clone();
        let source_root = self.source_root.clone();
        let lockfile = self.lockfile.clone();
        let target = self.platform.clone();

        self.store
            .get_or_build(&self.key, move |out_dir| async move {
                let req = DepBuildRequest {
                    toolchain,
                    source_root,
                    lockfile,
                    target,
                    out_dir,
                };
                runner.build_dependencies(&req).await
            })
            .await
    }

    /// Build one variant. The dependency stage is awaited first; a variant
    /// failure is scoped to that variant alone.
    pub async fn build_variant(&self, variant: &Variant) -> KilnResult<BuiltArtifact> {
        let deps = self.dependencies().await?;

        let out_file = variant_output_path(
            &self.store_root,
            &self.platform,
            &variant.name,
            &self.artifact_name,
        );

        let req = VariantBuildRequest {
            toolchain: self.toolchain.clone(),
            source_root: self.source_root.clone(),
            variant: variant.clone(),
            deps,
            target: self.platform.clone(),
            out_file,
        };

        let path = self
            .runner
            .build_variant(&req)
            .await
            .map_err(|e| KilnError::VariantBuildFailed {
                variant: variant.name.clone(),
                reason: e.to_string(),
            })?;

        info!("Built variant {} for {} at {}", variant, self.platform, path.display());

        Ok(BuiltArtifact {
            platform: self.platform.clone(),
            variant: variant.clone(),
            key: self.key.clone(),
            path,
        })
    }

    /// (hits, misses) of this graph's dependency store
    pub fn store_stats(&self) -> (usize, usize) {
        self.store.stats()
    }
}

/// Evaluate the full matrix: every requested variant on every requested
/// platform. Platforms run in parallel with no shared state; within a
/// platform, variants run concurrently once the dependency stage is ready.
pub async fn run_matrix(
    config: Arc<Config>,
    platforms: Vec<String>,
    variants: Vec<Variant>,
    runner: Arc<dyn BuildRunner>,
) -> Vec<PlatformReport> {
    let mut tasks = JoinSet::new();

    for (index, platform) in platforms.into_iter().enumerate() {
        let config = Arc::clone(&config);
        let variants = variants.clone();
        let runner = Arc::clone(&runner);

        tasks.spawn(async move {
            let report = run_platform(&config, &platform, variants, runner).await;
            (index, report)
        });
    }

    let mut reports: Vec<(usize, PlatformReport)> = vec![];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(item) => reports.push(item),
            Err(e) => reports.push((
                usize::MAX,
                PlatformReport {
                    platform: "<unknown>".to_string(),
                    outcome: Err(KilnError::Internal(format!("platform task panicked: {e}"))),
                },
            )),
        }
    }

    reports.sort_by_key(|(index, _)| *index);
    reports.into_iter().map(|(_, report)| report).collect()
}

async fn run_platform(
    config: &Config,
    platform: &str,
    variants: Vec<Variant>,
    runner: Arc<dyn BuildRunner>,
) -> PlatformReport {
    let graph = match PlatformGraph::prepare(config, platform, runner).await {
        Ok(graph) => Arc::new(graph),
        Err(e) => {
            return PlatformReport {
                platform: platform.to_string(),
                outcome: Err(e),
            }
        }
    };

    let mut tasks = JoinSet::new();
    for (index, variant) in variants.into_iter().enumerate() {
        let graph = Arc::clone(&graph);
        tasks.spawn(async move {
            let result = graph.build_variant(&variant).await;
            (
                index,
                VariantReport {
                    variant: variant.name,
                    result,
                },
            )
        });
    }

    let mut reports: Vec<(usize, VariantReport)> = vec![];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(item) => reports.push(item),
            Err(e) => reports.push((
                usize::MAX,
                VariantReport {
                    variant: "<unknown>".to_string(),
                    result: Err(KilnError::Internal(format!("variant task panicked: {e}"))),
                },
            )),
        }
    }

    reports.sort_by_key(|(index, _)| *index);
    PlatformReport {
        platform: platform.to_string(),
        outcome: Ok(reports.into_iter().map(|(_, report)| report).collect()),
    }
}
