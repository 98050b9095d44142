//! Build runner abstraction
//!
//! The pinned toolchain is a black box reached through `BuildRunner`: one
//! call compiles the transitive dependency set into a reusable bundle, the
//! other performs the incremental top-level build for a single variant.
//! `DriverRunner` shells out to the toolchain's build driver; tests swap in
//! a counting fake.

use crate::error::{KilnError, KilnResult};
use crate::graph::store::ArtifactSet;
use crate::graph::variant::Variant;
use crate::toolchain::ToolchainSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Inputs for the dependency compilation step
#[derive(Debug, Clone)]
pub struct DepBuildRequest {
    /// Resolved toolchain to compile with
    pub toolchain: ToolchainSpec,

    /// Source tree root
    pub source_root: PathBuf,

    /// Lockfile pinning the dependency graph
    pub lockfile: PathBuf,

    /// Target triple
    pub target: String,

    /// Directory the artifact bundle must be written into
    pub out_dir: PathBuf,
}

/// Inputs for one variant's top-level build step
#[derive(Debug, Clone)]
pub struct VariantBuildRequest {
    /// Resolved toolchain to compile with
    pub toolchain: ToolchainSpec,

    /// Source tree root
    pub source_root: PathBuf,

    /// The variant being built
    pub variant: Variant,

    /// Ready dependency bundle, consumed read-only
    pub deps: ArtifactSet,

    /// Target triple
    pub target: String,

    /// Path the final binary must be written to
    pub out_file: PathBuf,
}

/// Abstract interface to the toolchain's two compilation steps
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Compile the transitive dependency set (the workspace's own packages
    /// excluded) into `req.out_dir`, returning the produced artifact files
    async fn build_dependencies(&self, req: &DepBuildRequest) -> KilnResult<Vec<PathBuf>>;

    /// Compile one variant's top-level step against a ready dependency
    /// bundle, returning the final binary path. Must not recompile anything
    /// already present in the bundle.
    async fn build_variant(&self, req: &VariantBuildRequest) -> KilnResult<PathBuf>;

    /// Human-readable runner name for display
    fn runner_name(&self) -> &'static str;
}

/// Process-backed runner driving the toolchain's `kilnc`-style driver
pub struct DriverRunner;

impl DriverRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, toolchain: &ToolchainSpec) -> Command {
        let mut cmd = Command::new(&toolchain.driver);

        // Prepend the toolchain's bin dir so the driver finds its own tools
        let mut path = toolchain.bin_dir().into_os_string();
        if let Some(existing) = std::env::var_os("PATH") {
            path.push(":");
            path.push(existing);
        }
        cmd.env("PATH", path);

        if let Some(ref support_lib) = toolchain.support_lib {
            cmd.env(&toolchain.support_lib_env, support_lib);
        }

        cmd
    }

    async fn run(&self, mut cmd: Command, label: &str) -> KilnResult<()> {
        debug!("Running {:?}", cmd);
        let output = cmd
            .output()
            .await
            .map_err(|e| KilnError::command_failed(label.to_string(), e))?;

        if !output.status.success() {
            return Err(KilnError::command_exec(
                label.to_string(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for DriverRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildRunner for DriverRunner {
    async fn build_dependencies(&self, req: &DepBuildRequest) -> KilnResult<Vec<PathBuf>> {
        let mut cmd = self.command(&req.toolchain);
        cmd.arg("dep-build")
            .arg("--source")
            .arg(&req.source_root)
            .arg("--lockfile")
            .arg(&req.lockfile)
            .arg("--target")
            .arg(&req.target)
            .arg("--out")
            .arg(&req.out_dir)
            .arg("--offline");

        self.run(cmd, "kilnc dep-build").await?;

        let mut files = vec![];
        let dir = std::fs::read_dir(&req.out_dir)
            .map_err(|e| KilnError::io(format!("reading {}", req.out_dir.display()), e))?;
        for item in dir {
            let item = item.map_err(|e| KilnError::io("reading artifact dir".to_string(), e))?;
            if item.path().is_file() {
                files.push(item.path());
            }
        }

        if files.is_empty() {
            return Err(KilnError::command_exec(
                "kilnc dep-build",
                "driver produced no dependency artifacts",
            ));
        }

        files.sort();
        Ok(files)
    }

    async fn build_variant(&self, req: &VariantBuildRequest) -> KilnResult<PathBuf> {
        if let Some(parent) = req.out_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KilnError::io(format!("creating {}", parent.display()), e))?;
        }

        let mut cmd = self.command(&req.toolchain);
        cmd.arg("build")
            .arg("--source")
            .arg(&req.source_root)
            .arg("--deps")
            .arg(&req.deps.dir)
            .arg("--target")
            .arg(&req.target)
            .arg("--out")
            .arg(&req.out_file)
            .arg("--offline");

        if !req.variant.features.is_empty() {
            cmd.arg("--features").arg(req.variant.feature_args());
        }

        self.run(cmd, "kilnc build").await?;

        if !req.out_file.is_file() {
            return Err(KilnError::command_exec(
                "kilnc build",
                format!("driver did not produce {}", req.out_file.display()),
            ));
        }

        Ok(req.out_file.clone())
    }

    fn runner_name(&self) -> &'static str {
        "driver"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory runner that fabricates artifacts and counts invocations
    pub struct FakeRunner {
        pub dep_builds: AtomicUsize,
        pub variant_builds: AtomicUsize,
        pub fail_deps: bool,
        pub fail_features: HashSet<String>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self {
                dep_builds: AtomicUsize::new(0),
                variant_builds: AtomicUsize::new(0),
                fail_deps: false,
                fail_features: HashSet::new(),
            }
        }

        pub fn failing_deps() -> Self {
            Self {
                fail_deps: true,
                ..Self::new()
            }
        }

        pub fn failing_feature(feature: &str) -> Self {
            Self {
                fail_features: [feature.to_string()].into_iter().collect(),
                ..Self::new()
            }
        }

        pub fn dep_build_count(&self) -> usize {
            self.dep_builds.load(Ordering::SeqCst)
        }

        pub fn variant_build_count(&self) -> usize {
            self.variant_builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BuildRunner for FakeRunner {
        async fn build_dependencies(&self, req: &DepBuildRequest) -> KilnResult<Vec<PathBuf>> {
            self.dep_builds.fetch_add(1, Ordering::SeqCst);

            if self.fail_deps {
                return Err(KilnError::command_exec(
                    "kilnc dep-build",
                    "synthetic dependency failure",
                ));
            }

            let file = req.out_dir.join("deps.bundle");
            std::fs::write(&file, format!("deps for {}", req.target))
                .map_err(|e| KilnError::io("writing fake bundle", e))?;
            Ok(vec![file])
        }

        async fn build_variant(&self, req: &VariantBuildRequest) -> KilnResult<PathBuf> {
            self.variant_builds.fetch_add(1, Ordering::SeqCst);

            if req.variant.features.iter().any(|f| self.fail_features.contains(f)) {
                return Err(KilnError::command_exec(
                    "kilnc build",
                    format!("synthetic failure for variant {}", req.variant),
                ));
            }

            if let Some(parent) = req.out_file.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| KilnError::io("creating fake output dir", e))?;
            }
            std::fs::write(
                &req.out_file,
                format!("{} [{}] on {}", req.variant, req.variant.feature_args(), req.target),
            )
            .map_err(|e| KilnError::io("writing fake binary", e))?;

            Ok(req.out_file.clone())
        }

        fn runner_name(&self) -> &'static str {
            "fake"
        }
    }
}
