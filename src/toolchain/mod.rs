//! Toolchain pinning and resolution
//!
//! A toolchain is a versioned compiler environment, treated as a black box.
//! The descriptor file pins exactly one version plus the targets and
//! components it must provide; resolution materializes that pin into a
//! concrete installation directory, fetching the declared archive from a
//! trusted mirror if it is not present locally. No other network access is
//! ever attempted.

pub mod fetch;

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pinned toolchain descriptor, parsed from `toolchain.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainDescriptor {
    /// Exact toolchain version
    pub version: String,

    /// Target triples this pin must provide
    pub targets: Vec<String>,

    /// Toolchain components expected in the installation
    #[serde(default)]
    pub components: Vec<String>,
}

/// Wrapper table so the descriptor file reads `[toolchain]`
#[derive(Debug, Deserialize, Serialize)]
struct DescriptorFile {
    toolchain: ToolchainDescriptor,
}

impl ToolchainDescriptor {
    /// Load a descriptor from a TOML file
    pub fn load(path: &Path) -> KilnResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KilnError::PathNotFound(path.to_path_buf())
            } else {
                KilnError::io(format!("reading toolchain descriptor {}", path.display()), e)
            }
        })?;

        let file: DescriptorFile =
            toml::from_str(&content).map_err(|e| KilnError::ToolchainDescriptorInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if file.toolchain.targets.is_empty() {
            return Err(KilnError::ToolchainDescriptorInvalid {
                path: path.to_path_buf(),
                reason: "descriptor pins no targets".to_string(),
            });
        }

        Ok(file.toolchain)
    }
}

/// A resolved, versioned compiler environment. Immutable once created.
#[derive(Debug, Clone)]
pub struct ToolchainSpec {
    /// Stable identifier hashed into derivation keys
    pub identifier: String,

    /// Pinned version
    pub version: semver::Version,

    /// Target triple this spec was resolved for
    pub target: String,

    /// Components the installation provides
    pub components: Vec<String>,

    /// Installation directory (`<root>/<version>/<target>`)
    pub root: PathBuf,

    /// Build driver binary inside the installation
    pub driver: PathBuf,

    /// Name of the env var carrying the support-library location
    pub support_lib_env: String,

    /// Compiler support-library directory, from that env var
    pub support_lib: Option<PathBuf>,
}

impl ToolchainSpec {
    /// The `bin/` directory to prepend to PATH in build and shell envs
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }
}

/// Resolves a pinned descriptor into a concrete toolchain installation
pub struct ToolchainResolver {
    root: PathBuf,
    mirror: Option<String>,
    driver_name: String,
    support_lib_env: String,
}

impl ToolchainResolver {
    /// Create a resolver over a local toolchain root
    pub fn new(
        root: PathBuf,
        mirror: Option<String>,
        driver_name: String,
        support_lib_env: String,
    ) -> Self {
        Self {
            root,
            mirror,
            driver_name,
            support_lib_env,
        }
    }

    /// Resolve the descriptor for one target platform.
    ///
    /// Fails with `ToolchainUnavailable` when the version/target pair cannot
    /// be materialized locally or from the trusted mirror; that failure is
    /// fatal for every downstream step on the platform.
    pub fn resolve(&self, descriptor: &ToolchainDescriptor, target: &str) -> KilnResult<ToolchainSpec> {
        if !descriptor.targets.iter().any(|t| t == target) {
            return Err(KilnError::ToolchainUnavailable {
                version: descriptor.version.clone(),
                target: target.to_string(),
                reason: "target not declared in the pinned descriptor".to_string(),
            });
        }

        let version = semver::Version::parse(&descriptor.version).map_err(|e| {
            KilnError::ToolchainUnavailable {
                version: descriptor.version.clone(),
                target: target.to_string(),
                reason: format!("unparseable version: {e}"),
            }
        })?;

        let install_dir = self.root.join(&descriptor.version).join(target);
        let driver = install_dir.join("bin").join(&self.driver_name);

        if !driver.is_file() {
            match &self.mirror {
                Some(mirror) => {
                    info!(
                        "Toolchain {} for {} not installed, fetching from mirror",
                        descriptor.version, target
                    );
                    fetch::fetch_archive(mirror, &descriptor.version, target, &install_dir)?;
                }
                None => {
                    return Err(KilnError::ToolchainUnavailable {
                        version: descriptor.version.clone(),
                        target: target.to_string(),
                        reason: format!("not installed under {} and no mirror configured", self.root.display()),
                    });
                }
            }

            if !driver.is_file() {
                return Err(KilnError::ToolchainUnavailable {
                    version: descriptor.version.clone(),
                    target: target.to_string(),
                    reason: format!("fetched archive does not provide bin/{}", self.driver_name),
                });
            }
        }

        let support_lib = std::env::var_os(&self.support_lib_env).map(PathBuf::from);
        if let Some(ref dir) = support_lib {
            debug!(
                "Support libraries from {}: {}",
                self.support_lib_env,
                dir.display()
            );
        }

        Ok(ToolchainSpec {
            identifier: format!("kiln-tc-{}", descriptor.version),
            version,
            target: target.to_string(),
            components: descriptor.components.clone(),
            root: install_dir,
            driver,
            support_lib_env: self.support_lib_env.clone(),
            support_lib,
        })
    }
}

/// Best-effort host target triple, used when no platforms are configured
pub fn host_triple() -> String {
    let arch = std::env::consts::ARCH;
    match std::env::consts::OS {
        "linux" => format!("{arch}-unknown-linux-gnu"),
        "macos" => format!("{arch}-apple-darwin"),
        "windows" => format!("{arch}-pc-windows-msvc"),
        os => format!("{arch}-unknown-{os}"),
    }
}
