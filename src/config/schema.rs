//! Configuration schema for Kiln
//!
//! Global configuration lives at `~/.config/kiln/config.toml`; a project can
//! override sections with a local `kiln.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Toolchain pinning and resolution
    pub toolchain: ToolchainConfig,

    /// Source tree snapshot settings
    pub source: SourceConfig,

    /// Build inputs and platform matrix
    pub build: BuildConfig,

    /// Artifact store settings
    pub cache: CacheConfig,

    /// The fixed set of supported build variants
    #[serde(rename = "variant")]
    pub variants: Vec<VariantConfig>,

    /// Buildable outputs, each bound to one (platform, variant) pair
    #[serde(rename = "package")]
    pub packages: Vec<PackageConfig>,

    /// Runnable outputs, each bound to one package
    #[serde(rename = "app")]
    pub apps: Vec<AppConfig>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Toolchain pinning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Path to the pinned toolchain descriptor, relative to the source root
    pub descriptor: PathBuf,

    /// Directory holding installed toolchains (`<root>/<version>/<target>/`)
    pub root: Option<PathBuf>,

    /// Trusted mirror base URL for fetching the declared toolchain archive.
    /// This is the only network access Kiln ever performs.
    pub mirror: Option<String>,

    /// Name of the environment variable pointing at the compiler
    /// support-library directory. Exported into build and shell
    /// environments; never part of any cache key.
    pub support_lib_env: String,

    /// Build driver binary expected under the toolchain's `bin/`
    pub driver: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            descriptor: PathBuf::from("toolchain.toml"),
            root: None,
            mirror: None,
            support_lib_env: "KILN_SUPPORT_LIB_DIR".to_string(),
            driver: "kilnc".to_string(),
        }
    }
}

/// Source snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Working-tree root to snapshot
    pub root: PathBuf,

    /// Paths excluded from the snapshot (VCS metadata, build output)
    pub exclude: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            exclude: vec![
                ".git".to_string(),
                "target".to_string(),
                ".kiln".to_string(),
            ],
        }
    }
}

/// Build input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Lockfile pinning the dependency graph, relative to the source root
    pub lockfile: String,

    /// Allow the build driver to auto-download unpinned inputs.
    /// Rejected at build time when enabled; identical cache keys must
    /// always map to identical artifacts.
    pub auto_fetch: bool,

    /// Target platforms. Empty means the host platform only.
    pub platforms: Vec<String>,

    /// Name of the binary each variant build produces
    pub artifact: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            lockfile: "deps.lock".to_string(),
            auto_fetch: false,
            platforms: vec![],
            artifact: "server".to_string(),
        }
    }
}

/// Artifact store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store root (defaults to `<state dir>/store`)
    pub root: Option<PathBuf>,

    /// Remove entries older than this many days on `cache gc` (0 disables)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            gc_days: 30,
        }
    }
}

/// A supported build variant: a name plus the optional features it enables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Variant name
    pub name: String,

    /// Feature flags enabled for the top-level build
    #[serde(default)]
    pub features: BTreeSet<String>,
}

/// A buildable output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Registry name
    pub name: String,

    /// Variant this package builds
    pub variant: String,

    /// Target platform (defaults to the first configured platform)
    #[serde(default)]
    pub platform: Option<String>,
}

/// A runnable output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Registry name
    pub name: String,

    /// Package whose artifact this app executes
    pub package: String,
}

impl Config {
    /// Look up a configured variant by name
    pub fn variant(&self, name: &str) -> Option<&VariantConfig> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Comma-separated list of configured variant names, for error messages
    pub fn variant_names(&self) -> String {
        self.variants
            .iter()
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Default configuration: two packaging entry points over the same source
/// tree, one defaulting to the base variant and one to the full variant.
pub fn default_outputs() -> (Vec<VariantConfig>, Vec<PackageConfig>, Vec<AppConfig>) {
    let variants = vec![
        VariantConfig {
            name: "base".to_string(),
            features: BTreeSet::new(),
        },
        VariantConfig {
            name: "full".to_string(),
            features: ["full".to_string()].into_iter().collect(),
        },
    ];
    let packages = vec![
        PackageConfig {
            name: "base".to_string(),
            variant: "base".to_string(),
            platform: None,
        },
        PackageConfig {
            name: "full".to_string(),
            variant: "full".to_string(),
            platform: None,
        },
    ];
    let apps = vec![
        AppConfig {
            name: "base".to_string(),
            package: "base".to_string(),
        },
        AppConfig {
            name: "full".to_string(),
            package: "full".to_string(),
        },
    ];
    (variants, packages, apps)
}
