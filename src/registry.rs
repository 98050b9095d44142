//! Output registry
//!
//! Maps declared output names to their (platform, variant) binding and the
//! artifact path that binding produces. Two categories exist: packages
//! (buildable units) and apps (runnable entry points referencing a
//! package). Resolution is a pure function of the name — no build state is
//! consulted — and an undefined name fails with `UnknownOutput`.

use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::graph::store::variant_output_path;
use crate::graph::{target_platforms, Variant};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Output category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A buildable unit
    Package,
    /// A named, directly runnable entry point
    App,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package => write!(f, "package"),
            Self::App => write!(f, "app"),
        }
    }
}

/// A fully resolved output: one name bound to one (platform, variant) pair
/// and one concrete artifact path
#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    pub name: String,
    pub kind: OutputKind,
    pub platform: String,
    pub variant: Variant,
    pub artifact: PathBuf,
}

#[derive(Debug, Clone)]
struct PackageBinding {
    variant: Variant,
    platform: String,
}

/// Registry of declared outputs
#[derive(Debug)]
pub struct OutputRegistry {
    packages: BTreeMap<String, PackageBinding>,
    apps: BTreeMap<String, String>,
    store_root: PathBuf,
    artifact_name: String,
}

impl OutputRegistry {
    /// Build the registry from configuration. Each package binds to exactly
    /// one (platform, variant) pair; apps reference a declared package.
    pub fn from_config(config: &Config, store_root: PathBuf) -> KilnResult<Self> {
        let default_platform = target_platforms(config)
            .into_iter()
            .next()
            .expect("target platform list is never empty");

        let mut packages = BTreeMap::new();
        for package in &config.packages {
            let variant = Variant::resolve(&package.variant, config)?;
            let platform = package
                .platform
                .clone()
                .unwrap_or_else(|| default_platform.clone());

            let binding = PackageBinding { variant, platform };
            if packages.insert(package.name.clone(), binding).is_some() {
                return Err(KilnError::User(format!(
                    "duplicate package name in configuration: {}",
                    package.name
                )));
            }
        }

        let mut apps = BTreeMap::new();
        for app in &config.apps {
            if !packages.contains_key(&app.package) {
                return Err(KilnError::User(format!(
                    "app '{}' references undeclared package '{}'",
                    app.name, app.package
                )));
            }
            if apps.insert(app.name.clone(), app.package.clone()).is_some() {
                return Err(KilnError::User(format!(
                    "duplicate app name in configuration: {}",
                    app.name
                )));
            }
        }

        Ok(Self {
            packages,
            apps,
            store_root,
            artifact_name: config.build.artifact.clone(),
        })
    }

    /// Resolve a package by name
    pub fn resolve_package(&self, name: &str) -> KilnResult<ResolvedOutput> {
        let binding = self
            .packages
            .get(name)
            .ok_or_else(|| KilnError::UnknownOutput(name.to_string()))?;

        Ok(self.resolved(name, OutputKind::Package, binding))
    }

    /// Resolve an app by name to its package's artifact
    pub fn resolve_app(&self, name: &str) -> KilnResult<ResolvedOutput> {
        let package = self
            .apps
            .get(name)
            .ok_or_else(|| KilnError::UnknownOutput(name.to_string()))?;

        let binding = self
            .packages
            .get(package)
            .expect("app references were validated at construction");

        Ok(self.resolved(name, OutputKind::App, binding))
    }

    /// Declared package names, sorted
    pub fn package_names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    /// Declared app names, sorted
    pub fn app_names(&self) -> Vec<&str> {
        self.apps.keys().map(String::as_str).collect()
    }

    fn resolved(&self, name: &str, kind: OutputKind, binding: &PackageBinding) -> ResolvedOutput {
        ResolvedOutput {
            name: name.to_string(),
            kind,
            platform: binding.platform.clone(),
            variant: binding.variant.clone(),
            artifact: variant_output_path(
                &self.store_root,
                &binding.platform,
                &binding.variant.name,
                &self.artifact_name,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{default_outputs, AppConfig, PackageConfig};

    fn config() -> Config {
        let (variants, packages, apps) = default_outputs();
        let mut config = Config {
            variants,
            packages,
            apps,
            ..Config::default()
        };
        config.build.platforms = vec!["x86_64-unknown-linux-gnu".to_string()];
        config
    }

    fn registry(config: &Config) -> OutputRegistry {
        OutputRegistry::from_config(config, PathBuf::from("/store")).unwrap()
    }

    #[test]
    fn resolves_both_default_entry_points() {
        let config = config();
        let registry = registry(&config);

        let base = registry.resolve_package("base").unwrap();
        let full = registry.resolve_package("full").unwrap();

        assert_eq!(base.kind, OutputKind::Package);
        assert_eq!(base.variant.name, "base");
        assert_eq!(full.variant.name, "full");
        assert_ne!(base.artifact, full.artifact);
    }

    #[test]
    fn unknown_name_fails() {
        let config = config();
        let registry = registry(&config);

        let err = registry.resolve_package("nonexistent").unwrap_err();
        assert!(matches!(err, KilnError::UnknownOutput(_)));

        let err = registry.resolve_app("nonexistent").unwrap_err();
        assert!(matches!(err, KilnError::UnknownOutput(_)));
    }

    #[test]
    fn app_resolves_through_its_package() {
        let config = config();
        let registry = registry(&config);

        let app = registry.resolve_app("full").unwrap();
        let package = registry.resolve_package("full").unwrap();

        assert_eq!(app.kind, OutputKind::App);
        assert_eq!(app.artifact, package.artifact);
        assert_eq!(app.platform, package.platform);
    }

    #[test]
    fn resolution_is_pure() {
        let config = config();
        let registry = registry(&config);

        let first = registry.resolve_package("base").unwrap();
        let second = registry.resolve_package("base").unwrap();
        assert_eq!(first.artifact, second.artifact);
        assert_eq!(first.platform, second.platform);
    }

    #[test]
    fn packages_scope_artifacts_by_platform() {
        let mut config = config();
        config.build.platforms = vec![
            "x86_64-unknown-linux-gnu".to_string(),
            "aarch64-apple-darwin".to_string(),
        ];
        config.packages = vec![
            PackageConfig {
                name: "base-linux".to_string(),
                variant: "base".to_string(),
                platform: Some("x86_64-unknown-linux-gnu".to_string()),
            },
            PackageConfig {
                name: "base-mac".to_string(),
                variant: "base".to_string(),
                platform: Some("aarch64-apple-darwin".to_string()),
            },
        ];
        config.apps = vec![];

        let registry = registry(&config);
        let linux = registry.resolve_package("base-linux").unwrap();
        let mac = registry.resolve_package("base-mac").unwrap();

        // Same variant, same source: still never the same artifact
        assert_ne!(linux.artifact, mac.artifact);
        assert!(linux.artifact.starts_with("/store/x86_64-unknown-linux-gnu"));
        assert!(mac.artifact.starts_with("/store/aarch64-apple-darwin"));
    }

    #[test]
    fn unknown_variant_in_package_fails() {
        let mut config = config();
        config.packages.push(PackageConfig {
            name: "broken".to_string(),
            variant: "experimental".to_string(),
            platform: None,
        });

        let err = OutputRegistry::from_config(&config, PathBuf::from("/store")).unwrap_err();
        assert!(matches!(err, KilnError::UnknownVariant { .. }));
    }

    #[test]
    fn app_with_undeclared_package_fails() {
        let mut config = config();
        config.apps.push(AppConfig {
            name: "ghost".to_string(),
            package: "missing".to_string(),
        });

        let err = OutputRegistry::from_config(&config, PathBuf::from("/store")).unwrap_err();
        assert!(matches!(err, KilnError::User(_)));
    }

    #[test]
    fn duplicate_package_name_fails() {
        let mut config = config();
        config.packages.push(PackageConfig {
            name: "base".to_string(),
            variant: "full".to_string(),
            platform: None,
        });

        let err = OutputRegistry::from_config(&config, PathBuf::from("/store")).unwrap_err();
        assert!(matches!(err, KilnError::User(_)));
    }

    #[test]
    fn names_are_sorted() {
        let config = config();
        let registry = registry(&config);
        assert_eq!(registry.package_names(), vec!["base", "full"]);
        assert_eq!(registry.app_names(), vec!["base", "full"]);
    }
}
